//! Runnable files: JSON fixtures and program binaries, told apart by the
//! binary magic.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytecode::{BINARY_MAGIC, BinaryError, BinaryInfo, Program, read_program};
use heap::{HeapCreateInfo, HeapError, HeapStore};
use object::Value;
use thiserror::Error;

use crate::{Activation, Fixture, FixtureError, Prepared};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("malformed binary: {0}")]
    Binary(#[from] BinaryError),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("binary is a library and has no entrypoint")]
    Library,
}

#[derive(Debug)]
pub enum Image {
    Fixture(Fixture),
    Binary { program: Program, info: BinaryInfo },
}

impl Image {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.starts_with(BINARY_MAGIC) {
            let (program, info) = read_program(&mut &bytes[..])?;
            log::info!("loaded binary with {} functions", info.functions);
            return Ok(Image::Binary { program, info });
        }
        Ok(Image::Fixture(Fixture::from_slice(bytes)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Image::Binary { .. })
    }

    pub fn program(&self) -> Result<Program, ImageError> {
        match self {
            Image::Fixture(fixture) => Ok(fixture.program()?),
            Image::Binary { program, .. } => Ok(program.clone()),
        }
    }

    /// Builds the heap and the entry frame.
    ///
    /// A fixture keeps its own arguments unless `args` is non-empty. A
    /// binary's entry receives `main(args: str[])` when it takes one
    /// argument and nothing otherwise.
    pub fn prepare<S: AsRef<str>>(
        &self,
        heap: HeapCreateInfo,
        args: &[S],
    ) -> Result<Prepared, ImageError> {
        match self {
            Image::Fixture(fixture) => {
                let mut prepared = fixture.prepare(heap)?;
                if !args.is_empty() {
                    prepared.with_main_args(args)?;
                }
                Ok(prepared)
            }
            Image::Binary { program, .. } => {
                let entry = program
                    .entry()
                    .and_then(|idx| program.function(idx))
                    .ok_or(ImageError::Library)?;
                let mut heap = HeapStore::new(heap);
                let activation = match entry.arity {
                    1 => Activation::main(&mut heap, args)?,
                    _ => Activation::default(),
                };
                Ok(Prepared {
                    program: program.clone(),
                    heap,
                    activation,
                    labels: HashMap::new(),
                    expected: None,
                })
            }
        }
    }
}

/// Process exit status for a finished run: the entry's result when it is a
/// single integer, otherwise 0.
pub fn exit_status(values: &[Value]) -> i32 {
    match values {
        [value] => value.as_integer().map_or(0, |n| n as i32),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode::{Function, Kind};

    use crate::VMCreateInfo;

    fn binary(arity: u16, code: &[&str]) -> Vec<u8> {
        let function = Function::assemble("main", arity, 0, 1, code).unwrap();
        Program::single(function).to_binary().unwrap()
    }

    #[test]
    fn binary_entry_receives_main_args() {
        let bytes = binary(1, &["loadarg 0", "refslot 0", "cconv.i32", "ret"]);
        let image = Image::from_bytes(&bytes).unwrap();
        assert!(image.is_binary());

        let mut prepared = image.prepare(HeapCreateInfo::default(), &["a", "b", "c"]).unwrap();
        let outcome = prepared.run(&VMCreateInfo::default()).unwrap();
        assert_eq!(outcome, Ok(vec![Value::I32(3)]));
        assert_eq!(exit_status(&outcome.unwrap()), 3);

        let mut prepared = image.prepare::<&str>(HeapCreateInfo::default(), &[]).unwrap();
        let outcome = prepared.run(&VMCreateInfo::default()).unwrap();
        assert_eq!(outcome, Ok(vec![Value::I32(0)]));
    }

    #[test]
    fn nullary_binary_entry() {
        let bytes = binary(0, &["push.u8 7", "ret"]);
        let image = Image::from_bytes(&bytes).unwrap();
        let mut prepared = image.prepare(HeapCreateInfo::default(), &["ignored"]).unwrap();
        assert!(prepared.activation.args.is_empty());
        assert!(prepared.heap.is_empty());
        assert_eq!(prepared.run(&VMCreateInfo::default()).unwrap(), Ok(vec![Value::U8(7)]));
    }

    #[test]
    fn library_cannot_run() {
        let mut program = Program::new();
        program.add_function(Function::assemble("f", 0, 0, 0, &["ret"]).unwrap());
        let image = Image::from_bytes(&program.to_binary().unwrap()).unwrap();
        assert!(image.program().is_ok());
        assert!(matches!(
            image.prepare::<&str>(HeapCreateInfo::default(), &[]),
            Err(ImageError::Library)
        ));
    }

    #[test]
    fn fixtures_are_not_binaries() {
        let text = r#"{
            "functions": [{ "name": "main", "returns": 1, "code": ["ret"] }],
            "stack": [{ "i32": -1 }]
        }"#;
        let image = Image::from_bytes(text.as_bytes()).unwrap();
        assert!(!image.is_binary());
        let mut prepared = image.prepare::<&str>(HeapCreateInfo::default(), &[]).unwrap();
        assert_eq!(prepared.run(&VMCreateInfo::default()).unwrap(), Ok(vec![Value::I32(-1)]));

        assert!(matches!(
            Image::from_bytes(b"\x00\x01"),
            Err(ImageError::Fixture(FixtureError::Json(_)))
        ));
        let mut broken = binary(0, &["ret"]);
        broken.truncate(BINARY_MAGIC.len());
        assert!(matches!(Image::from_bytes(&broken), Err(ImageError::Binary(_))));
    }

    #[test]
    fn exit_status_takes_single_integer() {
        assert_eq!(exit_status(&[]), 0);
        assert_eq!(exit_status(&[Value::I32(-1)]), -1);
        assert_eq!(exit_status(&[Value::U8(42)]), 42);
        assert_eq!(exit_status(&[Value::Bool(true)]), 0);
        assert_eq!(exit_status(&[Value::F64(3.0)]), 0);
        assert_eq!(exit_status(&[Value::U8(1), Value::U8(2)]), 0);
        assert_eq!(exit_status(&[Value::zero(Kind::Usize).unwrap()]), 0);
    }
}
