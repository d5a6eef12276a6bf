//! JSON fixtures: one invocation per document, with the functions, the
//! initial heap, the entry frame's contents and the expected outcome.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytecode::{AssembleError, Function, Kind, Program, UnknownKind};
use heap::{HeapCreateInfo, HeapError, HeapStore};
use object::{Address, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Activation, Interpreter, SetupError, Trap, TrapKind, UnknownTrapKind, VMCreateInfo};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed fixture: {0}")]
    Json(#[from] serde_json::Error),
    #[error("function `{function}`: {source}")]
    Assemble {
        function: String,
        source: AssembleError,
    },
    #[error(transparent)]
    Kind(#[from] UnknownKind),
    #[error(transparent)]
    TrapKind(#[from] UnknownTrapKind),
    #[error("fixture declares no functions")]
    NoFunctions,
    #[error("too many functions")]
    TooManyFunctions,
    #[error("function `{0}` is declared twice")]
    DuplicateFunction(String),
    #[error("entry function `{0}` is not declared")]
    UnknownEntry(String),
    #[error("heap id `{0}` is declared twice")]
    DuplicateHeapId(String),
    #[error("unknown heap id `{0}`")]
    UnknownHeapId(String),
    #[error("heap entry `{0}` is part of a reference cycle")]
    HeapCycle(String),
    #[error("heap entry `{id}` declares {count} elements but holds {found}")]
    CountMismatch { id: String, count: usize, found: usize },
    #[error("heap entry `{0}` has both `elements` and `text`")]
    AmbiguousPayload(String),
    #[error("heap entry `{id}` has `text` but element kind {kind}")]
    TextKind { id: String, kind: Kind },
    #[error("heap entry `{id}` of kind {kind} needs explicit elements")]
    NoZero { id: String, kind: Kind },
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// A literal value, tagged by kind name: `{"i32": 2}`, `{"ref": "label"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSpec {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    #[serde(rename = "usize_t")]
    Usize(u64),
    #[serde(rename = "size_t")]
    Size(i64),
    F16(f32),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// Reference to the heap entry with this id.
    Ref(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub arity: u16,
    #[serde(default)]
    pub locals: u16,
    #[serde(default)]
    pub returns: u16,
    pub code: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeapEntry {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub elements: Option<Vec<ValueSpec>>,
    /// UTF-8 payload for `u8` arrays.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Stack(Vec<ValueSpec>),
    Trap(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub functions: Vec<FunctionSpec>,
    /// Name of the entry function; the first function when absent.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub heap: Vec<HeapEntry>,
    #[serde(default)]
    pub args: Vec<ValueSpec>,
    #[serde(default)]
    pub stack: Vec<ValueSpec>,
    #[serde(default)]
    pub locals: Vec<Option<String>>,
    #[serde(default)]
    pub expect: Option<Expectation>,
}

/// Expected outcome with every label resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Stack(Vec<Value>),
    Trap(TrapKind),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Mismatch {
    #[error("expected stack [{}], got [{}]", show(.expected), show(.found))]
    Stack {
        expected: Vec<Value>,
        found: Vec<Value>,
    },
    #[error("expected stack [{}], got {trap}", show(.expected))]
    UnexpectedTrap { expected: Vec<Value>, trap: Trap },
    #[error("expected {expected}, got stack [{}]", show(.found))]
    MissingTrap {
        expected: TrapKind,
        found: Vec<Value>,
    },
    #[error("expected {expected}, got {trap}")]
    Trap { expected: TrapKind, trap: Trap },
}

fn show(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FixtureError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Assembles every function and resolves the entry.
    pub fn program(&self) -> Result<Program, FixtureError> {
        if self.functions.is_empty() {
            return Err(FixtureError::NoFunctions);
        }

        let mut program = Program::new();
        for spec in &self.functions {
            if program.find(&spec.name).is_some() {
                return Err(FixtureError::DuplicateFunction(spec.name.clone()));
            }
            let function = Function::assemble(
                spec.name.as_str(),
                spec.arity,
                spec.locals,
                spec.returns,
                spec.code.as_slice(),
            )
            .map_err(|source| FixtureError::Assemble {
                function: spec.name.clone(),
                source,
            })?;
            program
                .add_function(function)
                .ok_or(FixtureError::TooManyFunctions)?;
        }

        let entry = match &self.entry {
            Some(name) => program
                .find(name)
                .ok_or_else(|| FixtureError::UnknownEntry(name.clone()))?,
            None => 0,
        };
        program.set_entry(entry);
        Ok(program)
    }

    /// Builds everything needed for one invocation.
    pub fn prepare(&self, heap: HeapCreateInfo) -> Result<Prepared, FixtureError> {
        let program = self.program()?;
        let mut store = HeapStore::new(heap);
        let labels = build_heap(&self.heap, &mut store)?;

        let resolve_all = |specs: &[ValueSpec]| {
            specs
                .iter()
                .map(|spec| resolve(spec, &labels, &store))
                .collect::<Result<Vec<_>, _>>()
        };
        let args = resolve_all(self.args.as_slice())?;
        let stack = resolve_all(self.stack.as_slice())?;
        let expected = match &self.expect {
            None => None,
            Some(Expectation::Stack(values)) => Some(Expected::Stack(resolve_all(values.as_slice())?)),
            Some(Expectation::Trap(name)) => Some(Expected::Trap(name.parse()?)),
        };
        let locals = self
            .locals
            .iter()
            .map(|kind| kind.as_deref().map(str::parse::<Kind>).transpose())
            .collect::<Result<Vec<Option<Kind>>, _>>()?;

        Ok(Prepared {
            program,
            heap: store,
            activation: Activation {
                args,
                stack,
                locals,
            },
            labels,
            expected,
        })
    }
}

/// A fixture ready to run: assembled program, populated heap and entry
/// frame contents.
#[derive(Debug)]
pub struct Prepared {
    pub program: Program,
    pub heap: HeapStore,
    pub activation: Activation,
    pub labels: HashMap<String, Address>,
    pub expected: Option<Expected>,
}

impl Prepared {
    /// Replaces the fixture's arguments with the `main(args: str[])`
    /// convention built from `args`.
    pub fn with_main_args<S: AsRef<str>>(&mut self, args: &[S]) -> Result<(), FixtureError> {
        self.activation.args = Activation::main(&mut self.heap, args)?.args;
        Ok(())
    }

    /// Runs the entry function once. The activation is consumed; running
    /// again starts with no arguments.
    pub fn run(&mut self, info: &VMCreateInfo) -> Result<Result<Vec<Value>, Trap>, SetupError> {
        let activation = std::mem::take(&mut self.activation);
        let interpreter = Interpreter::new(&self.program, &mut self.heap, info.clone(), activation)?;
        Ok(interpreter.run())
    }

    /// Compares an outcome with the fixture's expectation, if it has one.
    pub fn check(&self, outcome: &Result<Vec<Value>, Trap>) -> Result<(), Mismatch> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        match (expected, outcome) {
            (Expected::Stack(expected), Ok(found)) if expected == found => Ok(()),
            (Expected::Stack(expected), Ok(found)) => Err(Mismatch::Stack {
                expected: expected.clone(),
                found: found.clone(),
            }),
            (Expected::Stack(expected), Err(trap)) => Err(Mismatch::UnexpectedTrap {
                expected: expected.clone(),
                trap: *trap,
            }),
            (Expected::Trap(expected), Ok(found)) => Err(Mismatch::MissingTrap {
                expected: *expected,
                found: found.clone(),
            }),
            (Expected::Trap(expected), Err(trap)) if trap.kind == *expected => Ok(()),
            (Expected::Trap(expected), Err(trap)) => Err(Mismatch::Trap {
                expected: *expected,
                trap: *trap,
            }),
        }
    }
}

fn resolve(
    spec: &ValueSpec,
    labels: &HashMap<String, Address>,
    heap: &HeapStore,
) -> Result<Value, FixtureError> {
    let value = match spec {
        ValueSpec::U8(v) => Value::U8(*v),
        ValueSpec::U16(v) => Value::U16(*v),
        ValueSpec::U32(v) => Value::U32(*v),
        ValueSpec::U64(v) => Value::U64(*v),
        ValueSpec::I8(v) => Value::I8(*v),
        ValueSpec::I16(v) => Value::I16(*v),
        ValueSpec::I32(v) => Value::I32(*v),
        ValueSpec::I64(v) => Value::I64(*v),
        ValueSpec::Usize(v) => Value::Usize(*v),
        ValueSpec::Size(v) => Value::Size(*v),
        ValueSpec::F16(v) => Value::f16(*v),
        ValueSpec::F32(v) => Value::F32(*v),
        ValueSpec::F64(v) => Value::F64(*v),
        ValueSpec::Bool(v) => Value::Bool(*v),
        ValueSpec::Ref(label) => {
            let address = labels
                .get(label)
                .ok_or_else(|| FixtureError::UnknownHeapId(label.clone()))?;
            heap.reference(*address)?
        }
    };
    Ok(value)
}

fn references(entry: &HeapEntry) -> impl Iterator<Item = &str> {
    entry.elements.iter().flatten().filter_map(|spec| match spec {
        ValueSpec::Ref(label) => Some(label.as_str()),
        _ => None,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Orders heap entries so that every entry comes after the entries it
/// references.
fn creation_order(entries: &[HeapEntry]) -> Result<Vec<usize>, FixtureError> {
    let mut index = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if index.insert(entry.id.as_str(), i).is_some() {
            return Err(FixtureError::DuplicateHeapId(entry.id.clone()));
        }
    }

    let mut marks: Vec<Option<Mark>> = vec![None; entries.len()];
    let mut order = Vec::with_capacity(entries.len());

    for root in 0..entries.len() {
        if marks[root].is_some() {
            continue;
        }
        // (entry, next reference to visit)
        let mut work = vec![(root, 0usize)];
        marks[root] = Some(Mark::Visiting);

        while let Some(top) = work.last_mut() {
            let (current, cursor) = *top;
            top.1 += 1;
            match references(&entries[current]).nth(cursor) {
                Some(label) => {
                    let target = *index
                        .get(label)
                        .ok_or_else(|| FixtureError::UnknownHeapId(label.to_owned()))?;
                    match marks[target] {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => {
                            return Err(FixtureError::HeapCycle(entries[target].id.clone()));
                        }
                        None => {
                            marks[target] = Some(Mark::Visiting);
                            work.push((target, 0));
                        }
                    }
                }
                None => {
                    marks[current] = Some(Mark::Done);
                    order.push(current);
                    work.pop();
                }
            }
        }
    }
    Ok(order)
}

fn build_heap(
    entries: &[HeapEntry],
    heap: &mut HeapStore,
) -> Result<HashMap<String, Address>, FixtureError> {
    let mut labels = HashMap::with_capacity(entries.len());

    for i in creation_order(entries)? {
        let entry = &entries[i];
        let kind: Kind = entry.kind.parse()?;

        let elements = match (&entry.elements, &entry.text) {
            (Some(_), Some(_)) => return Err(FixtureError::AmbiguousPayload(entry.id.clone())),
            (None, Some(text)) => {
                if kind != Kind::U8 {
                    return Err(FixtureError::TextKind {
                        id: entry.id.clone(),
                        kind,
                    });
                }
                text.bytes().map(Value::U8).collect()
            }
            (Some(specs), None) => specs
                .iter()
                .map(|spec| resolve(spec, &labels, heap))
                .collect::<Result<Vec<_>, _>>()?,
            (None, None) => {
                let zero = Value::zero(kind).ok_or_else(|| FixtureError::NoZero {
                    id: entry.id.clone(),
                    kind,
                })?;
                vec![zero; entry.count.unwrap_or(0)]
            }
        };

        if let Some(count) = entry.count.filter(|&count| count != elements.len()) {
            return Err(FixtureError::CountMismatch {
                id: entry.id.clone(),
                count,
                found: elements.len(),
            });
        }

        let address = heap.create(kind, elements)?;
        labels.insert(entry.id.clone(), address);
    }
    Ok(labels)
}
