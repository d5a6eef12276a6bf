use crate::{AssembleError, assemble};

/// A callable instruction stream together with its frame layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Size of the argument bank.
    pub arity: u16,
    /// Size of the local bank.
    pub locals: u16,
    /// Declared return arity: the operand stack depth `ret` requires.
    pub returns: u16,
    pub code: Vec<u8>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        arity: u16,
        locals: u16,
        returns: u16,
        code: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            locals,
            returns,
            code,
        }
    }

    /// Build a function from assembly lines.
    pub fn assemble<S: AsRef<str>>(
        name: impl Into<String>,
        arity: u16,
        locals: u16,
        returns: u16,
        lines: &[S],
    ) -> Result<Self, AssembleError> {
        let code = assemble(lines)?;
        Ok(Self::new(name, arity, locals, returns, code))
    }
}

/// An ordered set of functions. `call` operands index into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    functions: Vec<Function>,
    entry: Option<u16>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// A program made of a single entry function.
    pub fn single(function: Function) -> Self {
        Self {
            functions: vec![function],
            entry: Some(0),
        }
    }

    /// Appends a function and returns its index, or `None` once the table
    /// has no index left.
    pub fn add_function(&mut self, function: Function) -> Option<u16> {
        let idx = u16::try_from(self.functions.len()).ok()?;
        self.functions.push(function);
        Some(idx)
    }

    pub fn function(&self, idx: u16) -> Option<&Function> {
        self.functions.get(idx as usize)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn find(&self, name: &str) -> Option<u16> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as u16)
    }

    pub fn set_entry(&mut self, idx: u16) {
        self.entry = Some(idx);
    }

    pub fn entry(&self) -> Option<u16> {
        self.entry
    }
}
