use std::mem;

use bytecode::{Instruction, Kind, Program, decode_at};
use heap::{HeapError, HeapStore, SharedHeap};
use log::{debug, info, trace, warn};
use object::Value;

use crate::{
    Frame, InvokeError, SetupError, Trap, TrapKind, checked_convert, unchecked_convert,
};

#[derive(Debug, Clone)]
pub struct VMCreateInfo {
    /// Maximum depth of each frame's operand stack.
    pub stack_limit: usize,
    /// Maximum number of live frames, the entry frame included.
    pub frame_limit: usize,
}

impl Default for VMCreateInfo {
    fn default() -> Self {
        Self {
            stack_limit: 1024,
            frame_limit: 1024,
        }
    }
}

/// Initial contents of the entry frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activation {
    pub args: Vec<Value>,
    /// Initial operand stack, bottom first.
    pub stack: Vec<Value>,
    /// Kinds pre-declared for the first local slots; `None` leaves a slot
    /// uninitialized.
    pub locals: Vec<Option<Kind>>,
}

impl Activation {
    /// The `main(args: str[])` calling convention: every string becomes a
    /// `u8` array and the single argument is a `ref` to an array of
    /// references to them.
    pub fn main<S: AsRef<str>>(heap: &mut HeapStore, args: &[S]) -> Result<Self, HeapError> {
        let refs = args
            .iter()
            .map(|arg| {
                let address = heap.create_bytes(arg.as_ref().as_bytes())?;
                heap.reference(address)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let array = heap.create(Kind::Ref, refs)?;

        Ok(Self {
            args: vec![heap.reference(array)?],
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Returned,
    Trapped,
}

enum Flow {
    Continue,
    Returned(Vec<Value>),
}

/// Executes one invocation of a program's entry function.
///
/// The interpreter holds the heap store exclusively for its whole lifetime.
/// Every instruction validates its operands before touching any state, so a
/// trapped interpreter still shows the frames exactly as they were before
/// the offending instruction.
pub struct Interpreter<'a> {
    program: &'a Program,
    heap: &'a mut HeapStore,
    info: VMCreateInfo,
    frame: Frame,
    callers: Vec<Frame>,
    result: Option<Result<Vec<Value>, Trap>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        program: &'a Program,
        heap: &'a mut HeapStore,
        info: VMCreateInfo,
        activation: Activation,
    ) -> Result<Self, SetupError> {
        let entry = program.entry().ok_or(SetupError::NoEntry)?;
        let function = program
            .function(entry)
            .ok_or(SetupError::UnknownEntry(entry))?;

        let Activation { args, stack, locals } = activation;
        if args.len() != function.arity as usize {
            return Err(SetupError::ArgumentCount {
                expected: function.arity,
                found: args.len(),
            });
        }
        let too_many_locals = SetupError::TooManyLocals {
            declared: locals.len(),
            available: function.locals,
        };
        if locals.len() > function.locals as usize {
            return Err(too_many_locals);
        }

        let mut frame = Frame::new(entry, args, function.locals as usize, info.stack_limit);
        for (slot, kind) in locals.into_iter().enumerate() {
            if let Some(kind) = kind {
                frame
                    .locals
                    .init(slot, kind)
                    .map_err(|_| too_many_locals.clone())?;
            }
        }
        let depth = stack.len();
        frame.stack.extend(stack).map_err(|_| SetupError::StackTooDeep {
            depth,
            limit: info.stack_limit,
        })?;

        info!(
            "invoking `{}` ({} args, {} locals, {} returns)",
            function.name, function.arity, function.locals, function.returns
        );

        Ok(Self {
            program,
            heap,
            info,
            frame,
            callers: Vec::new(),
            result: None,
        })
    }

    pub fn status(&self) -> Status {
        match self.result {
            None => Status::Running,
            Some(Ok(_)) => Status::Returned,
            Some(Err(_)) => Status::Trapped,
        }
    }

    /// The innermost frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Number of live frames.
    pub fn depth(&self) -> usize {
        self.callers.len() + 1
    }

    pub fn trap(&self) -> Option<Trap> {
        match self.result {
            Some(Err(trap)) => Some(trap),
            _ => None,
        }
    }

    /// Executes one instruction. Once the interpreter has returned or
    /// trapped this does nothing.
    pub fn step(&mut self) -> Status {
        if self.result.is_some() {
            return self.status();
        }

        match self.execute() {
            Ok(Flow::Continue) => {}
            Ok(Flow::Returned(values)) => {
                info!("returned {} values", values.len());
                self.result = Some(Ok(values));
            }
            Err(trap) => {
                warn!("trap: {trap}");
                self.result = Some(Err(trap));
            }
        }
        self.status()
    }

    /// Runs to completion. A trap unwinds every frame.
    pub fn run(mut self) -> Result<Vec<Value>, Trap> {
        loop {
            if let Some(result) = self.result.take() {
                self.callers.clear();
                return result;
            }
            self.step();
        }
    }

    fn execute(&mut self) -> Result<Flow, Trap> {
        let program = self.program;
        let function_idx = self.frame.function;
        let offset = self.frame.pc;
        let trap = |kind| Trap {
            kind,
            function: function_idx,
            offset,
        };

        let function = program
            .function(function_idx)
            .ok_or(trap(TrapKind::InvalidFunction))?;
        if offset >= function.code.len() {
            return Err(trap(TrapKind::CodeOverrun));
        }
        let (instruction, next) = decode_at(&function.code, offset).map_err(|err| {
            debug!("{}: {err}", function.name);
            trap(TrapKind::InvalidInstruction)
        })?;

        debug!("{}:{offset:#06x} {instruction}", function.name);
        let flow = self.dispatch(instruction, next).map_err(trap)?;
        trace!("stack {:?}", self.frame.stack.as_slice());
        Ok(flow)
    }

    fn dispatch(&mut self, instruction: Instruction, next: usize) -> Result<Flow, TrapKind> {
        self.frame.stack.require(instruction.stack_inputs())?;

        match instruction {
            Instruction::Call { function } => return self.call(function, next),
            Instruction::Ret => return self.ret(),
            Instruction::Nop => {}
            Instruction::PushU8 { value } => {
                self.frame.stack.push(Value::U8(value))?;
            }
            Instruction::LoadArg { slot } => {
                let frame = &mut self.frame;
                frame.stack.ensure_room(1)?;
                let value = frame.args.read(slot as usize)?;
                frame.stack.push(value)?;
            }
            Instruction::PopArg { slot } => {
                let frame = &mut self.frame;
                frame.stack.ensure_room(1)?;
                let value = frame.args.take(slot as usize)?;
                frame.stack.push(value)?;
            }
            Instruction::InitLocal { slot, kind } => {
                self.frame.locals.init(slot as usize, kind)?;
            }
            Instruction::PopLocal { slot } => {
                let frame = &mut self.frame;
                let value = frame.stack.peek()?;
                frame.locals.check_write(slot as usize, value.kind())?;
                frame.stack.pop()?;
                frame.locals.write(slot as usize, value)?;
            }
            Instruction::PushLocal { slot } => {
                let frame = &mut self.frame;
                frame.stack.ensure_room(1)?;
                let value = frame.locals.read(slot as usize)?;
                frame.stack.push(value)?;
            }
            Instruction::RefSlot { slot } => {
                let reference = self.frame.stack.peek_ref(0)?;
                let value = self.heap.deref(reference.address, slot as usize)?;
                self.frame.stack.replace_top(value)?;
            }
            Instruction::PushArray => {
                let stack = &mut self.frame.stack;
                let index = stack
                    .peek()?
                    .as_integer()
                    .ok_or(TrapKind::StackTypeMismatch)?;
                let reference = stack.peek_ref(1)?;
                // Element i of the payload sits behind the length header.
                let element = usize::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .ok_or(TrapKind::IndexOutOfRange)?;
                let value = self.heap.deref(reference.address, element)?;
                stack.pop_n(2)?;
                stack.push(value)?;
            }
            Instruction::CheckedConvert { kind } => {
                let stack = &mut self.frame.stack;
                let value = checked_convert(stack.peek()?, kind)?;
                stack.replace_top(value)?;
            }
            Instruction::UncheckedConvert { kind } => {
                let stack = &mut self.frame.stack;
                let value = unchecked_convert(stack.peek()?, kind)?;
                stack.replace_top(value)?;
            }
        }

        self.frame.pc = next;
        Ok(Flow::Continue)
    }

    fn call(&mut self, function: u16, next: usize) -> Result<Flow, TrapKind> {
        let callee = self
            .program
            .function(function)
            .ok_or(TrapKind::InvalidFunction)?;
        if self.depth() >= self.info.frame_limit {
            return Err(TrapKind::StackOverflow);
        }

        let args = self.frame.stack.pop_n(callee.arity as usize)?;
        self.frame.pc = next;

        debug!("call `{}` with {:?}", callee.name, args);
        let frame = Frame::new(
            function,
            args,
            callee.locals as usize,
            self.info.stack_limit,
        );
        let caller = mem::replace(&mut self.frame, frame);
        self.callers.push(caller);
        Ok(Flow::Continue)
    }

    fn ret(&mut self) -> Result<Flow, TrapKind> {
        let returns = self
            .program
            .function(self.frame.function)
            .map(|function| function.returns as usize)
            .ok_or(TrapKind::InvalidFunction)?;
        if self.frame.stack.depth() != returns {
            return Err(TrapKind::ReturnArityMismatch);
        }
        if let Some(caller) = self.callers.last() {
            caller.stack.ensure_room(returns)?;
        }

        let values = self.frame.stack.pop_n(returns)?;
        match self.callers.pop() {
            Some(caller) => {
                self.frame = caller;
                self.frame.stack.extend(values)?;
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Returned(values)),
        }
    }
}

/// Runs `program`'s entry function against `heap` and returns the final
/// operand stack.
pub fn invoke(
    program: &Program,
    heap: &mut HeapStore,
    info: &VMCreateInfo,
    activation: Activation,
) -> Result<Vec<Value>, InvokeError> {
    let interpreter = Interpreter::new(program, heap, info.clone(), activation)?;
    Ok(interpreter.run()?)
}

/// Like [`invoke`], holding the shared store's lock for the whole
/// invocation.
pub fn invoke_shared(
    program: &Program,
    heap: &SharedHeap,
    info: &VMCreateInfo,
    activation: Activation,
) -> Result<Vec<Value>, InvokeError> {
    let mut store = heap.lock();
    invoke(program, &mut store, info, activation)
}
