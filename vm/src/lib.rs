mod convert;
mod error;
mod fixture;
mod frame;
mod image;
mod interpreter;
mod stack;

pub use convert::{ConvertError, checked_convert, unchecked_convert};
pub use error::{InvokeError, SetupError, Trap, TrapKind, UnknownTrapKind};
pub use fixture::{
    Expectation, Expected, Fixture, FixtureError, FunctionSpec, HeapEntry, Mismatch, Prepared,
    ValueSpec,
};
pub use frame::{ArgumentBank, Frame, LocalBank, LocalSlot};
pub use image::{Image, ImageError, exit_status};
pub use interpreter::{Activation, Interpreter, Status, VMCreateInfo, invoke, invoke_shared};
pub use stack::OperandStack;

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode::{BytecodeBuilder, Function, Kind, Op, Program};
    use heap::{HeapCreateInfo, HeapStore, ReclaimPolicy, SharedHeap};
    use object::{Address, Value};

    fn function(arity: u16, locals: u16, returns: u16, code: &[&str]) -> Program {
        Program::single(Function::assemble("main", arity, locals, returns, code).unwrap())
    }

    fn run(program: &Program, heap: &mut HeapStore, activation: Activation) -> Result<Vec<Value>, Trap> {
        match invoke(program, heap, &VMCreateInfo::default(), activation) {
            Ok(values) => Ok(values),
            Err(InvokeError::Trap(trap)) => Err(trap),
            Err(err) => panic!("setup failed: {err}"),
        }
    }

    fn with_args(args: Vec<Value>) -> Activation {
        Activation {
            args,
            ..Default::default()
        }
    }

    fn with_stack(stack: Vec<Value>) -> Activation {
        Activation {
            stack,
            ..Default::default()
        }
    }

    fn trap_kind(result: Result<Vec<Value>, Trap>) -> TrapKind {
        result.unwrap_err().kind
    }

    #[test]
    fn argument_array_length() {
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["Hello,", "World!"]).unwrap();
        let program = function(1, 0, 1, &["loadarg 0", "refslot 0", "cconv.i32", "ret"]);
        assert_eq!(run(&program, &mut heap, activation), Ok(vec![Value::I32(2)]));
    }

    #[test]
    fn argument_array_length_for_many() {
        let words: Vec<String> = (0..40).map(|n| format!("arg{n}")).collect();
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &words).unwrap();
        let program = function(1, 0, 1, &["loadarg 0", "refslot 0", "cconv.i32", "ret"]);
        assert_eq!(run(&program, &mut heap, activation), Ok(vec![Value::I32(40)]));
    }

    #[test]
    fn string_length_through_pusharray() {
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["Hello,", "World!!"]).unwrap();
        let program = function(
            1,
            0,
            1,
            &["loadarg 0", "push.u8 1", "pusharray", "refslot 0", "ret"],
        );
        assert_eq!(run(&program, &mut heap, activation), Ok(vec![Value::Usize(7)]));
    }

    #[test]
    fn pusharray_bounds() {
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["a", "b"]).unwrap();
        let program = function(1, 0, 1, &["loadarg 0", "push.u8 2", "pusharray", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, activation)),
            TrapKind::IndexOutOfRange
        );

        let program = function(
            1,
            0,
            1,
            &["loadarg 0", "push.u8 255", "uconv.i8", "pusharray", "ret"],
        );
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["a"]).unwrap();
        assert_eq!(
            trap_kind(run(&program, &mut heap, activation)),
            TrapKind::IndexOutOfRange
        );

        let swapped = function(1, 0, 1, &["push.u8 0", "loadarg 0", "pusharray", "ret"]);
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["a"]).unwrap();
        assert_eq!(
            trap_kind(run(&swapped, &mut heap, activation)),
            TrapKind::StackTypeMismatch
        );
    }

    #[test]
    fn loadarg_copies() {
        let program = function(1, 0, 2, &["loadarg 0", "loadarg 0", "ret"]);
        let mut heap = HeapStore::default();
        assert_eq!(
            run(&program, &mut heap, with_args(vec![Value::I16(-3)])),
            Ok(vec![Value::I16(-3), Value::I16(-3)])
        );
    }

    #[test]
    fn poparg_consumes() {
        let mut heap = HeapStore::default();
        let program = function(1, 0, 2, &["poparg 0", "poparg 0", "ret"]);
        let trap = run(&program, &mut heap, with_args(vec![Value::Bool(true)])).unwrap_err();
        assert_eq!(trap, Trap {
            kind: TrapKind::SlotAlreadyConsumed,
            function: 0,
            offset: 2,
        });

        let program = function(1, 0, 2, &["poparg 0", "loadarg 0", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, with_args(vec![Value::Bool(true)]))),
            TrapKind::SlotAlreadyConsumed
        );
    }

    #[test]
    fn argument_slot_out_of_range() {
        let mut heap = HeapStore::default();
        let program = function(1, 0, 1, &["loadarg 1", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, with_args(vec![Value::U8(0)]))),
            TrapKind::InvalidSlot
        );
    }

    #[test]
    fn checked_and_unchecked_narrowing() {
        let mut heap = HeapStore::default();
        let big = vec![Value::U64(0x1_0000_0000)];

        let checked = function(0, 0, 1, &["cconv.i32", "ret"]);
        let trap = run(&checked, &mut heap, with_stack(big.clone())).unwrap_err();
        assert_eq!(trap.kind, TrapKind::ConversionOverflow);
        assert_eq!(trap.offset, 0);

        let unchecked = function(0, 0, 1, &["uconv.i32", "ret"]);
        assert_eq!(
            run(&unchecked, &mut heap, with_stack(big)),
            Ok(vec![Value::I32(0)])
        );
    }

    #[test]
    fn converting_a_reference_is_a_type_error() {
        let mut heap = HeapStore::default();
        let activation = Activation::main(&mut heap, &["x"]).unwrap();
        let program = function(1, 0, 1, &["loadarg 0", "cconv.u64", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, activation)),
            TrapKind::StackTypeMismatch
        );
    }

    #[test]
    fn uninitialized_local() {
        let mut heap = HeapStore::default();
        let program = function(0, 1, 1, &["pushlocal 0", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, Activation::default())),
            TrapKind::UninitializedRead
        );

        let program = function(0, 1, 1, &["initlocal.i32 0", "pushlocal 0", "ret"]);
        assert_eq!(
            run(&program, &mut heap, Activation::default()),
            Ok(vec![Value::I32(0)])
        );
    }

    #[test]
    fn predeclared_locals() {
        let mut heap = HeapStore::default();
        let program = function(0, 2, 1, &["pushlocal 1", "ret"]);
        let activation = Activation {
            locals: vec![None, Some(Kind::F64)],
            ..Default::default()
        };
        assert_eq!(run(&program, &mut heap, activation), Ok(vec![Value::F64(0.0)]));
    }

    #[test]
    fn poplocal_kind_must_match() {
        let mut heap = HeapStore::default();
        let program = function(0, 1, 0, &["initlocal.u8 0", "push.u8 3", "uconv.i8", "poplocal 0", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, Activation::default())),
            TrapKind::StackTypeMismatch
        );

        let program = function(0, 1, 2, &["push.u8 3", "poplocal 0", "pushlocal 0", "pushlocal 0", "ret"]);
        assert_eq!(
            run(&program, &mut heap, Activation::default()),
            Ok(vec![Value::U8(3), Value::U8(3)])
        );
    }

    #[test]
    fn local_slot_out_of_range() {
        let mut heap = HeapStore::default();
        let program = function(0, 1, 0, &["initlocal.bool 1", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, Activation::default())),
            TrapKind::InvalidSlot
        );
    }

    #[test]
    fn dangling_reference() {
        let mut heap = HeapStore::default();
        let program = function(0, 0, 1, &["refslot 0", "ret"]);
        let bogus = Value::reference(Address::new(42, 0), Kind::U8);
        assert_eq!(
            trap_kind(run(&program, &mut heap, with_stack(vec![bogus]))),
            TrapKind::DanglingReference
        );

        let released = heap.create_bytes(b"gone").unwrap();
        let reference = heap.reference(released).unwrap();
        heap.release(released).unwrap();
        assert_eq!(
            trap_kind(run(&program, &mut heap, with_stack(vec![reference]))),
            TrapKind::DanglingReference
        );
    }

    #[test]
    fn recycled_slot_does_not_alias() {
        let mut heap = HeapStore::new(HeapCreateInfo {
            policy: ReclaimPolicy::Recycle,
            capacity: 0,
        });
        let old = heap.create_bytes(b"old").unwrap();
        let stale = heap.reference(old).unwrap();
        heap.release(old).unwrap();
        let new = heap.create_bytes(b"newer").unwrap();
        assert_eq!(new.index(), old.index());

        let program = function(0, 0, 1, &["refslot 0", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, with_stack(vec![stale]))),
            TrapKind::DanglingReference
        );
        let fresh = heap.reference(new).unwrap();
        assert_eq!(
            run(&program, &mut heap, with_stack(vec![fresh])),
            Ok(vec![Value::Usize(5)])
        );
    }

    #[test]
    fn index_past_length() {
        let mut heap = HeapStore::default();
        let bytes = heap.create_bytes(b"abc").unwrap();
        let reference = heap.reference(bytes).unwrap();

        let last = function(0, 0, 1, &["refslot 3", "ret"]);
        assert_eq!(
            run(&last, &mut heap, with_stack(vec![reference])),
            Ok(vec![Value::U8(b'c')])
        );
        let past = function(0, 0, 1, &["refslot 4", "ret"]);
        assert_eq!(
            trap_kind(run(&past, &mut heap, with_stack(vec![reference]))),
            TrapKind::IndexOutOfRange
        );
    }

    #[test]
    fn return_arity() {
        let mut heap = HeapStore::default();
        let too_few = function(0, 0, 2, &["push.u8 1", "ret"]);
        assert_eq!(
            trap_kind(run(&too_few, &mut heap, Activation::default())),
            TrapKind::ReturnArityMismatch
        );
        let too_many = function(0, 0, 0, &["push.u8 1", "ret"]);
        assert_eq!(
            trap_kind(run(&too_many, &mut heap, Activation::default())),
            TrapKind::ReturnArityMismatch
        );
        let exact = function(0, 0, 0, &["ret"]);
        assert_eq!(run(&exact, &mut heap, Activation::default()), Ok(vec![]));
    }

    #[test]
    fn stack_underflow_and_overflow() {
        let mut heap = HeapStore::default();
        let program = function(0, 1, 0, &["poplocal 0", "ret"]);
        assert_eq!(
            trap_kind(run(&program, &mut heap, Activation::default())),
            TrapKind::StackUnderflow
        );

        let program = function(0, 0, 3, &["push.u8 1", "push.u8 2", "push.u8 3", "ret"]);
        let info = VMCreateInfo {
            stack_limit: 2,
            ..Default::default()
        };
        let err = invoke(&program, &mut heap, &info, Activation::default()).unwrap_err();
        assert_eq!(err.trap().map(|trap| (trap.kind, trap.offset)), Some((TrapKind::StackOverflow, 4)));
    }

    #[test]
    fn running_off_the_end() {
        let mut heap = HeapStore::default();
        let program = function(0, 0, 0, &["nop"]);
        let trap = run(&program, &mut heap, Activation::default()).unwrap_err();
        assert_eq!((trap.kind, trap.offset), (TrapKind::CodeOverrun, 1));
    }

    #[test]
    fn undecodable_code() {
        let mut heap = HeapStore::default();
        let program = Program::single(Function::new("main", 0, 0, 0, vec![Op::Nop as u8, 0xEE]));
        let trap = run(&program, &mut heap, Activation::default()).unwrap_err();
        assert_eq!((trap.kind, trap.offset), (TrapKind::InvalidInstruction, 1));
    }

    #[test]
    fn wide_slot_offsets() {
        let mut b = BytecodeBuilder::new();
        b.nop();
        b.push_local(300);
        b.ret();
        let program = Program::single(Function::new("main", 0, 400, 1, b.into_bytes()));
        let mut heap = HeapStore::default();
        let trap = run(&program, &mut heap, Activation::default()).unwrap_err();
        assert_eq!((trap.kind, trap.offset), (TrapKind::UninitializedRead, 1));
    }

    #[test]
    fn trap_leaves_frame_untouched() {
        let program = function(
            1,
            1,
            1,
            &["loadarg 0", "push.u8 7", "poplocal 0", "loadarg 0", "poplocal 0", "ret"],
        );
        let mut heap = HeapStore::default();
        let mut interpreter = Interpreter::new(
            &program,
            &mut heap,
            VMCreateInfo::default(),
            with_args(vec![Value::I64(1)]),
        )
        .unwrap();

        for _ in 0..4 {
            assert_eq!(interpreter.step(), Status::Running);
        }
        let before = interpreter.frame().clone();
        assert_eq!(interpreter.step(), Status::Trapped);
        assert_eq!(interpreter.frame(), &before);
        assert_eq!(interpreter.frame().stack.as_slice(), &[Value::I64(1), Value::I64(1)]);
        assert_eq!(interpreter.frame().locals.read(0), Ok(Value::U8(7)));
        assert_eq!(
            interpreter.trap(),
            Some(Trap {
                kind: TrapKind::StackTypeMismatch,
                function: 0,
                offset: 8,
            })
        );
        // Halted for good.
        assert_eq!(interpreter.step(), Status::Trapped);
    }

    #[test]
    fn full_stack_keeps_argument() {
        let program = function(1, 0, 0, &["poparg 0", "ret"]);
        let mut heap = HeapStore::default();
        let info = VMCreateInfo {
            stack_limit: 1,
            ..Default::default()
        };
        let activation = Activation {
            args: vec![Value::U8(1)],
            stack: vec![Value::U8(2)],
            ..Default::default()
        };
        let mut interpreter = Interpreter::new(&program, &mut heap, info, activation).unwrap();
        assert_eq!(interpreter.step(), Status::Trapped);
        assert_eq!(interpreter.trap().map(|trap| trap.kind), Some(TrapKind::StackOverflow));
        assert!(!interpreter.frame().args.is_consumed(0));
    }

    fn two_functions(main: &[&str], callee: Function) -> Program {
        let mut program = Program::new();
        program.add_function(Function::assemble("main", 0, 0, 2, main).unwrap());
        program.add_function(callee);
        program.set_entry(0);
        program
    }

    #[test]
    fn call_transplants_results() {
        let swap = Function::assemble("swap", 2, 0, 2, &["poparg 1", "poparg 0", "ret"]).unwrap();
        let program = two_functions(&["push.u8 1", "push.u8 2", "call 1", "ret"], swap);
        let mut heap = HeapStore::default();
        assert_eq!(
            run(&program, &mut heap, Activation::default()),
            Ok(vec![Value::U8(2), Value::U8(1)])
        );
    }

    #[test]
    fn trap_in_callee_reports_callee() {
        let bad = Function::assemble("bad", 0, 0, 0, &["nop", "push.u8 1", "ret"]).unwrap();
        let program = two_functions(&["call 1", "ret"], bad);
        let mut heap = HeapStore::default();
        assert_eq!(
            run(&program, &mut heap, Activation::default()),
            Err(Trap {
                kind: TrapKind::ReturnArityMismatch,
                function: 1,
                offset: 3,
            })
        );
    }

    #[test]
    fn call_checks() {
        let mut heap = HeapStore::default();
        let unknown = function(0, 0, 0, &["call 9", "ret"]);
        assert_eq!(
            trap_kind(run(&unknown, &mut heap, Activation::default())),
            TrapKind::InvalidFunction
        );

        let needs_two = Function::assemble("f", 2, 0, 0, &["ret"]).unwrap();
        let program = two_functions(&["push.u8 1", "call 1", "ret"], needs_two);
        assert_eq!(
            trap_kind(run(&program, &mut heap, Activation::default())),
            TrapKind::StackUnderflow
        );
    }

    #[test]
    fn runaway_recursion() {
        let program = function(0, 0, 0, &["call 0", "ret"]);
        let mut heap = HeapStore::default();
        let info = VMCreateInfo {
            frame_limit: 16,
            ..Default::default()
        };
        let err = invoke(&program, &mut heap, &info, Activation::default()).unwrap_err();
        assert_eq!(err.trap().map(|trap| trap.kind), Some(TrapKind::StackOverflow));
    }

    #[test]
    fn setup_errors() {
        let mut heap = HeapStore::default();
        let program = function(1, 0, 0, &["ret"]);
        let info = VMCreateInfo::default();
        assert_eq!(
            invoke(&program, &mut heap, &info, Activation::default()),
            Err(InvokeError::Setup(SetupError::ArgumentCount {
                expected: 1,
                found: 0,
            }))
        );
        assert_eq!(
            invoke(&Program::new(), &mut heap, &info, Activation::default()),
            Err(InvokeError::Setup(SetupError::NoEntry))
        );

        let program = function(0, 0, 0, &["ret"]);
        let activation = Activation {
            locals: vec![Some(Kind::U8)],
            ..Default::default()
        };
        assert!(matches!(
            invoke(&program, &mut heap, &info, activation),
            Err(InvokeError::Setup(SetupError::TooManyLocals { .. }))
        ));
    }

    #[test]
    fn shared_heap_across_threads() {
        let shared = SharedHeap::default();
        let program = function(1, 0, 1, &["loadarg 0", "refslot 0", "ret"]);

        let handles: Vec<_> = (1..=4usize)
            .map(|n| {
                let shared = shared.clone();
                let program = program.clone();
                std::thread::spawn(move || {
                    let words = vec!["w"; n];
                    let activation = Activation::main(&mut shared.lock(), &words).unwrap();
                    invoke_shared(&program, &shared, &VMCreateInfo::default(), activation)
                })
            })
            .collect();

        let mut lengths: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();
        lengths.sort_by_key(|stack| stack[0].as_integer());
        assert_eq!(lengths, (1..=4).map(|n| vec![Value::Usize(n)]).collect::<Vec<_>>());
    }

    const FIXTURES: &[(&str, &str)] = &[
        ("args_length", include_str!("../fixtures/args_length.json")),
        ("args_length_locals", include_str!("../fixtures/args_length_locals.json")),
        ("poparg_twice", include_str!("../fixtures/poparg_twice.json")),
        ("checked_overflow", include_str!("../fixtures/checked_overflow.json")),
        ("checked_fraction", include_str!("../fixtures/checked_fraction.json")),
        ("unchecked_wrap", include_str!("../fixtures/unchecked_wrap.json")),
        ("uninitialized_local", include_str!("../fixtures/uninitialized_local.json")),
        ("index_out_of_range", include_str!("../fixtures/index_out_of_range.json")),
        ("nested_call", include_str!("../fixtures/nested_call.json")),
        ("return_arity", include_str!("../fixtures/return_arity.json")),
    ];

    #[test]
    fn fixtures_meet_expectations() {
        for (name, text) in FIXTURES {
            let fixture = Fixture::from_json(text).unwrap_or_else(|err| panic!("{name}: {err}"));
            assert!(fixture.expect.is_some(), "{name}");
            let mut prepared = fixture
                .prepare(HeapCreateInfo::default())
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            let outcome = prepared.run(&VMCreateInfo::default()).unwrap();
            if let Err(mismatch) = prepared.check(&outcome) {
                panic!("{name}: {mismatch}");
            }
        }
    }
}
