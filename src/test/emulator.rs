//! A small bytecode interpreter for exercising woven classes.
//!
//! Covers the instructions the fixtures and the weaver emit, with exception table dispatch and
//! a recording monitoring context. Every frame checks that the operand stack stays within
//! `max_stack` and every local access within `max_locals`, so an undersized woven body fails
//! the test that runs it.

use std::collections::HashMap;

use crate::{
    assembly::{decode_stream, opcodes, Instruction, Operand},
    classfile::{
        attribute::CODE, ClassFile, CodeAttribute, ConstantPoolEntry, FieldType, MethodDescriptor,
        ReturnType,
    },
    weaver::WeaveConfig,
};

/// Index into [`Emulator::heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef(pub usize);

/// A value on the operand stack or in a local slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Null,
    Ref(HeapRef),
    /// Unset slot, or the upper half of a wide value
    Top,
}

impl EmValue {
    fn width(self) -> usize {
        match self {
            EmValue::I64(_) | EmValue::F64(_) => 2,
            _ => 1,
        }
    }

    fn int(self) -> i32 {
        match self {
            EmValue::I32(value) => value,
            other => panic!("expected int, found {other:?}"),
        }
    }

    fn long(self) -> i64 {
        match self {
            EmValue::I64(value) => value,
            other => panic!("expected long, found {other:?}"),
        }
    }

    fn reference(self) -> Option<HeapRef> {
        match self {
            EmValue::Ref(r) => Some(r),
            EmValue::Null => None,
            other => panic!("expected reference, found {other:?}"),
        }
    }
}

/// A boxed primitive as produced by `<Wrapper>.valueOf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boxed {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    String(String),
    Array(Vec<EmValue>),
    Boxed(Boxed),
    Context(usize),
    Throwable(String),
    Instance(String),
}

/// One call into the monitoring context.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Start {
        receiver: EmValue,
        label: String,
        arguments: Vec<EmValue>,
    },
    Stop {
        context: HeapRef,
        result: EmValue,
    },
    StopWithException {
        context: HeapRef,
        thrown: HeapRef,
    },
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    Returned(Option<EmValue>),
    Threw(HeapRef),
}

pub struct Emulator {
    class: ClassFile,
    class_name: String,
    config: WeaveConfig,
    pub heap: Vec<HeapObject>,
    pub events: Vec<HookEvent>,
    /// Make `start` throw an `IllegalStateException`
    pub start_throws: bool,
    /// Make `stop` throw an `IllegalStateException`
    pub stop_throws: bool,
    contexts: usize,
}

struct Frame<'c> {
    code: &'c CodeAttribute,
    instructions: Vec<Instruction>,
    index_of: HashMap<u32, usize>,
    locals: Vec<EmValue>,
    stack: Vec<EmValue>,
}

impl Frame<'_> {
    fn push(&mut self, value: EmValue) {
        self.stack.push(value);
        let depth: usize = self.stack.iter().map(|v| v.width()).sum();
        assert!(
            depth <= usize::from(self.code.max_stack),
            "operand stack depth {depth} exceeds max_stack {}",
            self.code.max_stack
        );
    }

    fn pop(&mut self) -> EmValue {
        self.stack.pop().expect("operand stack underflow")
    }

    fn load(&self, slot: u16) -> EmValue {
        let value = self.locals[self.checked_slot(slot, 1)];
        assert_ne!(value, EmValue::Top, "read of unset local {slot}");
        value
    }

    fn store(&mut self, slot: u16, value: EmValue) {
        let index = self.checked_slot(slot, value.width());
        self.locals[index] = value;
        if value.width() == 2 {
            self.locals[index + 1] = EmValue::Top;
        }
    }

    fn checked_slot(&self, slot: u16, width: usize) -> usize {
        let index = usize::from(slot);
        assert!(
            index + width <= self.locals.len(),
            "local {slot} outside max_locals {}",
            self.locals.len()
        );
        index
    }

    fn jump(&self, target: u32) -> usize {
        self.index_of[&target]
    }
}

impl Emulator {
    pub fn new(bytes: &[u8]) -> Self {
        let class = ClassFile::parse(bytes).unwrap();
        let class_name = class.this_class_name().unwrap();
        Emulator {
            class,
            class_name,
            config: WeaveConfig::default(),
            heap: Vec::new(),
            events: Vec::new(),
            start_throws: false,
            stop_throws: false,
            contexts: 0,
        }
    }

    pub fn alloc(&mut self, object: HeapObject) -> HeapRef {
        self.heap.push(object);
        HeapRef(self.heap.len() - 1)
    }

    pub fn string(&mut self, value: &str) -> EmValue {
        EmValue::Ref(self.alloc(HeapObject::String(value.to_string())))
    }

    /// Recognise hooks on a context other than the default one.
    pub fn with_config(mut self, config: WeaveConfig) -> Self {
        self.config = config;
        self
    }

    /// A fresh instance of the class under test.
    pub fn instance(&mut self) -> EmValue {
        let class = self.class_name.clone();
        EmValue::Ref(self.alloc(HeapObject::Instance(class)))
    }

    pub fn object(&self, r: HeapRef) -> &HeapObject {
        &self.heap[r.0]
    }

    /// The boxed argument array or result behind `value`, for assertions.
    pub fn referent(&self, value: EmValue) -> Option<&HeapObject> {
        value.reference().map(|r| self.object(r))
    }

    pub fn invoke(
        &mut self,
        name: &str,
        descriptor: &str,
        receiver: Option<EmValue>,
        arguments: &[EmValue],
    ) -> Completion {
        let code = self.code_of(name, descriptor);
        let parsed = MethodDescriptor::parse(descriptor).unwrap();
        let instructions = decode_stream(&code.code).unwrap();
        let index_of = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.offset, index))
            .collect();

        let mut frame = Frame {
            code: &code,
            instructions,
            index_of,
            locals: vec![EmValue::Top; usize::from(code.max_locals)],
            stack: Vec::new(),
        };
        let mut slot = 0;
        if let Some(receiver) = receiver {
            frame.store(slot, receiver);
            slot += 1;
        }
        assert_eq!(arguments.len(), parsed.parameters.len());
        for (value, parameter) in arguments.iter().zip(&parsed.parameters) {
            frame.store(slot, *value);
            slot += parameter.width();
        }

        self.run(&mut frame)
    }

    fn code_of(&self, name: &str, descriptor: &str) -> CodeAttribute {
        let pool = &self.class.constant_pool;
        let method = self
            .class
            .methods
            .iter()
            .find(|m| {
                pool.utf8(m.name_index).unwrap() == name
                    && pool.utf8(m.descriptor_index).unwrap() == descriptor
            })
            .unwrap_or_else(|| panic!("no method {name}{descriptor}"));
        let position = method.find_attribute(pool, CODE).unwrap().unwrap();
        CodeAttribute::parse(&method.attributes[position].info).unwrap()
    }

    fn throwable(&mut self, class: &str) -> HeapRef {
        self.alloc(HeapObject::Throwable(class.to_string()))
    }

    fn catches(&self, catch_type: u16, thrown: HeapRef) -> bool {
        if catch_type == 0 {
            return true;
        }
        let HeapObject::Throwable(class) = self.object(thrown) else {
            panic!("thrown value is not a throwable");
        };
        match self
            .class
            .constant_pool
            .class_name(catch_type)
            .unwrap()
            .as_str()
        {
            "java/lang/Throwable" => true,
            "java/lang/Exception" | "java/lang/RuntimeException" => !class.ends_with("Error"),
            other => other == class,
        }
    }

    /// Index of the handler for `thrown` raised at instruction `index`, if any.
    fn dispatch(&self, frame: &mut Frame<'_>, index: usize, thrown: HeapRef) -> Option<usize> {
        let offset = frame.instructions[index].offset;
        let code = frame.code;
        let handler_pc = code
            .exception_table
            .iter()
            .find(|entry| {
                u32::from(entry.start_pc) <= offset
                    && offset < u32::from(entry.end_pc)
                    && self.catches(entry.catch_type, thrown)
            })?
            .handler_pc;
        frame.stack.clear();
        frame.push(EmValue::Ref(thrown));
        Some(frame.jump(u32::from(handler_pc)))
    }

    fn pop_arguments(frame: &mut Frame<'_>, descriptor: &MethodDescriptor) -> Vec<EmValue> {
        let mut arguments: Vec<EmValue> = (0..descriptor.parameters.len())
            .map(|_| frame.pop())
            .collect();
        arguments.reverse();
        arguments
    }

    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
    fn run(&mut self, frame: &mut Frame<'_>) -> Completion {
        let mut index = 0;
        loop {
            let instruction = frame.instructions[index].clone();
            let mut next = index + 1;
            let mut thrown: Option<HeapRef> = None;

            match instruction.opcode {
                opcodes::NOP | opcodes::CHECKCAST => {}
                opcodes::ACONST_NULL => frame.push(EmValue::Null),
                op @ opcodes::ICONST_M1..=opcodes::ICONST_5 => {
                    frame.push(EmValue::I32(i32::from(op) - i32::from(opcodes::ICONST_0)));
                }
                op @ (opcodes::LCONST_0 | opcodes::LCONST_1) => {
                    frame.push(EmValue::I64(i64::from(op - opcodes::LCONST_0)));
                }
                op @ opcodes::FCONST_0..=opcodes::FCONST_2 => {
                    frame.push(EmValue::F32(f32::from(op - opcodes::FCONST_0)));
                }
                op @ (opcodes::DCONST_0 | opcodes::DCONST_1) => {
                    frame.push(EmValue::F64(f64::from(op - opcodes::DCONST_0)));
                }
                opcodes::BIPUSH | opcodes::SIPUSH => match instruction.operand {
                    Operand::Int(value) => frame.push(EmValue::I32(value)),
                    ref other => panic!("unexpected operand {other:?}"),
                },
                opcodes::LDC | opcodes::LDC_W | opcodes::LDC2_W => {
                    let Operand::Constant(index) = instruction.operand else {
                        panic!("ldc without constant");
                    };
                    let entry = self.class.constant_pool.get(index).unwrap().clone();
                    let value = match entry {
                        ConstantPoolEntry::Integer(value) => EmValue::I32(value),
                        ConstantPoolEntry::Float(bits) => EmValue::F32(f32::from_bits(bits)),
                        ConstantPoolEntry::Long(value) => EmValue::I64(value),
                        ConstantPoolEntry::Double(bits) => EmValue::F64(f64::from_bits(bits)),
                        ConstantPoolEntry::String { string_index } => {
                            let text = self.class.constant_pool.utf8(string_index).unwrap();
                            self.string(&text)
                        }
                        other => panic!("unsupported constant {other:?}"),
                    };
                    frame.push(value);
                }
                opcodes::ILOAD..=opcodes::ALOAD => {
                    let Operand::Local(slot) = instruction.operand else {
                        panic!("load without slot");
                    };
                    frame.push(frame.load(slot));
                }
                op @ opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
                    let slot = u16::from((op - opcodes::ILOAD_0) % 4);
                    frame.push(frame.load(slot));
                }
                opcodes::ISTORE..=opcodes::ASTORE => {
                    let Operand::Local(slot) = instruction.operand else {
                        panic!("store without slot");
                    };
                    let value = frame.pop();
                    frame.store(slot, value);
                }
                op @ opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
                    let slot = u16::from((op - opcodes::ISTORE_0) % 4);
                    let value = frame.pop();
                    frame.store(slot, value);
                }
                opcodes::AALOAD => {
                    let position = frame.pop().int();
                    let array = frame.pop().reference().unwrap();
                    let HeapObject::Array(elements) = self.object(array) else {
                        panic!("aaload on non-array");
                    };
                    let element = elements[usize::try_from(position).unwrap()];
                    frame.push(element);
                }
                opcodes::AASTORE => {
                    let value = frame.pop();
                    let position = frame.pop().int();
                    let array = frame.pop().reference().unwrap();
                    let HeapObject::Array(elements) = &mut self.heap[array.0] else {
                        panic!("aastore on non-array");
                    };
                    elements[usize::try_from(position).unwrap()] = value;
                }
                opcodes::ARRAYLENGTH => {
                    let array = frame.pop().reference().unwrap();
                    let HeapObject::Array(elements) = self.object(array) else {
                        panic!("arraylength on non-array");
                    };
                    let length = i32::try_from(elements.len()).unwrap();
                    frame.push(EmValue::I32(length));
                }
                opcodes::POP => {
                    frame.pop();
                }
                opcodes::POP2 => {
                    if frame.pop().width() == 1 {
                        frame.pop();
                    }
                }
                opcodes::DUP => {
                    let value = frame.pop();
                    frame.push(value);
                    frame.push(value);
                }
                opcodes::SWAP => {
                    let top = frame.pop();
                    let below = frame.pop();
                    frame.push(top);
                    frame.push(below);
                }
                opcodes::IADD | opcodes::ISUB | opcodes::IMUL | opcodes::IDIV | opcodes::IREM => {
                    let right = frame.pop().int();
                    let left = frame.pop().int();
                    let result = match instruction.opcode {
                        opcodes::IADD => Some(left.wrapping_add(right)),
                        opcodes::ISUB => Some(left.wrapping_sub(right)),
                        opcodes::IMUL => Some(left.wrapping_mul(right)),
                        opcodes::IDIV => left.checked_div(right),
                        _ => left.checked_rem(right),
                    };
                    match result {
                        Some(value) => frame.push(EmValue::I32(value)),
                        None => thrown = Some(self.throwable("java/lang/ArithmeticException")),
                    }
                }
                opcodes::LADD | opcodes::LSUB | opcodes::LMUL => {
                    let right = frame.pop().long();
                    let left = frame.pop().long();
                    frame.push(EmValue::I64(match instruction.opcode {
                        opcodes::LADD => left.wrapping_add(right),
                        opcodes::LSUB => left.wrapping_sub(right),
                        _ => left.wrapping_mul(right),
                    }));
                }
                opcodes::DADD | opcodes::DMUL => {
                    let (EmValue::F64(right), EmValue::F64(left)) = (frame.pop(), frame.pop())
                    else {
                        panic!("double arithmetic on non-doubles");
                    };
                    frame.push(EmValue::F64(if instruction.opcode == opcodes::DADD {
                        left + right
                    } else {
                        left * right
                    }));
                }
                opcodes::INEG => {
                    let value = frame.pop().int();
                    frame.push(EmValue::I32(value.wrapping_neg()));
                }
                opcodes::IINC => {
                    let Operand::Iinc { index: slot, delta } = instruction.operand else {
                        panic!("iinc without operand");
                    };
                    let value = frame.load(slot).int();
                    frame.store(slot, EmValue::I32(value.wrapping_add(i32::from(delta))));
                }
                opcodes::I2L => {
                    let value = frame.pop().int();
                    frame.push(EmValue::I64(i64::from(value)));
                }
                opcodes::L2I => {
                    let value = frame.pop().long();
                    frame.push(EmValue::I32(value as i32));
                }
                opcodes::LCMP => {
                    let right = frame.pop().long();
                    let left = frame.pop().long();
                    frame.push(EmValue::I32(match left.cmp(&right) {
                        std::cmp::Ordering::Less => -1,
                        std::cmp::Ordering::Equal => 0,
                        std::cmp::Ordering::Greater => 1,
                    }));
                }
                op @ opcodes::IFEQ..=opcodes::IFLE => {
                    let value = frame.pop().int();
                    let taken = match op {
                        opcodes::IFEQ => value == 0,
                        opcodes::IFNE => value != 0,
                        opcodes::IFLT => value < 0,
                        opcodes::IFGE => value >= 0,
                        opcodes::IFGT => value > 0,
                        _ => value <= 0,
                    };
                    if taken {
                        next = frame.jump(instruction.branch_targets[0]);
                    }
                }
                op @ opcodes::IF_ICMPEQ..=opcodes::IF_ICMPLE => {
                    let right = frame.pop().int();
                    let left = frame.pop().int();
                    let taken = match op {
                        opcodes::IF_ICMPEQ => left == right,
                        opcodes::IF_ICMPNE => left != right,
                        opcodes::IF_ICMPLT => left < right,
                        opcodes::IF_ICMPGE => left >= right,
                        opcodes::IF_ICMPGT => left > right,
                        _ => left <= right,
                    };
                    if taken {
                        next = frame.jump(instruction.branch_targets[0]);
                    }
                }
                op @ (opcodes::IF_ACMPEQ | opcodes::IF_ACMPNE) => {
                    let right = frame.pop().reference();
                    let left = frame.pop().reference();
                    if (left == right) == (op == opcodes::IF_ACMPEQ) {
                        next = frame.jump(instruction.branch_targets[0]);
                    }
                }
                op @ (opcodes::IFNULL | opcodes::IFNONNULL) => {
                    let value = frame.pop().reference();
                    if value.is_none() == (op == opcodes::IFNULL) {
                        next = frame.jump(instruction.branch_targets[0]);
                    }
                }
                opcodes::GOTO | opcodes::GOTO_W => {
                    next = frame.jump(instruction.branch_targets[0]);
                }
                opcodes::TABLESWITCH => {
                    let key = frame.pop().int();
                    let Operand::TableSwitch {
                        default,
                        low,
                        high,
                        ref targets,
                    } = instruction.operand
                    else {
                        panic!("tableswitch without table");
                    };
                    let target = if (low..=high).contains(&key) {
                        targets[usize::try_from(key - low).unwrap()]
                    } else {
                        default
                    };
                    next = frame.jump(target);
                }
                opcodes::LOOKUPSWITCH => {
                    let key = frame.pop().int();
                    let Operand::LookupSwitch {
                        default,
                        ref pairs,
                    } = instruction.operand
                    else {
                        panic!("lookupswitch without pairs");
                    };
                    let target = pairs
                        .iter()
                        .find(|(candidate, _)| *candidate == key)
                        .map_or(default, |(_, target)| *target);
                    next = frame.jump(target);
                }
                opcodes::NEW => {
                    let Operand::Constant(index) = instruction.operand else {
                        panic!("new without class");
                    };
                    let class = self.class.constant_pool.class_name(index).unwrap();
                    let object = if class.ends_with("Exception") || class.ends_with("Error") {
                        HeapObject::Throwable(class)
                    } else {
                        HeapObject::Instance(class)
                    };
                    let r = self.alloc(object);
                    frame.push(EmValue::Ref(r));
                }
                opcodes::ANEWARRAY => {
                    let length = usize::try_from(frame.pop().int()).unwrap();
                    let r = self.alloc(HeapObject::Array(vec![EmValue::Null; length]));
                    frame.push(EmValue::Ref(r));
                }
                opcodes::MONITORENTER | opcodes::MONITOREXIT => {
                    frame.pop().reference().unwrap();
                }
                opcodes::ATHROW => {
                    thrown = Some(match frame.pop().reference() {
                        Some(r) => r,
                        None => self.throwable("java/lang/NullPointerException"),
                    });
                }
                opcodes::INVOKESTATIC | opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL => {
                    match self.call(frame, &instruction) {
                        Ok(Some(value)) => frame.push(value),
                        Ok(None) => {}
                        Err(exception) => thrown = Some(exception),
                    }
                }
                opcodes::IRETURN
                | opcodes::LRETURN
                | opcodes::FRETURN
                | opcodes::DRETURN
                | opcodes::ARETURN => {
                    return Completion::Returned(Some(frame.pop()));
                }
                opcodes::RETURN => return Completion::Returned(None),
                other => panic!("emulator does not support {}", instruction_name(other)),
            }

            if let Some(exception) = thrown {
                match self.dispatch(frame, index, exception) {
                    Some(handler) => next = handler,
                    None => return Completion::Threw(exception),
                }
            }
            index = next;
        }
    }

    /// Perform an invocation; `Err` carries an exception thrown by the callee.
    fn call(
        &mut self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<Option<EmValue>, HeapRef> {
        let Operand::Constant(index) = instruction.operand else {
            panic!("invocation without method reference");
        };
        let (owner, name, raw_descriptor) = self.class.constant_pool.member_ref(index).unwrap();
        let descriptor = MethodDescriptor::parse(&raw_descriptor).unwrap();
        let arguments = Self::pop_arguments(frame, &descriptor);
        let receiver = if instruction.opcode == opcodes::INVOKESTATIC {
            None
        } else {
            Some(frame.pop())
        };

        if owner == self.config.context_class {
            return self.hook(&name, receiver, arguments);
        }
        if name == "valueOf" && owner.starts_with("java/lang/") {
            let boxed = match (&descriptor.parameters[0], arguments[0]) {
                (FieldType::Base(base), value) => box_value(base.descriptor_char(), value),
                other => panic!("unsupported valueOf {other:?}"),
            };
            return Ok(Some(EmValue::Ref(self.alloc(HeapObject::Boxed(boxed)))));
        }
        if name == "<init>" {
            return Ok(None);
        }
        if owner == self.class_name {
            let completion = self.invoke(&name, &raw_descriptor, receiver, &arguments);
            return match completion {
                Completion::Returned(value) => {
                    assert_eq!(value.is_none(), descriptor.return_type == ReturnType::Void);
                    Ok(value)
                }
                Completion::Threw(exception) => Err(exception),
            };
        }
        panic!("emulator cannot call {owner}.{name}{raw_descriptor}");
    }

    fn hook(
        &mut self,
        name: &str,
        receiver: Option<EmValue>,
        arguments: Vec<EmValue>,
    ) -> Result<Option<EmValue>, HeapRef> {
        if name == self.config.start_method {
            let label = match self.referent(arguments[1]) {
                Some(HeapObject::String(label)) => label.clone(),
                other => panic!("label is not a string: {other:?}"),
            };
            let array = match self.referent(arguments[2]) {
                Some(HeapObject::Array(elements)) => elements.clone(),
                other => panic!("arguments are not an array: {other:?}"),
            };
            self.events.push(HookEvent::Start {
                receiver: arguments[0],
                label,
                arguments: array,
            });
            if self.start_throws {
                return Err(self.throwable("java/lang/IllegalStateException"));
            }
            self.contexts += 1;
            let context = self.alloc(HeapObject::Context(self.contexts));
            return Ok(Some(EmValue::Ref(context)));
        }

        let context = receiver
            .and_then(EmValue::reference)
            .expect("hook called without context");
        assert!(matches!(self.object(context), HeapObject::Context(_)));

        if name == self.config.stop_method {
            self.events.push(HookEvent::Stop {
                context,
                result: arguments[0],
            });
            if self.stop_throws {
                return Err(self.throwable("java/lang/IllegalStateException"));
            }
            Ok(None)
        } else if name == self.config.stop_with_exception_method {
            let thrown = arguments[0].reference().expect("null exception");
            self.events.push(HookEvent::StopWithException { context, thrown });
            Ok(None)
        } else {
            panic!("unknown hook {name}");
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn box_value(descriptor: char, value: EmValue) -> Boxed {
    match (descriptor, value) {
        ('Z', EmValue::I32(v)) => Boxed::Boolean(v != 0),
        ('B', EmValue::I32(v)) => Boxed::Byte(v as i8),
        ('C', EmValue::I32(v)) => Boxed::Char(v as u16),
        ('S', EmValue::I32(v)) => Boxed::Short(v as i16),
        ('I', EmValue::I32(v)) => Boxed::Integer(v),
        ('J', EmValue::I64(v)) => Boxed::Long(v),
        ('F', EmValue::F32(v)) => Boxed::Float(v),
        ('D', EmValue::F64(v)) => Boxed::Double(v),
        other => panic!("cannot box {other:?}"),
    }
}

fn instruction_name(opcode: u8) -> &'static str {
    crate::assembly::info(opcode).map_or("<invalid>", |info| info.mnemonic)
}
