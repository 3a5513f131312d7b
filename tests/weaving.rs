//! Integration tests for weaving complete class files through the public API.
//!
//! The classes are assembled with the crate's own class file model, woven, then parsed back
//! and inspected instruction by instruction.

use classweave::{
    assembly::{decode_stream, opcodes, CodeEncoder, Operand},
    classfile::{
        attribute::CODE, Attribute, ClassAccessFlags, CodeAttribute, ConstantPool, MemberInfo,
        MethodAccessFlags,
    },
    prelude::*,
    weaver::DEFAULT_CONTEXT_CLASS,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn method(
    pool: &mut ConstantPool,
    flags: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    max_stack: u16,
    max_locals: u16,
    body: &[u8],
) -> Result<MemberInfo> {
    let mut code = CodeEncoder::new();
    code.emit_raw(body);
    let code = CodeAttribute {
        max_stack,
        max_locals,
        code: code.finish()?,
        exception_table: Vec::new(),
        attributes: Vec::new(),
    };
    Ok(MemberInfo {
        access_flags: flags.bits(),
        name_index: pool.add_utf8(name)?,
        descriptor_index: pool.add_utf8(descriptor)?,
        attributes: vec![Attribute {
            name_index: pool.add_utf8(CODE)?,
            info: code.to_bytes()?,
        }],
    })
}

/// ```text
/// public class com.acme.Service {
///     public Service() { super(); }
///     public int sum(int a, int b) { return a + b; }
///     public static String greet(String name) { return name; }
///     public static native void ping();
/// }
/// ```
fn service_class() -> Result<Vec<u8>> {
    let mut pool = ConstantPool::new();
    let this_class = pool.add_class("com/acme/Service")?;
    let super_class = pool.add_class("java/lang/Object")?;
    let object_init = pool.add_method_ref("java/lang/Object", "<init>", "()V")?;
    let [init_high, init_low] = object_init.to_be_bytes();

    let mut methods = vec![method(
        &mut pool,
        MethodAccessFlags::PUBLIC,
        "<init>",
        "()V",
        1,
        1,
        &[
            opcodes::ALOAD_0,
            opcodes::INVOKESPECIAL,
            init_high,
            init_low,
            opcodes::RETURN,
        ],
    )?];
    methods.push(method(
        &mut pool,
        MethodAccessFlags::PUBLIC,
        "sum",
        "(II)I",
        2,
        3,
        &[
            opcodes::ILOAD_1,
            opcodes::ILOAD_2,
            opcodes::IADD,
            opcodes::IRETURN,
        ],
    )?);
    methods.push(method(
        &mut pool,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "greet",
        "(Ljava/lang/String;)Ljava/lang/String;",
        1,
        1,
        &[opcodes::ALOAD_0, opcodes::ARETURN],
    )?);
    methods.push(MemberInfo {
        access_flags: (MethodAccessFlags::PUBLIC
            | MethodAccessFlags::STATIC
            | MethodAccessFlags::NATIVE)
            .bits(),
        name_index: pool.add_utf8("ping")?,
        descriptor_index: pool.add_utf8("()V")?,
        attributes: Vec::new(),
    });

    ClassFile {
        minor_version: 0,
        major_version: 52,
        constant_pool: pool,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class,
        super_class,
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods,
        attributes: Vec::new(),
    }
    .to_bytes()
}

fn method_code(class: &ClassFile, name: &str) -> Result<CodeAttribute> {
    let pool = &class.constant_pool;
    for method in &class.methods {
        if pool.utf8(method.name_index)? == name {
            let position = method
                .find_attribute(pool, CODE)?
                .expect("method has a body");
            return CodeAttribute::parse(&method.attributes[position].info);
        }
    }
    panic!("no method {name}");
}

/// `(owner, name)` of every invocation in `code`, in order.
fn invocations(class: &ClassFile, code: &CodeAttribute) -> Result<Vec<(String, String)>> {
    let mut calls = Vec::new();
    for instruction in decode_stream(&code.code)? {
        if matches!(
            instruction.opcode,
            opcodes::INVOKESTATIC | opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL
        ) {
            let Operand::Constant(index) = instruction.operand else {
                panic!("invocation without constant operand");
            };
            let (owner, name, _) = class.constant_pool.member_ref(index)?;
            calls.push((owner, name));
        }
    }
    Ok(calls)
}

#[test]
fn test_weave_selected_methods() -> Result<()> {
    init_logging();
    let original = service_class()?;
    let resolver =
        |label: &str, _original: &[u8]| (label == "com.acme.Service.sum(int,int)").then_some(());
    let config = WeaveConfig::default();
    let mut weaver = ClassWeaver::new(&resolver, &config);

    let woven = weaver.weave(&original)?;
    assert!(weaver.was_instrumented());
    assert_ne!(woven, original);

    let before = ClassFile::parse(&original)?;
    let after = ClassFile::parse(&woven)?;
    assert_eq!(after.methods.len(), before.methods.len());

    // Only the body of `sum` changes
    for name in ["<init>", "greet"] {
        assert_eq!(method_code(&after, name)?, method_code(&before, name)?);
    }

    let sum = method_code(&after, "sum")?;
    assert_eq!(sum.max_locals, 5);
    let calls = invocations(&after, &sum)?;
    let hooks: Vec<&str> = calls
        .iter()
        .filter(|(owner, _)| owner == DEFAULT_CONTEXT_CLASS)
        .map(|(_, name)| name.as_str())
        .collect();
    assert_eq!(hooks, ["start", "stop", "stopWithException"]);

    let region = sum.exception_table.last().expect("protected region");
    assert_eq!(
        after.constant_pool.class_name(region.catch_type)?,
        "java/lang/Throwable"
    );
    Ok(())
}

#[test]
fn test_decisions_are_reported() -> Result<()> {
    let original = service_class()?;
    let registry = ListenerRegistry::new();
    registry.register_method(
        "com.acme.Service.greet(java.lang.String)",
        ListenerSet::new(["audit"]),
    );
    let config = WeaveConfig::default();
    let mut weaver = ClassWeaver::new(&registry, &config);

    weaver.weave(&original)?;

    let reports: Vec<(&str, WeaveDecision)> = weaver
        .reports()
        .iter()
        .map(|report| (report.name.as_str(), report.decision))
        .collect();
    assert_eq!(
        reports,
        [
            ("<init>", WeaveDecision::Ineligible),
            ("sum", WeaveDecision::Declined),
            ("greet", WeaveDecision::Woven),
            ("ping", WeaveDecision::Ineligible),
        ]
    );
    Ok(())
}

#[test]
fn test_declined_class_is_byte_identical() -> Result<()> {
    let original = service_class()?;
    let resolver = |_label: &str, _original: &[u8]| None::<()>;
    let config = WeaveConfig::default();
    let mut weaver = ClassWeaver::new(&resolver, &config);

    assert_eq!(weaver.weave(&original)?, original);
    assert!(!weaver.was_instrumented());
    Ok(())
}

#[test]
fn test_stripped_config_keeps_class_structure() -> Result<()> {
    let original = service_class()?;
    let resolver = |_label: &str, _original: &[u8]| Some(());
    let config = WeaveConfig::stripped();
    let mut weaver = ClassWeaver::new(&resolver, &config);

    let woven = ClassFile::parse(&weaver.weave(&original)?)?;

    assert_eq!(woven.major_version, 52);
    assert_eq!(woven.this_class_name()?, "com/acme/Service");
    assert_eq!(woven.methods.len(), 4);
    Ok(())
}

#[test]
fn test_invalid_input() {
    let resolver = |_label: &str, _original: &[u8]| Some(());
    let config = WeaveConfig::default();
    let mut weaver = ClassWeaver::new(&resolver, &config);

    assert!(matches!(weaver.weave(&[]), Err(Error::Empty)));
    assert!(matches!(
        weaver.weave(b"not a class file"),
        Err(Error::NotSupported)
    ));
    assert!(!weaver.was_instrumented());
}

#[test]
fn test_class_files_on_disk() -> Result<()> {
    let directory = std::env::temp_dir().join(format!("classweave-{}", std::process::id()));
    std::fs::create_dir_all(&directory)?;
    let path = directory.join("Service.class");
    std::fs::write(&path, service_class()?)?;

    let class = ClassFile::from_path(&path)?;
    assert_eq!(class.this_class_name()?, "com/acme/Service");

    std::fs::remove_dir_all(&directory)?;
    assert!(matches!(
        ClassFile::from_path(&path),
        Err(Error::FileError(_))
    ));
    Ok(())
}

#[test]
fn test_weave_all_in_parallel() -> Result<()> {
    init_logging();
    let classes: Vec<Vec<u8>> = (0..32).map(|_| service_class()).collect::<Result<_>>()?;
    let registry = ListenerRegistry::new();
    registry.register_class("com.acme.Service", ListenerSet::new(["timing"]));
    let stats = WeaveStats::new();

    let results = weave_all(&classes, &registry, &WeaveConfig::default(), Some(&stats));

    let first = results[0].as_ref().expect("woven");
    for result in &results {
        let woven = result.as_ref().expect("woven");
        assert!(woven.instrumented);
        assert_eq!(woven.bytes, first.bytes);
    }
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.classes, 32);
    assert_eq!(snapshot.classes_woven, 32);
    assert_eq!(snapshot.methods_woven, 64);
    assert_eq!(snapshot.methods_ineligible, 64);
    Ok(())
}
