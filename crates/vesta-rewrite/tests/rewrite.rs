//! End-to-end rewrites over synthetic host classes: build a classfile, run
//! the driver, parse the result, and assert on the emitted bytecode.

use std::collections::BTreeSet;

use vesta_classfile::flags::{
    ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, ACC_STRICT, ACC_SUPER, ACC_SYNCHRONIZED,
};
use vesta_classfile::{
    write_class, ClassFile, Code, Const, ExceptionHandler, Field, Insn, InvokeKind, Label,
    MemberRef, Method, Opcode, TypeOp, VarOp,
};
use vesta_rewrite::{
    rewrite_class, AnalysisConfiguration, ClassResolver, ExecutionProfile, RewriteConfiguration,
    RewriteError, RewriteRules, RewrittenClass, Whitelist,
};

fn configuration() -> RewriteConfiguration {
    RewriteConfiguration::new(
        ClassResolver::new(Whitelist::minimal()),
        RewriteRules::standard(),
        AnalysisConfiguration::default(),
        None,
    )
}

fn class_with_methods(name: &str, methods: Vec<Method>) -> ClassFile {
    ClassFile {
        minor_version: 0,
        major_version: 52,
        access_flags: ACC_PUBLIC | ACC_SUPER,
        this_class: name.to_string(),
        super_class: Some("java/lang/Object".to_string()),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods,
        source_file: Some("Test.java".to_string()),
        inner_classes: Vec::new(),
        annotations: Vec::new(),
    }
}

fn void_method(name: &str, instructions: Vec<Insn>) -> Method {
    Method {
        access_flags: ACC_PUBLIC | ACC_STATIC,
        name: name.to_string(),
        descriptor: "()V".to_string(),
        exceptions: Vec::new(),
        code: Some(Code {
            max_stack: 4,
            max_locals: 4,
            instructions,
            handlers: Vec::new(),
        }),
        annotations: Vec::new(),
    }
}

fn rewrite(class: &ClassFile) -> RewrittenClass {
    rewrite_with(&configuration(), class).expect("rewrite succeeded")
}

fn rewrite_with(
    config: &RewriteConfiguration,
    class: &ClassFile,
) -> Result<RewrittenClass, RewriteError> {
    let bytes = write_class(class).unwrap();
    rewrite_class(config, &bytes)
}

fn parse(rewritten: &RewrittenClass) -> ClassFile {
    ClassFile::parse(&rewritten.bytes).expect("rewritten bytes parse")
}

fn method<'a>(class: &'a ClassFile, name: &str) -> &'a Method {
    class
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method {name}"))
}

fn instructions<'a>(class: &'a ClassFile, name: &str) -> &'a [Insn] {
    &method(class, name).code.as_ref().unwrap().instructions
}

fn invoke_of<'a>(insns: &'a [Insn], owner: &str, name: &str) -> Option<&'a MemberRef> {
    insns.iter().find_map(|insn| match insn {
        Insn::Invoke { member, .. } if member.owner == owner && member.name == name => {
            Some(member)
        }
        _ => None,
    })
}

#[test]
fn relocates_class_and_super_into_sandbox_namespace() {
    let class = class_with_methods("com/example/Simple", vec![void_method("noop", vec![
        Insn::Simple(Opcode::Return),
    ])]);
    let rewritten = rewrite(&class);
    assert_eq!(rewritten.sandbox_name, "sandbox/com/example/Simple");

    let parsed = parse(&rewritten);
    assert_eq!(parsed.this_class, "sandbox/com/example/Simple");
    assert_eq!(parsed.super_class.as_deref(), Some("sandbox/java/lang/Object"));
    assert!(rewritten.references.contains("sandbox/java/lang/Object"));
    // Stack traces stay attributable.
    assert_eq!(parsed.source_file.as_deref(), Some("Test.java"));
}

#[test]
fn every_symbolic_reference_stays_inside_the_namespace_closure() {
    let resolver = ClassResolver::new(Whitelist::minimal());
    let class = class_with_methods(
        "com/example/Busy",
        vec![void_method(
            "busy",
            vec![
                Insn::Type {
                    op: TypeOp::New,
                    name: "java/util/ArrayList".to_string(),
                },
                Insn::Simple(Opcode::Dup),
                Insn::Invoke {
                    kind: InvokeKind::Special,
                    member: MemberRef::new("java/util/ArrayList", "<init>", "()V"),
                    is_interface: false,
                },
                Insn::Ldc(Const::String("x".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/util/ArrayList",
                        "add",
                        "(Ljava/lang/Object;)Z",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));

    let ok = |name: &str| {
        let mut name = name;
        while let Some(rest) = name.strip_prefix('[') {
            name = rest;
        }
        let name = name
            .strip_prefix('L')
            .and_then(|n| n.strip_suffix(';'))
            .unwrap_or(name);
        name.len() == 1
            || name.starts_with("sandbox/")
            || resolver.is_pinned(name)
            || resolver.is_whitelisted(name)
    };
    for insn in instructions(&parsed, "busy") {
        match insn {
            Insn::Invoke { member, .. } | Insn::Field { member, .. } => {
                assert!(ok(&member.owner), "escaped owner: {}", member.owner);
            }
            Insn::Type { name, .. } => assert!(ok(name), "escaped type: {name}"),
            _ => {}
        }
    }
}

#[test]
fn synchronized_is_cleared_and_strictfp_is_set() {
    let mut method = void_method("locked", vec![Insn::Simple(Opcode::Return)]);
    method.access_flags |= ACC_SYNCHRONIZED;
    let parsed = parse(&rewrite(&class_with_methods("com/example/Sync", vec![method])));

    let rewritten = parsed.methods.iter().find(|m| m.name == "locked").unwrap();
    assert_eq!(rewritten.access_flags & ACC_SYNCHRONIZED, 0);
    assert_ne!(rewritten.access_flags & ACC_STRICT, 0);
}

#[test]
fn monitor_instructions_are_elided() {
    let class = class_with_methods(
        "com/example/Mon",
        vec![void_method(
            "guarded",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Simple(Opcode::MonitorEnter),
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Simple(Opcode::MonitorExit),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let insns = parse(&rewrite(&class));
    let insns = instructions(&insns, "guarded");

    assert!(!insns.iter().any(|i| matches!(
        i,
        Insn::Simple(Opcode::MonitorEnter) | Insn::Simple(Opcode::MonitorExit)
    )));
    // Each elided monitor instruction pops the objectref it would have used.
    assert_eq!(
        insns
            .iter()
            .filter(|i| matches!(i, Insn::Simple(Opcode::Pop)))
            .count(),
        2
    );
}

#[test]
fn string_constants_are_interned_where_they_are_pushed() {
    let class = class_with_methods(
        "com/example/Str",
        vec![void_method(
            "greet",
            vec![
                Insn::Ldc(Const::String("hello".to_string())),
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "greet");

    let ldc_at = insns
        .iter()
        .position(|i| matches!(i, Insn::Ldc(Const::String(s)) if s == "hello"))
        .expect("constant still pushed");
    match &insns[ldc_at + 1] {
        Insn::Invoke { member, .. } => {
            assert_eq!(member.owner, "sandbox/java/lang/DJVM");
            assert_eq!(member.name, "intern");
        }
        other => panic!("expected intern call after ldc, found {other:?}"),
    }
}

#[test]
fn integer_arithmetic_becomes_exact() {
    let class = class_with_methods(
        "com/example/Math",
        vec![void_method(
            "sum",
            vec![
                Insn::Push(1),
                Insn::Push(2),
                Insn::Simple(Opcode::IAdd),
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "sum");

    assert!(!insns.iter().any(|i| matches!(i, Insn::Simple(Opcode::IAdd))));
    let add = invoke_of(insns, "java/lang/Math", "addExact").expect("exact add");
    assert_eq!(add.descriptor, "(II)I");
}

#[test]
fn forbidden_constructor_reflection_injects_a_throw() {
    let class = class_with_methods(
        "com/example/Refl",
        vec![void_method(
            "apply",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 1,
                },
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/reflect/Constructor",
                        "newInstance",
                        "([Ljava/lang/Object;)Ljava/lang/Object;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "apply");

    assert!(invoke_of(insns, "java/lang/reflect/Constructor", "newInstance").is_none());
    let message_at = insns
        .iter()
        .position(|i| matches!(
            i,
            Insn::Ldc(Const::String(s))
                if s == "Disallowed reference to API; java.lang.reflect.Constructor.newInstance(Object[])"
        ))
        .expect("violation message constant");
    let fail = invoke_of(&insns[message_at..], "sandbox/java/lang/DJVM", "fail")
        .expect("fail call");
    assert_eq!(fail.descriptor, "(Ljava/lang/String;)Ljava/lang/Error;");
    assert!(insns[message_at..]
        .iter()
        .any(|i| matches!(i, Insn::Simple(Opcode::AThrow))));
}

#[test]
fn parentless_classloader_constructor_is_thunked() {
    let mut class = class_with_methods(
        "com/example/Loader",
        vec![Method {
            access_flags: ACC_PUBLIC,
            name: "<init>".to_string(),
            descriptor: "()V".to_string(),
            exceptions: Vec::new(),
            code: Some(Code {
                max_stack: 2,
                max_locals: 1,
                instructions: vec![
                    Insn::Var {
                        op: VarOp::ALoad,
                        index: 0,
                    },
                    Insn::Invoke {
                        kind: InvokeKind::Special,
                        member: MemberRef::new("java/lang/ClassLoader", "<init>", "()V"),
                        is_interface: false,
                    },
                    Insn::Simple(Opcode::Return),
                ],
                handlers: Vec::new(),
            }),
            annotations: Vec::new(),
        }],
    );
    class.super_class = Some("java/lang/ClassLoader".to_string());

    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "<init>");

    let helper = invoke_of(insns, "sandbox/java/lang/DJVM", "getSystemClassLoader")
        .expect("system classloader helper");
    assert_eq!(helper.descriptor, "()Ljava/lang/ClassLoader;");
    let init = invoke_of(insns, "java/lang/ClassLoader", "<init>").expect("two-arg super call");
    assert_eq!(init.descriptor, "(Ljava/lang/ClassLoader;)V");
}

#[test]
fn user_spelled_classloader_parent_constructor_is_forbidden() {
    let class = class_with_methods(
        "com/example/NullParent",
        vec![void_method(
            "make",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Simple(Opcode::AConstNull),
                Insn::Invoke {
                    kind: InvokeKind::Special,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "<init>",
                        "(Ljava/lang/ClassLoader;)V",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "make");

    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Ldc(Const::String(s))
            if s == "Disallowed reference to API; java.lang.ClassLoader(ClassLoader)"
    )));
}

#[test]
fn classloader_accessors_are_stubbed() {
    let class = class_with_methods(
        "com/example/Walk",
        vec![void_method(
            "walk",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "getParent",
                        "()Ljava/lang/ClassLoader;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Ldc(Const::String("res".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "getResources",
                        "(Ljava/lang/String;)Ljava/util/Enumeration;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "walk");

    assert!(invoke_of(insns, "java/lang/ClassLoader", "getParent").is_none());
    assert!(insns
        .iter()
        .any(|i| matches!(i, Insn::Simple(Opcode::AConstNull))));
    let empty = invoke_of(insns, "sandbox/java/lang/DJVM", "emptyEnumeration")
        .expect("empty enumeration stub");
    assert_eq!(empty.descriptor, "()Lsandbox/java/util/Enumeration;");
}

#[test]
fn loadclass_and_system_classloader_are_retargeted() {
    let class = class_with_methods(
        "com/example/Load",
        vec![void_method(
            "load",
            vec![
                Insn::Invoke {
                    kind: InvokeKind::Static,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "getSystemClassLoader",
                        "()Ljava/lang/ClassLoader;",
                    ),
                    is_interface: false,
                },
                Insn::Ldc(Const::String("com.example.Foo".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "loadClass",
                        "(Ljava/lang/String;)Ljava/lang/Class;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "load");

    assert!(invoke_of(insns, "java/lang/ClassLoader", "loadClass").is_none());
    assert!(invoke_of(insns, "java/lang/ClassLoader", "getSystemClassLoader").is_none());
    let system = invoke_of(insns, "sandbox/java/lang/DJVM", "getSystemClassLoader")
        .expect("helper for the static accessor");
    assert_eq!(system.descriptor, "()Ljava/lang/ClassLoader;");
    let load = invoke_of(insns, "sandbox/java/lang/DJVM", "loadClass").expect("loadClass thunk");
    assert_eq!(
        load.descriptor,
        "(Ljava/lang/ClassLoader;Lsandbox/java/lang/String;)Ljava/lang/Class;"
    );
}

#[test]
fn object_monitor_methods_are_forbidden() {
    let class = class_with_methods(
        "com/example/Waiter",
        vec![void_method(
            "idle",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new("java/lang/Object", "wait", "()V"),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "idle");

    assert!(invoke_of(insns, "java/lang/Object", "wait").is_none());
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Ldc(Const::String(s)) if s == "Disallowed reference to API; java.lang.Object.wait()"
    )));
}

#[test]
fn object_tostring_goes_through_todjvmstring() {
    let class = class_with_methods(
        "com/example/Show",
        vec![void_method(
            "show",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/Object",
                        "toString",
                        "()Ljava/lang/String;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "show");

    let thunked = invoke_of(insns, "java/lang/Object", "toDJVMString")
        .expect("toString becomes toDJVMString");
    assert_eq!(thunked.descriptor, "()Lsandbox/java/lang/String;");
    assert!(invoke_of(insns, "java/lang/Object", "toString").is_none());
}

#[test]
fn enclosing_constructor_reflection_survives() {
    let class = class_with_methods(
        "com/example/Encl",
        vec![void_method(
            "inspect",
            vec![
                Insn::Ldc(Const::Class("com/example/Encl".to_string())),
                Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/Class",
                        "getEnclosingConstructor",
                        "()Ljava/lang/reflect/Constructor;",
                    ),
                    is_interface: false,
                },
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "inspect");

    let kept = invoke_of(insns, "java/lang/Class", "getEnclosingConstructor")
        .expect("whitelisted accessor survives");
    assert_eq!(kept.descriptor, "()Lsandbox/java/lang/reflect/Constructor;");
}

#[test]
fn handlers_convert_and_guard_caught_throwables() {
    let class = class_with_methods(
        "com/example/Catcher",
        vec![Method {
            access_flags: ACC_PUBLIC | ACC_STATIC,
            name: "run".to_string(),
            descriptor: "()V".to_string(),
            exceptions: Vec::new(),
            code: Some(Code {
                max_stack: 2,
                max_locals: 2,
                instructions: vec![
                    Insn::Label(Label(0)),
                    Insn::Simple(Opcode::Nop),
                    Insn::Label(Label(1)),
                    Insn::Simple(Opcode::Return),
                    Insn::Label(Label(2)),
                    Insn::Var {
                        op: VarOp::AStore,
                        index: 1,
                    },
                    Insn::Simple(Opcode::Return),
                ],
                handlers: vec![ExceptionHandler {
                    start: Label(0),
                    end: Label(1),
                    handler: Label(2),
                    catch_type: None,
                }],
            }),
            annotations: Vec::new(),
        }],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "run");

    let handler_label = {
        let code = method(&parsed, "run").code.as_ref().unwrap();
        code.handlers[0].handler
    };
    let at = insns
        .iter()
        .position(|i| matches!(i, Insn::Label(l) if *l == handler_label))
        .unwrap();
    match (&insns[at + 1], &insns[at + 2]) {
        (Insn::Invoke { member: guard, .. }, Insn::Invoke { member: convert, .. }) => {
            assert_eq!(guard.name, "checkCatch");
            assert_eq!(convert.name, "doCatch");
            assert_eq!(convert.owner, "sandbox/java/lang/DJVM");
        }
        other => panic!("expected guard and conversion at handler entry, found {other:?}"),
    }
}

#[test]
fn athrow_sites_convert_back_to_host_throwables() {
    let class = class_with_methods(
        "com/example/Thrower",
        vec![void_method(
            "boom",
            vec![
                Insn::Var {
                    op: VarOp::ALoad,
                    index: 0,
                },
                Insn::Simple(Opcode::AThrow),
            ],
        )],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "boom");

    let convert = invoke_of(insns, "sandbox/java/lang/DJVM", "fromDJVM")
        .expect("throw conversion");
    assert_eq!(
        convert.descriptor,
        "(Lsandbox/java/lang/Throwable;)Ljava/lang/Throwable;"
    );
}

#[test]
fn native_methods_become_throwing_stubs() {
    let class = class_with_methods(
        "com/example/Nat",
        vec![Method {
            access_flags: ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
            name: "now".to_string(),
            descriptor: "()J".to_string(),
            exceptions: Vec::new(),
            code: None,
            annotations: Vec::new(),
        }],
    );
    let parsed = parse(&rewrite(&class));

    let now = method(&parsed, "now");
    assert_eq!(now.access_flags & ACC_NATIVE, 0);
    let insns = &now.code.as_ref().unwrap().instructions;
    assert!(invoke_of(insns, "sandbox/java/lang/DJVM", "fail").is_some());
    assert!(insns.iter().any(|i| matches!(i, Insn::Simple(Opcode::AThrow))));
}

#[test]
fn finalizers_become_inert() {
    let class = class_with_methods(
        "com/example/Fin",
        vec![Method {
            access_flags: ACC_PUBLIC,
            name: "finalize".to_string(),
            descriptor: "()V".to_string(),
            exceptions: Vec::new(),
            code: Some(Code {
                max_stack: 2,
                max_locals: 1,
                instructions: vec![
                    Insn::Var {
                        op: VarOp::ALoad,
                        index: 0,
                    },
                    Insn::Simple(Opcode::MonitorEnter),
                    Insn::Simple(Opcode::Return),
                ],
                handlers: Vec::new(),
            }),
            annotations: Vec::new(),
        }],
    );
    let parsed = parse(&rewrite(&class));
    let insns = instructions(&parsed, "finalize");
    assert_eq!(insns, &[Insn::Simple(Opcode::Return)]);
}

#[test]
fn constant_string_fields_are_established_through_intern() {
    let mut class = class_with_methods("com/example/Const", Vec::new());
    class.fields.push(Field {
        access_flags: ACC_PUBLIC | ACC_STATIC | vesta_classfile::flags::ACC_FINAL,
        name: "GREETING".to_string(),
        descriptor: "Ljava/lang/String;".to_string(),
        constant_value: Some(Const::String("hello".to_string())),
        annotations: Vec::new(),
    });
    let parsed = parse(&rewrite(&class));

    let field = &parsed.fields[0];
    assert_eq!(field.descriptor, "Lsandbox/java/lang/String;");
    assert!(field.constant_value.is_none());

    let clinit = instructions(&parsed, "<clinit>");
    assert!(clinit
        .iter()
        .any(|i| matches!(i, Insn::Ldc(Const::String(s)) if s == "hello")));
    assert!(invoke_of(clinit, "sandbox/java/lang/DJVM", "intern").is_some());
    assert!(clinit.iter().any(|i| matches!(
        i,
        Insn::Field { member, .. }
            if member.owner == "sandbox/com/example/Const"
                && member.descriptor == "Lsandbox/java/lang/String;"
    )));
}

#[test]
fn reserved_member_names_are_rejected() {
    let class = class_with_methods(
        "com/example/Reserved",
        vec![void_method("toDJVMString", vec![Insn::Simple(Opcode::Return)])],
    );
    let err = rewrite_with(&configuration(), &class).unwrap_err();
    assert!(err
        .to_string()
        .contains("Class is not allowed to implement toDJVMString()"));
}

#[test]
fn class_version_ceiling_is_enforced() {
    let mut class = class_with_methods("com/example/New", Vec::new());
    class.major_version = 99;
    let err = rewrite_with(&configuration(), &class).unwrap_err();
    assert!(err.to_string().contains("major version 99"));
}

#[test]
fn tracers_are_present_exactly_when_a_profile_is_configured() {
    let looping = |name: &str| {
        class_with_methods(
            name,
            vec![void_method(
                "spin",
                vec![
                    Insn::Label(Label(0)),
                    Insn::Branch {
                        op: vesta_classfile::BranchOp::Goto,
                        target: Label(0),
                    },
                ],
            )],
        )
    };

    let plain = parse(&rewrite(&looping("com/example/Plain")));
    assert!(invoke_of(
        instructions(&plain, "spin"),
        "sandbox/RuntimeCostAccounter",
        "recordJump"
    )
    .is_none());

    let profiled_config = RewriteConfiguration::new(
        ClassResolver::new(Whitelist::minimal()),
        RewriteRules::standard(),
        AnalysisConfiguration::default(),
        Some(ExecutionProfile::DEFAULT),
    );
    let profiled = rewrite_with(&profiled_config, &looping("com/example/Traced")).unwrap();
    let profiled = ClassFile::parse(&profiled.bytes).unwrap();
    assert!(invoke_of(
        instructions(&profiled, "spin"),
        "sandbox/RuntimeCostAccounter",
        "recordJump"
    )
    .is_some());
}

#[test]
fn only_configured_annotations_pass_through() {
    let keep = vesta_classfile::Annotation {
        type_descriptor: "Lcom/example/Keep;".to_string(),
        type_internal_name: Some("com/example/Keep".to_string()),
        elements: Vec::new(),
    };
    let drop = vesta_classfile::Annotation {
        type_descriptor: "Lcom/example/Drop;".to_string(),
        type_internal_name: Some("com/example/Drop".to_string()),
        elements: Vec::new(),
    };
    let mut class = class_with_methods("com/example/Ann", Vec::new());
    class.annotations = vec![keep.clone(), drop];

    let config = RewriteConfiguration::new(
        ClassResolver::new(Whitelist::minimal()),
        RewriteRules::standard(),
        AnalysisConfiguration {
            visible_annotations: BTreeSet::from(["com/example/Keep".to_string()]),
            ..AnalysisConfiguration::default()
        },
        None,
    );
    let parsed = ClassFile::parse(&rewrite_with(&config, &class).unwrap().bytes).unwrap();
    assert_eq!(parsed.annotations.len(), 1);
    // Passed through unchanged, not remapped.
    assert_eq!(parsed.annotations[0].type_descriptor, "Lcom/example/Keep;");
}

#[test]
fn rewriting_a_rewritten_name_is_stable() {
    let class = class_with_methods("com/example/Twice", vec![void_method("noop", vec![
        Insn::Simple(Opcode::Return),
    ])]);
    let first = rewrite(&class);
    let config = configuration();
    let second = rewrite_class(&config, &first.bytes).unwrap();
    // The sandbox name does not gain another prefix.
    assert_eq!(second.sandbox_name, first.sandbox_name);
}
