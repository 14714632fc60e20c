use vesta_classfile::flags::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use vesta_classfile::{
    write_class, BootstrapMethod, BranchOp, ClassFile, Code, Const, ExceptionHandler, Field,
    FieldOp, HandleKind, Insn, InvokeKind, Label, MemberRef, Method, MethodHandleConst, Opcode,
    TypeOp, VarOp,
};

fn sample_class() -> ClassFile {
    let loop_code = Code {
        max_stack: 2,
        max_locals: 2,
        instructions: vec![
            Insn::Push(0),
            Insn::Var {
                op: VarOp::IStore,
                index: 1,
            },
            Insn::Label(Label(0)),
            Insn::Var {
                op: VarOp::ILoad,
                index: 1,
            },
            Insn::Push(10),
            Insn::Branch {
                op: BranchOp::IfICmpGe,
                target: Label(1),
            },
            Insn::Iinc { index: 1, delta: 1 },
            Insn::Branch {
                op: BranchOp::Goto,
                target: Label(0),
            },
            Insn::Label(Label(1)),
            Insn::Simple(Opcode::Return),
        ],
        handlers: Vec::new(),
    };

    let switch_code = Code {
        max_stack: 2,
        max_locals: 2,
        instructions: vec![
            Insn::Label(Label(0)),
            Insn::Var {
                op: VarOp::ILoad,
                index: 1,
            },
            Insn::TableSwitch {
                default: Label(2),
                low: 0,
                high: 1,
                targets: vec![Label(1), Label(2)],
            },
            Insn::Label(Label(1)),
            Insn::Ldc(Const::Long(1 << 40)),
            Insn::Simple(Opcode::LReturn),
            Insn::Label(Label(2)),
            Insn::Ldc(Const::Long(-1)),
            Insn::Simple(Opcode::LReturn),
            Insn::Label(Label(3)),
            Insn::Var {
                op: VarOp::AStore,
                index: 1,
            },
            Insn::Ldc(Const::Long(0)),
            Insn::Simple(Opcode::LReturn),
        ],
        handlers: vec![ExceptionHandler {
            start: Label(0),
            end: Label(3),
            handler: Label(3),
            catch_type: Some("java/lang/RuntimeException".to_string()),
        }],
    };

    let lambda_code = Code {
        max_stack: 1,
        max_locals: 1,
        instructions: vec![
            Insn::InvokeDynamic {
                name: "run".to_string(),
                descriptor: "()Ljava/lang/Runnable;".to_string(),
                bootstrap: BootstrapMethod {
                    handle: MethodHandleConst {
                        kind: HandleKind::InvokeStatic,
                        owner: "java/lang/invoke/LambdaMetafactory".to_string(),
                        name: "metafactory".to_string(),
                        descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".to_string(),
                        is_interface: false,
                    },
                    arguments: vec![
                        Const::MethodType("()V".to_string()),
                        Const::MethodHandle(MethodHandleConst {
                            kind: HandleKind::InvokeStatic,
                            owner: "com/example/Sample".to_string(),
                            name: "lambda$main$0".to_string(),
                            descriptor: "()V".to_string(),
                            is_interface: false,
                        }),
                        Const::MethodType("()V".to_string()),
                    ],
                },
            },
            Insn::Simple(Opcode::AReturn),
        ],
        handlers: Vec::new(),
    };

    ClassFile {
        minor_version: 0,
        major_version: 52,
        access_flags: ACC_PUBLIC | ACC_SUPER,
        this_class: "com/example/Sample".to_string(),
        super_class: Some("java/lang/Object".to_string()),
        interfaces: vec!["java/lang/Runnable".to_string()],
        fields: vec![Field {
            access_flags: ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            name: "GREETING".to_string(),
            descriptor: "Ljava/lang/String;".to_string(),
            constant_value: Some(Const::String("hello".to_string())),
            annotations: Vec::new(),
        }],
        methods: vec![
            Method {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name: "count".to_string(),
                descriptor: "()V".to_string(),
                exceptions: Vec::new(),
                code: Some(loop_code),
                annotations: Vec::new(),
            },
            Method {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name: "pick".to_string(),
                descriptor: "(I)J".to_string(),
                exceptions: vec!["java/lang/IllegalStateException".to_string()],
                code: Some(switch_code),
                annotations: Vec::new(),
            },
            Method {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name: "lambda".to_string(),
                descriptor: "()Ljava/lang/Runnable;".to_string(),
                exceptions: Vec::new(),
                code: Some(lambda_code),
                annotations: Vec::new(),
            },
        ],
        source_file: Some("Sample.java".to_string()),
        inner_classes: Vec::new(),
        annotations: Vec::new(),
    }
}

fn method<'a>(class: &'a ClassFile, name: &str) -> &'a Method {
    class
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method {name}"))
}

#[test]
fn write_then_parse_preserves_structure() {
    let class = sample_class();
    let bytes = write_class(&class).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();

    assert_eq!(parsed.this_class, "com/example/Sample");
    assert_eq!(parsed.super_class.as_deref(), Some("java/lang/Object"));
    assert_eq!(parsed.interfaces, vec!["java/lang/Runnable".to_string()]);
    assert_eq!(parsed.source_file.as_deref(), Some("Sample.java"));

    let field = &parsed.fields[0];
    assert_eq!(field.name, "GREETING");
    assert_eq!(
        field.constant_value,
        Some(Const::String("hello".to_string()))
    );

    let pick = method(&parsed, "pick");
    assert_eq!(pick.exceptions, vec!["java/lang/IllegalStateException".to_string()]);
    let code = pick.code.as_ref().unwrap();
    assert_eq!(code.handlers.len(), 1);
    assert_eq!(
        code.handlers[0].catch_type.as_deref(),
        Some("java/lang/RuntimeException")
    );
}

#[test]
fn reassembly_is_stable() {
    // Emitting the parsed model again yields identical bytes: pool indices
    // are assigned in first-use order on both sides.
    let bytes = write_class(&sample_class()).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    let bytes_again = write_class(&parsed).unwrap();
    assert_eq!(bytes, bytes_again);
}

#[test]
fn branches_survive_the_round_trip() {
    let bytes = write_class(&sample_class()).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    let code = method(&parsed, "count").code.as_ref().unwrap();

    let branches: Vec<&Insn> = code
        .instructions
        .iter()
        .filter(|i| matches!(i, Insn::Branch { .. }))
        .collect();
    assert_eq!(branches.len(), 2);
    let labels: Vec<Label> = code
        .instructions
        .iter()
        .filter_map(|i| match i {
            Insn::Label(label) => Some(*label),
            _ => None,
        })
        .collect();
    for branch in branches {
        let Insn::Branch { target, .. } = branch else {
            unreachable!()
        };
        assert!(labels.contains(target), "dangling branch target {target:?}");
    }
}

#[test]
fn switches_and_wide_constants_survive() {
    let bytes = write_class(&sample_class()).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    let code = method(&parsed, "pick").code.as_ref().unwrap();

    let switch = code
        .instructions
        .iter()
        .find(|i| matches!(i, Insn::TableSwitch { .. }))
        .expect("tableswitch survived");
    let Insn::TableSwitch { low, high, targets, .. } = switch else {
        unreachable!()
    };
    assert_eq!((*low, *high), (0, 1));
    assert_eq!(targets.len(), 2);

    assert!(code
        .instructions
        .iter()
        .any(|i| matches!(i, Insn::Ldc(Const::Long(v)) if *v == 1 << 40)));
}

#[test]
fn invokedynamic_bootstrap_survives() {
    let bytes = write_class(&sample_class()).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    let code = method(&parsed, "lambda").code.as_ref().unwrap();

    let indy = code
        .instructions
        .iter()
        .find_map(|i| match i {
            Insn::InvokeDynamic { name, bootstrap, .. } => Some((name, bootstrap)),
            _ => None,
        })
        .expect("invokedynamic survived");
    assert_eq!(indy.0, "run");
    assert_eq!(indy.1.handle.owner, "java/lang/invoke/LambdaMetafactory");
    assert_eq!(indy.1.arguments.len(), 3);
    assert!(matches!(
        &indy.1.arguments[1],
        Const::MethodHandle(handle) if handle.name == "lambda$main$0"
    ));
}

#[test]
fn rejects_truncated_input() {
    let bytes = write_class(&sample_class()).unwrap();
    assert!(ClassFile::parse(&bytes[..bytes.len() - 3]).is_err());
    assert!(ClassFile::parse(&[0xCA, 0xFE]).is_err());
}

#[test]
fn member_refs_round_trip_through_code() {
    let class = ClassFile {
        minor_version: 0,
        major_version: 52,
        access_flags: ACC_PUBLIC | ACC_SUPER,
        this_class: "com/example/Calls".to_string(),
        super_class: Some("java/lang/Object".to_string()),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods: vec![Method {
            access_flags: ACC_PUBLIC | ACC_STATIC,
            name: "call".to_string(),
            descriptor: "(Ljava/util/List;)I".to_string(),
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
                        kind: InvokeKind::Interface,
                        member: MemberRef::new("java/util/List", "size", "()I"),
                        is_interface: true,
                    },
                    Insn::Field {
                        op: FieldOp::GetStatic,
                        member: MemberRef::new("java/lang/System", "out", "Ljava/io/PrintStream;"),
                    },
                    Insn::Simple(Opcode::Pop),
                    Insn::Type {
                        op: TypeOp::CheckCast,
                        name: "[I".to_string(),
                    },
                    Insn::Simple(Opcode::IReturn),
                ],
                handlers: Vec::new(),
            }),
            annotations: Vec::new(),
        }],
        source_file: None,
        inner_classes: Vec::new(),
        annotations: Vec::new(),
    };

    let bytes = write_class(&class).unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    let code = method(&parsed, "call").code.as_ref().unwrap();

    assert!(code.instructions.iter().any(|i| matches!(
        i,
        Insn::Invoke { kind: InvokeKind::Interface, member, .. } if member.owner == "java/util/List"
    )));
    assert!(code.instructions.iter().any(|i| matches!(
        i,
        Insn::Field { member, .. } if member.name == "out"
    )));
    assert!(code
        .instructions
        .iter()
        .any(|i| matches!(i, Insn::Type { op: TypeOp::CheckCast, name } if name == "[I")));
}
