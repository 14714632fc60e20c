//! Definition providers: pure rewrites of class and member metadata.
//!
//! Providers run before the instruction emitters, in list order; each returns
//! either its input or a new record.

use vesta_classfile::flags::{ACC_NATIVE, ACC_STATIC, ACC_STRICT, ACC_SYNCHRONIZED};
use vesta_classfile::{
    Code, Const, Field, FieldOp, Insn, MemberRef, Method, Opcode, ReturnType,
};

use crate::analysis::ClassSummary;
use crate::policy::{DJVM, SANDBOX_OBJECT, SANDBOX_STRING_DESC};

pub trait DefinitionProvider: Send + Sync {
    fn rewrite_class(&self, class: &mut ClassDefinition) {
        let _ = class;
    }

    fn rewrite_field(&self, class: &ClassSummary, field: Field) -> Field {
        let _ = class;
        field
    }

    fn rewrite_method(&self, class: &ClassSummary, method: Method) -> Method {
        let _ = class;
        method
    }
}

/// The class-level slice of the model that class providers may rewrite.
pub struct ClassDefinition<'a> {
    pub access_flags: &'a mut u16,
    pub super_class: &'a mut Option<String>,
    pub fields: &'a mut Vec<Field>,
    pub methods: &'a mut Vec<Method>,
    pub this_class: &'a str,
}

/// The provider list every configuration starts from, in application order.
pub fn standard_providers() -> Vec<Box<dyn DefinitionProvider>> {
    vec![
        Box::new(AlwaysInheritFromSandboxedObject),
        Box::new(AlwaysUseNonSynchronizedMethods),
        Box::new(AlwaysUseStrictFloatingPointArithmetic),
        Box::new(ConstantFieldRemover),
        Box::new(StubOutFinalizerMethods),
        Box::new(StubOutNativeMethods),
        Box::new(StubOutIntrospectiveMethods),
    ]
}

/// Classes extending `java/lang/Object` extend the sandbox `Object` instead.
pub struct AlwaysInheritFromSandboxedObject;

impl DefinitionProvider for AlwaysInheritFromSandboxedObject {
    fn rewrite_class(&self, class: &mut ClassDefinition) {
        // The sandbox `Object` template itself keeps the host root as super.
        if class.this_class != SANDBOX_OBJECT
            && class.super_class.as_deref() == Some("java/lang/Object")
        {
            *class.super_class = Some(SANDBOX_OBJECT.to_string());
        }
    }
}

/// The sandbox has no monitors; the flag would only mislead readers.
pub struct AlwaysUseNonSynchronizedMethods;

impl DefinitionProvider for AlwaysUseNonSynchronizedMethods {
    fn rewrite_method(&self, _class: &ClassSummary, mut method: Method) -> Method {
        method.access_flags &= !ACC_SYNCHRONIZED;
        method
    }
}

pub struct AlwaysUseStrictFloatingPointArithmetic;

impl DefinitionProvider for AlwaysUseStrictFloatingPointArithmetic {
    fn rewrite_method(&self, _class: &ClassSummary, mut method: Method) -> Method {
        method.access_flags |= ACC_STRICT;
        method
    }
}

/// Strips `ConstantValue` from `String` fields and re-establishes static ones
/// through the deterministic intern helper in a synthetic initializer, so the
/// stored value is a sandbox string.
pub struct ConstantFieldRemover;

impl DefinitionProvider for ConstantFieldRemover {
    fn rewrite_class(&self, class: &mut ClassDefinition) {
        let mut interned: Vec<(String, String)> = Vec::new();
        for field in class.fields.iter_mut() {
            if field.descriptor != "Ljava/lang/String;" {
                continue;
            }
            let Some(Const::String(value)) = field.constant_value.take() else {
                continue;
            };
            if field.access_flags & ACC_STATIC != 0 {
                field.descriptor = SANDBOX_STRING_DESC.to_string();
                interned.push((field.name.clone(), value));
            }
        }
        if interned.is_empty() {
            return;
        }

        // The string-constant emitter routes each loaded constant through the
        // deterministic intern helper, so the prologue only loads and stores.
        let mut prologue = Vec::with_capacity(interned.len() * 2);
        for (name, value) in interned {
            prologue.push(Insn::Ldc(Const::String(value)));
            prologue.push(Insn::Field {
                op: FieldOp::PutStatic,
                member: MemberRef::new(class.this_class, name, SANDBOX_STRING_DESC),
            });
        }

        match class.methods.iter_mut().find(|m| m.name == "<clinit>") {
            Some(clinit) => {
                if let Some(code) = clinit.code.as_mut() {
                    prologue.extend(std::mem::take(&mut code.instructions));
                    code.instructions = prologue;
                    code.max_stack = code.max_stack.max(1);
                }
            }
            None => {
                prologue.push(Insn::Simple(Opcode::Return));
                class.methods.push(Method {
                    access_flags: ACC_STATIC,
                    name: "<clinit>".to_string(),
                    descriptor: "()V".to_string(),
                    exceptions: Vec::new(),
                    code: Some(Code {
                        max_stack: 1,
                        max_locals: 0,
                        instructions: prologue,
                        handlers: Vec::new(),
                    }),
                    annotations: Vec::new(),
                });
            }
        }
    }
}

pub struct StubOutFinalizerMethods;

impl DefinitionProvider for StubOutFinalizerMethods {
    fn rewrite_method(&self, _class: &ClassSummary, mut method: Method) -> Method {
        if method.name == "finalize" && method.descriptor == "()V" && method.code.is_some() {
            method.code = Some(inert_body(&method));
        }
        method
    }
}

/// Native methods cannot run deterministically; the replacement body throws.
pub struct StubOutNativeMethods;

impl DefinitionProvider for StubOutNativeMethods {
    fn rewrite_method(&self, _class: &ClassSummary, mut method: Method) -> Method {
        if method.access_flags & ACC_NATIVE == 0 {
            return method;
        }
        method.access_flags &= !ACC_NATIVE;
        // This body still runs through the emitter chain: the constant is
        // interned into a sandbox string and the throw is converted at the
        // `athrow` site, so the sandbox-typed `fail` overload is the right
        // target here.
        method.code = Some(Code {
            max_stack: 2,
            max_locals: local_slots(&method),
            instructions: vec![
                Insn::Ldc(Const::String("Native method has been deleted".to_string())),
                Insn::invoke_static(
                    DJVM,
                    "fail",
                    "(Lsandbox/java/lang/String;)Lsandbox/java/lang/Throwable;",
                ),
                Insn::Simple(Opcode::AThrow),
            ],
            handlers: Vec::new(),
        });
        method
    }
}

/// Platform introspection hooks become deterministic no-ops.
pub struct StubOutIntrospectiveMethods;

impl DefinitionProvider for StubOutIntrospectiveMethods {
    fn rewrite_method(&self, _class: &ClassSummary, mut method: Method) -> Method {
        const INTROSPECTIVE: &[&str] = &["registerNatives", "initIDs"];
        if INTROSPECTIVE.contains(&method.name.as_str()) && method.code.is_some() {
            method.code = Some(inert_body(&method));
        }
        method
    }
}

/// A body that immediately returns the default value of the return type.
fn inert_body(method: &Method) -> Code {
    let mut instructions = Vec::with_capacity(2);
    match vesta_classfile::parse_method_descriptor(&method.descriptor)
        .map(|d| d.return_type)
        .unwrap_or(ReturnType::Void)
    {
        ReturnType::Void => instructions.push(Insn::Simple(Opcode::Return)),
        ReturnType::Type(ty) => {
            use vesta_classfile::{BaseType, FieldType};
            match ty {
                FieldType::Base(BaseType::Long) => {
                    instructions.push(Insn::Simple(Opcode::LConst0));
                    instructions.push(Insn::Simple(Opcode::LReturn));
                }
                FieldType::Base(BaseType::Float) => {
                    instructions.push(Insn::Simple(Opcode::FConst0));
                    instructions.push(Insn::Simple(Opcode::FReturn));
                }
                FieldType::Base(BaseType::Double) => {
                    instructions.push(Insn::Simple(Opcode::DConst0));
                    instructions.push(Insn::Simple(Opcode::DReturn));
                }
                FieldType::Base(_) => {
                    instructions.push(Insn::Simple(Opcode::IConst0));
                    instructions.push(Insn::Simple(Opcode::IReturn));
                }
                FieldType::Object(_) | FieldType::Array(_) => {
                    instructions.push(Insn::Simple(Opcode::AConstNull));
                    instructions.push(Insn::Simple(Opcode::AReturn));
                }
            }
        }
    }
    Code {
        max_stack: 2,
        max_locals: local_slots(method),
        instructions,
        handlers: Vec::new(),
    }
}

fn local_slots(method: &Method) -> u16 {
    let args: u16 = vesta_classfile::parameter_slots(&method.descriptor)
        .map(|slots| slots.iter().map(|&s| u16::from(s)).sum())
        .unwrap_or(0);
    let receiver = u16::from(method.access_flags & ACC_STATIC == 0);
    args + receiver
}
