//! The policy enforcer: one decision per member reference.

use vesta_classfile::{parameter_slots, Insn, InvokeKind, MemberRef, Opcode};
use vesta_core::Severity;

use super::{Emitter, EmitterContext};
use crate::policy::{Decision, DJVM, SANDBOX_ENUMERATION_DESC};

pub struct DisallowNonDeterministicMethods;

impl Emitter for DisallowNonDeterministicMethods {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { kind, member, .. } = insn else {
            return;
        };
        let decision = {
            let current_class = ctx.class_host_name().to_string();
            ctx.rules.decide(*kind, member, &current_class)
        };
        match decision {
            Decision::Allow => {}
            Decision::Forbid { message } => {
                ctx.report(Severity::Warning, message.clone());
                emit_rule_violation(ctx, &message);
                ctx.prevent_default();
            }
            Decision::StubNull => {
                discard_call(ctx, *kind, member);
                ctx.emit(Insn::Simple(Opcode::AConstNull));
                ctx.prevent_default();
            }
            Decision::StubEmptyEnumeration => {
                discard_call(ctx, *kind, member);
                ctx.emit(Insn::invoke_static(
                    DJVM,
                    "emptyEnumeration",
                    &format!("(){SANDBOX_ENUMERATION_DESC}"),
                ));
                ctx.prevent_default();
            }
            Decision::ThunkClassLoaderInit => {
                // The parentless constructor gets the deterministic system
                // classloader as its parent instead.
                ctx.emit(Insn::invoke_static(
                    DJVM,
                    "getSystemClassLoader",
                    "()Ljava/lang/ClassLoader;",
                ));
                ctx.emit(Insn::Invoke {
                    kind: InvokeKind::Special,
                    member: MemberRef::new(
                        "java/lang/ClassLoader",
                        "<init>",
                        "(Ljava/lang/ClassLoader;)V",
                    ),
                    is_interface: false,
                });
                ctx.grow_stack(1);
                ctx.prevent_default();
            }
        }
    }
}

/// Inject `throw DJVM.fail(message)`. The operands already pushed for the
/// consumed call are abandoned; `athrow` discards the frame anyway.
pub(super) fn emit_rule_violation(ctx: &mut EmitterContext<'_, '_>, message: &str) {
    ctx.emit(Insn::Ldc(vesta_classfile::Const::String(message.to_string())));
    ctx.emit(Insn::invoke_static(
        DJVM,
        "fail",
        "(Ljava/lang/String;)Ljava/lang/Error;",
    ));
    ctx.emit(Insn::Simple(Opcode::AThrow));
    ctx.grow_stack(1);
}

/// Pop the arguments (and receiver, for instance calls) of a consumed call.
fn discard_call(ctx: &mut EmitterContext<'_, '_>, kind: InvokeKind, member: &MemberRef) {
    let slots = parameter_slots(&member.descriptor).unwrap_or_default();
    for &width in slots.iter().rev() {
        ctx.emit(Insn::Simple(if width == 2 {
            Opcode::Pop2
        } else {
            Opcode::Pop
        }));
    }
    if kind.has_receiver() {
        ctx.emit(Insn::Simple(Opcode::Pop));
    }
}
