//! String wrapping at the boundary to whitelisted host APIs.
//!
//! Whitelisted methods keep their host signatures, so sandbox strings are
//! unwrapped on the way in and host strings are interned on the way out.

use vesta_classfile::{return_descriptor, Insn, MemberRef};

use super::{Emitter, EmitterContext};
use crate::policy::{DJVM, SANDBOX_STRING_DESC};

const STRING_DESC: &str = "Ljava/lang/String;";

fn is_whitelisted_host_call(ctx: &EmitterContext<'_, '_>, member: &MemberRef) -> bool {
    ctx.resolver.is_whitelisted(&member.owner)
}

fn last_parameter_is_string(descriptor: &str) -> bool {
    descriptor
        .split_once(')')
        .map(|(params, _)| params.ends_with(STRING_DESC))
        .unwrap_or(false)
}

fn returns_string(descriptor: &str) -> bool {
    return_descriptor(descriptor) == STRING_DESC
}

fn emit_unwrap(ctx: &mut EmitterContext<'_, '_>) {
    ctx.emit(Insn::invoke_static(
        DJVM,
        "fromDJVM",
        &format!("({SANDBOX_STRING_DESC}){STRING_DESC}"),
    ));
}

fn emit_intern(ctx: &mut EmitterContext<'_, '_>) {
    ctx.emit(Insn::invoke_static(
        DJVM,
        "intern",
        &format!("({STRING_DESC}){SANDBOX_STRING_DESC}"),
    ));
}

/// Unwraps a trailing sandbox-string argument before the host call (and, when
/// the same call also returns a string, interns the result).
pub struct ArgumentUnwrapper;

impl Emitter for ArgumentUnwrapper {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { member, .. } = insn else {
            return;
        };
        if !is_whitelisted_host_call(ctx, member) || !last_parameter_is_string(&member.descriptor)
        {
            return;
        }
        emit_unwrap(ctx);
        ctx.emit(insn.clone());
        if returns_string(&member.descriptor) {
            emit_intern(ctx);
        }
        ctx.prevent_default();
    }
}

/// Interns the host string returned by a whitelisted call.
pub struct ReturnTypeWrapper;

impl Emitter for ReturnTypeWrapper {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { member, .. } = insn else {
            return;
        };
        if !is_whitelisted_host_call(ctx, member) || !returns_string(&member.descriptor) {
            return;
        }
        ctx.emit(insn.clone());
        emit_intern(ctx);
        ctx.prevent_default();
    }
}
