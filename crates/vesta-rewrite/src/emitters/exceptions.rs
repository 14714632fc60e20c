//! Exception translation at catch and throw sites.
//!
//! Sandboxed code works with sandbox throwables; the host VM throws host
//! throwables. Handler entries convert inbound, `athrow` converts outbound,
//! and the internal control-flow errors that signal rule violations are
//! rethrown before user code can observe them.

use vesta_classfile::{Insn, Opcode, TypeOp};
use vesta_core::SANDBOX_PREFIX;

use super::{Emitter, EmitterContext};
use crate::policy::{DJVM, SANDBOX_THROWABLE_DESC};

/// Catch types broad enough to swallow the sandbox's own control-flow errors.
fn is_blacklist_catchable(catch_type: &Option<String>) -> bool {
    match catch_type.as_deref() {
        None => true,
        Some("java/lang/Throwable") | Some("java/lang/Error") => true,
        Some("sandbox/java/lang/Throwable") => true,
        _ => false,
    }
}

/// Handlers that could catch an internal control-flow error get a guard that
/// rethrows it before the handler body runs.
pub struct DisallowCatchingBlacklistedExceptions;

impl Emitter for DisallowCatchingBlacklistedExceptions {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Label(label) = insn else { return };
        let guarded = ctx
            .handler_at(*label)
            .is_some_and(|info| info.catch_types.iter().any(is_blacklist_catchable));
        if guarded {
            ctx.emit(Insn::invoke_static(
                DJVM,
                "checkCatch",
                "(Ljava/lang/Throwable;)Ljava/lang/Throwable;",
            ));
        }
    }
}

/// Handler entries convert the caught host throwable into its sandbox
/// counterpart, then cast to the declared catch type.
pub struct HandleExceptionUnwrapper;

impl Emitter for HandleExceptionUnwrapper {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Label(label) = insn else { return };
        let Some(info) = ctx.handler_at(*label).cloned() else {
            return;
        };
        ctx.emit(Insn::invoke_static(
            DJVM,
            "doCatch",
            &format!("(Ljava/lang/Throwable;){SANDBOX_THROWABLE_DESC}"),
        ));

        // When every handler anchored here agrees on a sandbox catch type,
        // restore it for the handler body.
        let resolver = ctx.resolver;
        let mut types = info
            .catch_types
            .iter()
            .flatten()
            .map(|t| resolver.resolve_type(t))
            .collect::<Vec<_>>();
        types.sort();
        types.dedup();
        if let [only] = types.as_slice() {
            if only.starts_with(SANDBOX_PREFIX) {
                ctx.emit(Insn::Type {
                    op: TypeOp::CheckCast,
                    name: only.clone(),
                });
            }
        }
    }
}

/// `athrow` sites convert the sandbox throwable back into a host throwable.
pub struct ThrowExceptionWrapper;

impl Emitter for ThrowExceptionWrapper {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if !matches!(insn, Insn::Simple(Opcode::AThrow)) {
            return;
        }
        ctx.emit(Insn::invoke_static(
            DJVM,
            "fromDJVM",
            &format!("({SANDBOX_THROWABLE_DESC})Ljava/lang/Throwable;"),
        ));
        ctx.emit(Insn::Simple(Opcode::AThrow));
        ctx.prevent_default();
    }
}
