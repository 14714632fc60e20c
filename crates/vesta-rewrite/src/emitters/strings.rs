use vesta_classfile::{Const, Insn};

use super::{Emitter, EmitterContext};
use crate::policy::{DJVM, SANDBOX_STRING_DESC};

/// Every string constant is routed through the deterministic intern helper
/// immediately after it is pushed, so user code only ever observes sandbox
/// strings.
pub struct StringConstantWrapper;

impl Emitter for StringConstantWrapper {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Ldc(Const::String(_)) = insn else {
            return;
        };
        ctx.emit(insn.clone());
        ctx.emit(Insn::invoke_static(
            DJVM,
            "intern",
            &format!("(Ljava/lang/String;){SANDBOX_STRING_DESC}"),
        ));
        ctx.prevent_default();
    }
}
