use vesta_classfile::{Insn, Opcode};

use super::{Emitter, EmitterContext};

/// Integer arithmetic that can overflow silently is rewritten to the exact
/// variants, which throw instead of wrapping.
pub struct AlwaysUseExactMath;

impl Emitter for AlwaysUseExactMath {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Simple(opcode) = insn else { return };
        let (name, descriptor) = match opcode {
            Opcode::IAdd => ("addExact", "(II)I"),
            Opcode::ISub => ("subtractExact", "(II)I"),
            Opcode::IMul => ("multiplyExact", "(II)I"),
            Opcode::INeg => ("negateExact", "(I)I"),
            Opcode::LAdd => ("addExact", "(JJ)J"),
            Opcode::LSub => ("subtractExact", "(JJ)J"),
            Opcode::LMul => ("multiplyExact", "(JJ)J"),
            Opcode::LNeg => ("negateExact", "(J)J"),
            _ => return,
        };
        ctx.emit(Insn::invoke_static("java/lang/Math", name, descriptor));
        ctx.prevent_default();
    }
}
