//! Instrumentation counters, present iff an execution profile is configured.
//!
//! Each tracer prepends a call that debits the per-thread budget and traps
//! when it is exhausted; the budget thresholds themselves are installed into
//! the runtime accounter when execution starts, so the injected bytecode is
//! identical across profiles. Tracers never consume the instruction, so they
//! compose with every other emitter.

use vesta_classfile::{Insn, Opcode, TypeOp};

use super::{Emitter, EmitterContext};
use crate::policy::COST_ACCOUNTER;

pub struct TraceAllocations;

impl Emitter for TraceAllocations {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let allocates = matches!(
            insn,
            Insn::Type {
                op: TypeOp::New,
                ..
            } | Insn::NewArray { .. }
                | Insn::MultiANewArray { .. }
        );
        if allocates {
            ctx.emit(Insn::invoke_static(
                COST_ACCOUNTER,
                "recordAllocation",
                "()V",
            ));
        }
    }
}

pub struct TraceInvocations;

impl Emitter for TraceInvocations {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if matches!(insn, Insn::Invoke { .. } | Insn::InvokeDynamic { .. }) {
            ctx.emit(Insn::invoke_static(
                COST_ACCOUNTER,
                "recordInvocation",
                "()V",
            ));
        }
    }
}

pub struct TraceJumps;

impl Emitter for TraceJumps {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if matches!(
            insn,
            Insn::Branch { .. } | Insn::TableSwitch { .. } | Insn::LookupSwitch { .. }
        ) {
            ctx.emit(Insn::invoke_static(COST_ACCOUNTER, "recordJump", "()V"));
        }
    }
}

pub struct TraceThrows;

impl Emitter for TraceThrows {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        if matches!(insn, Insn::Simple(Opcode::AThrow)) {
            ctx.emit(Insn::invoke_static(COST_ACCOUNTER, "recordThrow", "()V"));
        }
    }
}
