//! Instruction-level rewriters.
//!
//! Emitters run in a fixed priority order over every instruction of every
//! method body. An emitter either emits replacement instructions and consumes
//! the original (`prevent_default`), or emits nothing and lets the remapper
//! handle the instruction. The first emitter to consume an instruction wins;
//! the tracing emitters are purely additive and run first so that injected
//! replacements are still accounted.
//!
//! Labels are special: the driver appends a label before running the chain on
//! it, so emissions against a label land *after* it (handler prologues rely
//! on this), and labels cannot be consumed.

mod boundary;
mod enforce;
mod exceptions;
mod math;
mod monitors;
mod references;
mod strings;
mod trace;

pub use boundary::{ArgumentUnwrapper, ReturnTypeWrapper};
pub use enforce::DisallowNonDeterministicMethods;
pub use exceptions::{
    DisallowCatchingBlacklistedExceptions, HandleExceptionUnwrapper, ThrowExceptionWrapper,
};
pub use math::AlwaysUseExactMath;
pub use monitors::{IgnoreBreakpoints, IgnoreSynchronizedBlocks};
pub use references::{RewriteClassLoaderMethods, RewriteClassMethods, RewriteObjectMethods};
pub use strings::StringConstantWrapper;
pub use trace::{TraceAllocations, TraceInvocations, TraceJumps, TraceThrows};

use std::collections::HashMap;

use vesta_classfile::{Code, Insn, Label};
use vesta_core::{Diagnostic, Severity};

use crate::analysis::AnalysisContext;
use crate::policy::RewriteRules;
use crate::profile::ExecutionProfile;
use crate::resolver::ClassResolver;

/// The member whose body is being rewritten.
#[derive(Debug, Clone)]
pub struct MemberSummary {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

/// Exception-handler entries anchored at one label.
#[derive(Debug, Clone, Default)]
pub struct HandlerInfo {
    /// Catch types of the handlers starting here; `None` is a catch-all.
    pub catch_types: Vec<Option<String>>,
}

pub struct EmitterContext<'a, 'b> {
    pub analysis: &'a mut AnalysisContext<'b>,
    pub resolver: &'a ClassResolver,
    pub rules: &'a RewriteRules,
    pub method: MemberSummary,
    handlers: HashMap<Label, HandlerInfo>,
    output: Vec<Insn>,
    prevented: bool,
    stack_growth: u16,
}

impl<'a, 'b> EmitterContext<'a, 'b> {
    fn new(
        analysis: &'a mut AnalysisContext<'b>,
        resolver: &'a ClassResolver,
        rules: &'a RewriteRules,
        method: MemberSummary,
        code: &Code,
    ) -> Self {
        let mut handlers: HashMap<Label, HandlerInfo> = HashMap::new();
        for handler in &code.handlers {
            handlers
                .entry(handler.handler)
                .or_default()
                .catch_types
                .push(handler.catch_type.clone());
        }
        Self {
            analysis,
            resolver,
            rules,
            method,
            handlers,
            output: Vec::with_capacity(code.instructions.len()),
            prevented: false,
            stack_growth: 0,
        }
    }

    /// Append a replacement instruction.
    pub fn emit(&mut self, insn: Insn) {
        self.output.push(insn);
    }

    /// Consume the original instruction; later emitters will not see it.
    pub fn prevent_default(&mut self) {
        self.prevented = true;
    }

    /// Record that injected code needs `slots` extra operand stack entries.
    pub fn grow_stack(&mut self, slots: u16) {
        self.stack_growth = self.stack_growth.max(slots);
    }

    pub fn report(&mut self, severity: Severity, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(severity, message)
            .in_member(&self.method.name, &self.method.descriptor);
        self.analysis.record(diagnostic);
    }

    /// Handler entries anchored at `label`, if it is a handler entry point.
    pub fn handler_at(&self, label: Label) -> Option<&HandlerInfo> {
        self.handlers.get(&label)
    }

    pub fn class_host_name(&self) -> &str {
        &self.analysis.class.host_name
    }
}

pub trait Emitter: Send + Sync {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn);
}

/// The emitter chain, composed once per configuration.
pub struct EmitterPipeline {
    emitters: Vec<Box<dyn Emitter>>,
}

impl EmitterPipeline {
    /// The canonical order. Tracers are present iff a profile is configured.
    pub fn standard(profile: Option<&ExecutionProfile>) -> Self {
        let mut emitters: Vec<Box<dyn Emitter>> = Vec::new();
        if profile.is_some() {
            emitters.push(Box::new(TraceAllocations));
            emitters.push(Box::new(TraceInvocations));
            emitters.push(Box::new(TraceJumps));
            emitters.push(Box::new(TraceThrows));
        }
        emitters.push(Box::new(IgnoreBreakpoints));
        emitters.push(Box::new(IgnoreSynchronizedBlocks));
        emitters.push(Box::new(AlwaysUseExactMath));
        emitters.push(Box::new(DisallowCatchingBlacklistedExceptions));
        emitters.push(Box::new(HandleExceptionUnwrapper));
        emitters.push(Box::new(DisallowNonDeterministicMethods));
        emitters.push(Box::new(RewriteClassLoaderMethods));
        emitters.push(Box::new(RewriteClassMethods));
        emitters.push(Box::new(RewriteObjectMethods));
        emitters.push(Box::new(ArgumentUnwrapper));
        emitters.push(Box::new(ReturnTypeWrapper));
        emitters.push(Box::new(ThrowExceptionWrapper));
        emitters.push(Box::new(StringConstantWrapper));
        Self { emitters }
    }

    /// Run the chain over a method body, returning the rewritten instruction
    /// list and the extra stack the injected code needs.
    pub fn run(
        &self,
        analysis: &mut AnalysisContext<'_>,
        resolver: &ClassResolver,
        rules: &RewriteRules,
        method: MemberSummary,
        code: &Code,
    ) -> (Vec<Insn>, u16) {
        let mut ctx = EmitterContext::new(analysis, resolver, rules, method, code);
        for insn in &code.instructions {
            if let Insn::Label(_) = insn {
                // Labels are appended first so handler prologues land after
                // them; they cannot be consumed.
                ctx.output.push(insn.clone());
                for emitter in &self.emitters {
                    emitter.emit(&mut ctx, insn);
                }
                ctx.prevented = false;
                continue;
            }

            ctx.prevented = false;
            for emitter in &self.emitters {
                emitter.emit(&mut ctx, insn);
                if ctx.prevented {
                    break;
                }
            }
            if !ctx.prevented {
                ctx.output.push(insn.clone());
            }
        }
        (ctx.output, ctx.stack_growth)
    }
}
