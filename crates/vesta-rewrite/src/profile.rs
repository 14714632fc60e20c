//! Execution profiles: budgets for the injected runtime counters.

/// Per-thread budgets enforced by the bytecode the tracing emitters inject.
///
/// A configuration without a profile gets no tracing emitters at all; the
/// choice is made when the pipeline is composed, not per instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionProfile {
    pub allocation_cost_limit: i64,
    pub invocation_cost_limit: i64,
    pub jump_cost_limit: i64,
    pub throw_cost_limit: i64,
}

impl ExecutionProfile {
    pub const DEFAULT: ExecutionProfile = ExecutionProfile {
        allocation_cost_limit: 1024 * 1024,
        invocation_cost_limit: 1_000_000,
        jump_cost_limit: 1_000_000,
        throw_cost_limit: 1_000_000,
    };

    pub const UNLIMITED: ExecutionProfile = ExecutionProfile {
        allocation_cost_limit: i64::MAX,
        invocation_cost_limit: i64::MAX,
        jump_cost_limit: i64::MAX,
        throw_cost_limit: i64::MAX,
    };
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}
