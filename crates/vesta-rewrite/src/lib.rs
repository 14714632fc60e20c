//! The class rewriter: relocates host classes into the deterministic
//! `sandbox/` namespace while enforcing the determinism rule catalog.
//!
//! A rewrite is a pipeline over one class: definition providers adjust class
//! and member metadata, instruction emitters rewrite bytecode one instruction
//! at a time, and the remapper applies the class resolver to every symbolic
//! name before the result is emitted against a fresh constant pool.

#![forbid(unsafe_code)]

mod analysis;
mod driver;
mod emitters;
mod error;
pub mod policy;
mod profile;
mod providers;
mod remapper;
mod resolver;

pub use crate::analysis::{AnalysisConfiguration, AnalysisContext, ClassSummary};
pub use crate::driver::{rewrite_class, RewriteConfiguration, RewrittenClass};
pub use crate::emitters::{Emitter, EmitterContext, EmitterPipeline, HandlerInfo, MemberSummary};
pub use crate::error::{RewriteError, SandboxClassLoadingError};
pub use crate::policy::{forbidden_api_message, Decision, RewriteRules};
pub use crate::profile::ExecutionProfile;
pub use crate::providers::{standard_providers, ClassDefinition, DefinitionProvider};
pub use crate::remapper::Remapper;
pub use crate::resolver::{ClassResolver, Whitelist};
