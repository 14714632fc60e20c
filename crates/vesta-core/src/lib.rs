//! Shared primitives for the Vesta sandbox rewriter.
//!
//! Everything here is deliberately small: name conversions between the host
//! and sandbox namespaces, diagnostic severities, and the diagnostics that
//! rewrite passes accumulate.

#![forbid(unsafe_code)]

mod diagnostic;
mod name;

pub use crate::diagnostic::{Diagnostic, Severity};
pub use crate::name::{
    binary_name, internal_name, is_sandbox_name, sandbox_name, strip_sandbox_prefix,
    SANDBOX_PREFIX,
};
