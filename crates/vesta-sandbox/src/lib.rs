//! The sandbox surface: hierarchical configurations, the sandbox class
//! loader, and the boundary checks on values entering the sandbox.

#![forbid(unsafe_code)]

mod boundary;
mod config;
mod error;
mod loader;
mod preload;

pub use crate::boundary::{validate_boundary_value, BoundaryValue};
pub use crate::config::{SandboxConfiguration, SandboxConfigurationBuilder};
pub use crate::error::SandboxError;
pub use crate::loader::{LoadedClass, SandboxClass, SandboxClassLoader};
pub use crate::preload::preload;
