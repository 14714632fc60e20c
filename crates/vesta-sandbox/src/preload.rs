//! Eager rewriting of archives carrying the preload manifest.

use vesta_core::binary_name;

use crate::error::SandboxError;
use crate::loader::{SandboxClass, SandboxClassLoader};

/// Rewrite every class of every manifest-carrying source, chasing referenced
/// classes until the transitive closure is in the cache. Returns how many
/// classes ended up defined by this loader.
pub fn preload(loader: &SandboxClassLoader) -> Result<usize, SandboxError> {
    let mut defined = 0usize;
    let config = loader.configuration();
    for source in config.source().preload_sources() {
        tracing::info!(
            target = "vesta.loader",
            path = %source.path().display(),
            "preloading archive"
        );
        for class_name in source.class_names()? {
            let sandbox_name = config.rewrite().resolver().resolve_type(&class_name);
            let loaded = loader.load_sandbox_class(&binary_name(&sandbox_name))?;
            if let SandboxClass::Sandboxed(loaded) = loaded {
                loader.resolve_references(&loaded)?;
                defined += 1;
            }
        }
    }
    Ok(defined)
}
