//! Name resolution between the host and sandbox namespaces.

use std::collections::BTreeSet;

use vesta_classfile::rewrite_descriptor;
use vesta_core::{sandbox_name, strip_sandbox_prefix, SANDBOX_PREFIX};

/// Host names that pass through the remapper unchanged.
///
/// The set is hand-curated: a whitelisted type is trusted to be pure, and no
/// transitive check is made over the types it references.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    exact: BTreeSet<String>,
    namespaces: Vec<String>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Core language classes plus the deterministic-runtime support surface.
    pub fn minimal() -> Self {
        let mut whitelist = Self::new();
        for name in [
            "java/lang/Object",
            "java/lang/String",
            "java/lang/Class",
            "java/lang/ClassLoader",
            "java/lang/Throwable",
            "java/lang/Error",
            "java/lang/Exception",
            "java/lang/RuntimeException",
            "java/lang/StackTraceElement",
            "java/lang/Math",
            "java/lang/StrictMath",
        ] {
            whitelist.add(name);
        }
        whitelist.add_namespace("java/lang/invoke/");
        whitelist
    }

    pub fn add(&mut self, name: impl Into<String>) -> &mut Self {
        self.exact.insert(name.into());
        self
    }

    /// Whitelist every name under `prefix` (which must end with `/`).
    pub fn add_namespace(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.namespaces.push(prefix.into());
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        self.exact.contains(name)
            || self
                .namespaces
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Names that are shared between the host and sandbox namespaces. Pinned
/// classes keep their host name; their bodies may still be rewritten.
const DEFAULT_PINS: &[&str] = &[
    "java/lang/Object",
    "java/lang/String",
    "java/lang/Throwable",
    "java/lang/Class",
    "java/lang/ClassLoader",
    "java/lang/Boolean",
    "java/lang/Byte",
    "java/lang/Character",
    "java/lang/Short",
    "java/lang/Integer",
    "java/lang/Long",
    "java/lang/Float",
    "java/lang/Double",
    "java/lang/Void",
];

/// Types the deterministic runtime defines directly in the sandbox namespace;
/// their sandbox name equals their host name.
const DEFAULT_TEMPLATES: &[&str] = &[
    "sandbox/java/lang/DJVM",
    "sandbox/java/lang/Object",
    "sandbox/java/lang/String",
    "sandbox/java/lang/Throwable",
    "sandbox/java/util/Enumeration",
    "sandbox/RuntimeCostAccounter",
];

/// Bidirectional mapping between host and sandbox type names.
#[derive(Debug, Clone)]
pub struct ClassResolver {
    pinned: BTreeSet<String>,
    templates: BTreeSet<String>,
    whitelist: Whitelist,
}

impl ClassResolver {
    pub fn new(whitelist: Whitelist) -> Self {
        Self {
            pinned: DEFAULT_PINS.iter().map(|s| s.to_string()).collect(),
            templates: DEFAULT_TEMPLATES.iter().map(|s| s.to_string()).collect(),
            whitelist,
        }
    }

    pub fn with_pins(mut self, pins: impl IntoIterator<Item = String>) -> Self {
        self.pinned.extend(pins);
        self
    }

    pub fn with_templates(mut self, templates: impl IntoIterator<Item = String>) -> Self {
        self.templates.extend(templates);
        self
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.contains(name)
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist.matches(name)
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Map a host internal name (or array descriptor) to its sandbox name.
    pub fn resolve_type(&self, name: &str) -> String {
        if let Some(element) = name.strip_prefix('[') {
            // Strip one bracket, recurse on the element, reassemble. Array
            // element spellings are descriptors, so object elements carry
            // `L...;`.
            if let Some(object) = element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) {
                return format!("[L{};", self.resolve_type(object));
            }
            return format!("[{}", self.resolve_type(element));
        }
        if is_primitive_descriptor(name) {
            return name.to_string();
        }
        if self.pinned.contains(name)
            || self.templates.contains(name)
            || self.whitelist.matches(name)
        {
            return name.to_string();
        }
        if name.starts_with(SANDBOX_PREFIX) {
            return name.to_string();
        }
        sandbox_name(name)
    }

    /// Apply [`Self::resolve_type`] to every type token in a descriptor.
    pub fn resolve_descriptor(&self, descriptor: &str) -> vesta_classfile::Result<String> {
        rewrite_descriptor(descriptor, &mut |name| self.resolve_type(name))
    }

    /// Map a sandbox name back to the host namespace.
    pub fn reverse(&self, name: &str) -> String {
        if self.templates.contains(name) {
            return name.to_string();
        }
        strip_sandbox_prefix(name).to_string()
    }
}

fn is_primitive_descriptor(name: &str) -> bool {
    matches!(name, "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" | "V")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ClassResolver {
        ClassResolver::new(Whitelist::minimal())
    }

    #[test]
    fn user_types_gain_the_sandbox_prefix() {
        assert_eq!(resolver().resolve_type("com/example/Foo"), "sandbox/com/example/Foo");
        assert_eq!(
            resolver().resolve_type("java/util/HashMap"),
            "sandbox/java/util/HashMap"
        );
    }

    #[test]
    fn pinned_whitelisted_and_template_names_are_identity() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_type("java/lang/Object"), "java/lang/Object");
        assert_eq!(resolver.resolve_type("java/lang/Integer"), "java/lang/Integer");
        assert_eq!(resolver.resolve_type("java/lang/Math"), "java/lang/Math");
        assert_eq!(
            resolver.resolve_type("java/lang/invoke/LambdaMetafactory"),
            "java/lang/invoke/LambdaMetafactory"
        );
        assert_eq!(
            resolver.resolve_type("sandbox/java/lang/DJVM"),
            "sandbox/java/lang/DJVM"
        );
    }

    #[test]
    fn already_prefixed_names_are_identity() {
        assert_eq!(resolver().resolve_type("sandbox/com/example/Foo"), "sandbox/com/example/Foo");
    }

    #[test]
    fn array_descriptors_resolve_elementwise() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve_type("[[Lcom/example/Foo;"),
            "[[Lsandbox/com/example/Foo;"
        );
        assert_eq!(resolver.resolve_type("[I"), "[I");
        assert_eq!(
            resolver.resolve_type("[Ljava/lang/String;"),
            "[Ljava/lang/String;"
        );
    }

    #[test]
    fn descriptors_resolve_tokenwise() {
        let resolver = resolver();
        assert_eq!(
            resolver
                .resolve_descriptor("(Lcom/example/Foo;J)Ljava/lang/String;")
                .unwrap(),
            "(Lsandbox/com/example/Foo;J)Ljava/lang/String;"
        );
    }

    #[test]
    fn reverse_strips_the_prefix_except_for_templates() {
        let resolver = resolver();
        assert_eq!(resolver.reverse("sandbox/com/example/Foo"), "com/example/Foo");
        assert_eq!(resolver.reverse("java/lang/Object"), "java/lang/Object");
        assert_eq!(
            resolver.reverse("sandbox/java/lang/DJVM"),
            "sandbox/java/lang/DJVM"
        );
    }
}
