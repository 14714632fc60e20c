/// Prefix of the parallel namespace rewritten classes are relocated into.
pub const SANDBOX_PREFIX: &str = "sandbox/";

/// Convert an internal name (`a/b/C`) to a binary name (`a.b.C`).
pub fn binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Convert a binary name (`a.b.C`) to an internal name (`a/b/C`).
pub fn internal_name(binary: &str) -> String {
    binary.replace('.', "/")
}

/// Whether `name` already lives in the sandbox namespace.
///
/// Accepts both internal (`sandbox/a/B`) and binary (`sandbox.a.B`) spellings.
pub fn is_sandbox_name(name: &str) -> bool {
    name.starts_with(SANDBOX_PREFIX) || name.starts_with("sandbox.")
}

/// Relocate a host internal name into the sandbox namespace.
///
/// Names that already carry the prefix are returned unchanged.
pub fn sandbox_name(host: &str) -> String {
    if is_sandbox_name(host) {
        host.to_string()
    } else {
        format!("{SANDBOX_PREFIX}{host}")
    }
}

/// Undo [`sandbox_name`]; non-sandbox names are returned unchanged.
pub fn strip_sandbox_prefix(name: &str) -> &str {
    name.strip_prefix(SANDBOX_PREFIX).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_prefixing_is_idempotent() {
        assert_eq!(sandbox_name("java/util/HashMap"), "sandbox/java/util/HashMap");
        assert_eq!(
            sandbox_name("sandbox/java/util/HashMap"),
            "sandbox/java/util/HashMap"
        );
        assert_eq!(strip_sandbox_prefix("sandbox/a/B"), "a/B");
        assert_eq!(strip_sandbox_prefix("a/B"), "a/B");
    }

    #[test]
    fn name_spellings() {
        assert_eq!(binary_name("sandbox/foo/Bar"), "sandbox.foo.Bar");
        assert_eq!(internal_name("sandbox.foo.Bar"), "sandbox/foo/Bar");
        assert!(is_sandbox_name("sandbox.foo.Bar"));
        assert!(!is_sandbox_name("foo/Bar"));
    }
}
