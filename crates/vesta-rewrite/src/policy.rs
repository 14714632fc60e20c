//! The determinism rule catalog.
//!
//! One decision is produced per member reference; the enforcing emitter turns
//! that decision into bytecode. The canonical table is plain data owned by
//! the configuration so test variants can override it without process-wide
//! state.

use std::collections::BTreeSet;

use vesta_classfile::{parse_method_descriptor, InvokeKind, MemberRef};

/// Runtime helper that hosts the deterministic static thunks.
pub const DJVM: &str = "sandbox/java/lang/DJVM";
/// Runtime helper that the tracing emitters debit budgets against.
pub const COST_ACCOUNTER: &str = "sandbox/RuntimeCostAccounter";

pub const SANDBOX_OBJECT: &str = "sandbox/java/lang/Object";
pub const SANDBOX_STRING: &str = "sandbox/java/lang/String";
pub const SANDBOX_STRING_DESC: &str = "Lsandbox/java/lang/String;";
pub const SANDBOX_THROWABLE_DESC: &str = "Lsandbox/java/lang/Throwable;";
pub const SANDBOX_ENUMERATION_DESC: &str = "Lsandbox/java/util/Enumeration;";

/// Member names reserved for the deterministic runtime; user classes may not
/// declare them.
pub const RESERVED_MEMBER_NAMES: &[&str] = &["toDJVMString", "fromDJVM", "toDJVM"];

/// What the enforcer does with one member reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No objection; later emitters and the remapper take over.
    Allow,
    /// Replace the reference with an injected `RuleViolationError` throw.
    Forbid { message: String },
    /// Discard receiver and arguments, push null.
    StubNull,
    /// Discard receiver and arguments, push an empty enumeration.
    StubEmptyEnumeration,
    /// `ClassLoader()` becomes `ClassLoader(DJVM.getSystemClassLoader())`.
    ThunkClassLoaderInit,
}

/// The policy tables, owned by the rewrite configuration.
#[derive(Debug, Clone)]
pub struct RewriteRules {
    /// Classes whose code may use `Constructor.newInstance`; entries are
    /// internal-name prefixes.
    reflective_callers: Vec<String>,
    /// `sun.security` internals whose constructors pass through.
    allowed_security_constructors: BTreeSet<String>,
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl RewriteRules {
    pub fn standard() -> Self {
        Self {
            reflective_callers: vec!["sandbox/java/".to_string()],
            allowed_security_constructors: [
                "sun/security/provider/DigestBase",
                "sun/security/provider/SHA",
                "sun/security/provider/SHA2",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    pub fn allow_reflective_caller(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.reflective_callers.push(prefix.into());
        self
    }

    pub fn allow_security_constructor(&mut self, owner: impl Into<String>) -> &mut Self {
        self.allowed_security_constructors.insert(owner.into());
        self
    }

    /// One decision per member reference.
    ///
    /// `current_class` is the host name of the class being rewritten; a few
    /// rules are caller-sensitive.
    pub fn decide(&self, kind: InvokeKind, member: &MemberRef, current_class: &str) -> Decision {
        match member.owner.as_str() {
            "java/lang/ClassLoader" => self.decide_class_loader(member),
            "java/lang/Class" => decide_class(member),
            "java/lang/Object" => decide_object(member),
            "java/lang/reflect/Constructor" => {
                if member.name == "newInstance"
                    && !self
                        .reflective_callers
                        .iter()
                        .any(|prefix| current_class.starts_with(prefix.as_str()))
                {
                    forbid(member)
                } else {
                    Decision::Allow
                }
            }
            owner if owner.starts_with("sun/security/") => {
                if kind == InvokeKind::Special
                    && member.name == "<init>"
                    && !self.allowed_security_constructors.contains(owner)
                {
                    forbid(member)
                } else {
                    Decision::Allow
                }
            }
            _ => Decision::Allow,
        }
    }

    fn decide_class_loader(&self, member: &MemberRef) -> Decision {
        let name = member.name.as_str();
        let descriptor = member.descriptor.as_str();
        match name {
            // The parentless constructor is thunked onto the deterministic
            // system classloader. The call the thunk emits is legal; any
            // constructor reference user code spells out itself is not,
            // since the parent argument could be a host loader.
            "<init>" => match descriptor {
                "()V" => Decision::ThunkClassLoaderInit,
                _ => forbid(member),
            },
            "loadClass" => match descriptor {
                // The single-argument form is retargeted to a deterministic
                // helper by the reference rewriter.
                "(Ljava/lang/String;)Ljava/lang/Class;" => Decision::Allow,
                _ => forbid(member),
            },
            "defineClass" | "findClass" | "findLoadedClass" | "resolveClass" => forbid(member),
            "getParent" => Decision::StubNull,
            "getResources" => Decision::StubEmptyEnumeration,
            "getResource" | "getResourceAsStream" => Decision::StubNull,
            "getSystemResources" => Decision::StubEmptyEnumeration,
            "getSystemResource" | "getSystemResourceAsStream" => Decision::StubNull,
            // Retargeted to the deterministic helper by the reference
            // rewriter.
            "getSystemClassLoader" => Decision::Allow,
            _ => Decision::Allow,
        }
    }
}

fn decide_class(member: &MemberRef) -> Decision {
    const ALLOWED_REFLECTION: &[&str] = &[
        "getConstructor",
        "getMethod",
        "getEnclosingConstructor",
        "getEnclosingMethod",
        "getConstructors",
        "getMethods",
    ];
    let name = member.name.as_str();
    if ALLOWED_REFLECTION.contains(&name) {
        return Decision::Allow;
    }
    match name {
        "getProtectionDomain" => Decision::StubNull,
        "getPackage" | "getDeclaredClasses" => forbid(member),
        "forName" if member.descriptor != "(Ljava/lang/String;)Ljava/lang/Class;" => {
            forbid(member)
        }
        _ => {
            // Any other accessor that exposes the reflective registry is out.
            if returns_reflection_type(&member.descriptor) {
                forbid(member)
            } else {
                Decision::Allow
            }
        }
    }
}

fn decide_object(member: &MemberRef) -> Decision {
    match member.name.as_str() {
        "wait" | "notify" | "notifyAll" => forbid(member),
        _ => Decision::Allow,
    }
}

fn returns_reflection_type(descriptor: &str) -> bool {
    vesta_classfile::return_descriptor(descriptor).contains("java/lang/reflect/")
}

fn forbid(member: &MemberRef) -> Decision {
    Decision::Forbid {
        message: forbidden_api_message(member),
    }
}

/// `Disallowed reference to API; <owner>.<member>(<arg types>)`.
///
/// Constructors render without the `.<init>` spelling:
/// `Disallowed reference to API; java.lang.ClassLoader(ClassLoader)`.
pub fn forbidden_api_message(member: &MemberRef) -> String {
    let owner = member.owner.replace('/', ".").replace('$', ".");
    let args = match parse_method_descriptor(&member.descriptor) {
        Ok(parsed) => parsed
            .params
            .iter()
            .map(|p| p.simple_name())
            .collect::<Vec<_>>()
            .join(", "),
        // Field references carry a field descriptor; render without args.
        Err(_) => String::new(),
    };
    if member.name == "<init>" {
        format!("Disallowed reference to API; {owner}({args})")
    } else {
        format!("Disallowed reference to API; {owner}.{}({args})", member.name)
    }
}

/// Virtual members whose method handles are rewritten into static handles on
/// the deterministic helper, with the receiver type prepended.
pub fn handle_thunks() -> &'static [HandleThunk] {
    static THUNKS: &[HandleThunk] = &[
        HandleThunk {
            owner: "java/lang/Object",
            name: "hashCode",
            descriptor: "()I",
            helper_name: "hashCode",
            helper_descriptor: "(Ljava/lang/Object;)I",
        },
        HandleThunk {
            owner: "java/lang/Object",
            name: "toString",
            descriptor: "()Ljava/lang/String;",
            helper_name: "toString",
            helper_descriptor: "(Ljava/lang/Object;)Lsandbox/java/lang/String;",
        },
        HandleThunk {
            owner: "java/lang/ClassLoader",
            name: "loadClass",
            descriptor: "(Ljava/lang/String;)Ljava/lang/Class;",
            helper_name: "loadClass",
            helper_descriptor:
                "(Ljava/lang/ClassLoader;Lsandbox/java/lang/String;)Ljava/lang/Class;",
        },
        HandleThunk {
            owner: "java/lang/Class",
            name: "getName",
            descriptor: "()Ljava/lang/String;",
            helper_name: "getClassName",
            helper_descriptor: "(Ljava/lang/Class;)Lsandbox/java/lang/String;",
        },
        HandleThunk {
            owner: "java/lang/Class",
            name: "getSimpleName",
            descriptor: "()Ljava/lang/String;",
            helper_name: "getClassSimpleName",
            helper_descriptor: "(Ljava/lang/Class;)Lsandbox/java/lang/String;",
        },
        HandleThunk {
            owner: "java/lang/Class",
            name: "getCanonicalName",
            descriptor: "()Ljava/lang/String;",
            helper_name: "getClassCanonicalName",
            helper_descriptor: "(Ljava/lang/Class;)Lsandbox/java/lang/String;",
        },
    ];
    THUNKS
}

#[derive(Debug, Clone, Copy)]
pub struct HandleThunk {
    pub owner: &'static str,
    pub name: &'static str,
    pub descriptor: &'static str,
    pub helper_name: &'static str,
    pub helper_descriptor: &'static str,
}
