//! Checks on values crossing into the sandbox.
//!
//! Reflection objects and host classloaders must never be handed to
//! sandboxed code; the check lives on the boundary entry point that
//! transfers arguments in.

use crate::error::SandboxError;

/// A host value being passed into the sandbox entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<BoundaryValue>),
    /// A `java.lang.Class` value, by binary name.
    Class(String),
    Method { owner: String, name: String },
    Field { owner: String, name: String },
    Constructor { owner: String },
    /// A host classloader instance, described by its class's binary name.
    ClassLoader(String),
}

/// Reject values the sandbox must never observe.
///
/// Messages follow the `Cannot sandbox <type> <value>` convention, e.g.
/// `Cannot sandbox class java.lang.String`.
pub fn validate_boundary_value(value: &BoundaryValue) -> Result<(), SandboxError> {
    match value {
        BoundaryValue::Class(name) => violation(format!("Cannot sandbox class {name}")),
        BoundaryValue::Method { owner, name } => {
            violation(format!("Cannot sandbox method {owner}.{name}"))
        }
        BoundaryValue::Field { owner, name } => {
            violation(format!("Cannot sandbox field {owner}.{name}"))
        }
        BoundaryValue::Constructor { owner } => {
            violation(format!("Cannot sandbox constructor {owner}"))
        }
        BoundaryValue::ClassLoader(name) => {
            violation(format!("Cannot sandbox classloader {name}"))
        }
        BoundaryValue::Array(values) => {
            for value in values {
                validate_boundary_value(value)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn violation(message: String) -> Result<(), SandboxError> {
    Err(SandboxError::RuleViolation(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_class_values_are_rejected() {
        let err =
            validate_boundary_value(&BoundaryValue::Class("java.lang.String".to_string()))
                .unwrap_err();
        assert_eq!(err.to_string(), "Cannot sandbox class java.lang.String");
    }

    #[test]
    fn reflection_values_are_rejected_inside_arrays() {
        let arg = BoundaryValue::Array(vec![
            BoundaryValue::Int(1),
            BoundaryValue::Constructor {
                owner: "java.lang.StringBuilder".to_string(),
            },
        ]);
        let err = validate_boundary_value(&arg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot sandbox constructor java.lang.StringBuilder"
        );
    }

    #[test]
    fn plain_data_passes() {
        for value in [
            BoundaryValue::Null,
            BoundaryValue::Int(42),
            BoundaryValue::String("ok".to_string()),
            BoundaryValue::Array(vec![BoundaryValue::Long(7)]),
        ] {
            assert!(validate_boundary_value(&value).is_ok());
        }
    }
}
