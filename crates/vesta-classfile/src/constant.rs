//! Self-contained constant values.
//!
//! Loadable constants are lifted out of the pool into owned values so that
//! rewritten classes can be emitted against a freshly built pool without
//! tracking original indices.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal name, or an array descriptor such as `[Ljava/lang/String;`.
    Class(String),
    MethodType(String),
    MethodHandle(MethodHandleConst),
    Dynamic(Box<DynamicConst>),
}

impl Const {
    /// Whether the constant occupies two pool slots (and requires `ldc2_w`).
    pub fn is_wide(&self) -> bool {
        matches!(self, Const::Long(_) | Const::Double(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return Err(Error::MalformedAttribute("MethodHandle")),
        })
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            HandleKind::GetField
                | HandleKind::GetStatic
                | HandleKind::PutField
                | HandleKind::PutStatic
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodHandleConst {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// A `Dynamic` (condy) constant with its bootstrap specifier folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicConst {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: BootstrapMethod,
}

/// A bootstrap specifier, folded out of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub handle: MethodHandleConst,
    pub arguments: Vec<Const>,
}
