//! Pool-independent instruction model.
//!
//! Branch targets are symbolic [`Label`]s and constant operands are owned
//! values, so instruction lists can be freely rewritten and re-assembled
//! against a new constant pool.

use crate::constant::{BootstrapMethod, Const};
use crate::opcode::Opcode;

/// Symbolic position in an instruction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOp {
    ILoad,
    LLoad,
    FLoad,
    DLoad,
    ALoad,
    IStore,
    LStore,
    FStore,
    DStore,
    AStore,
    Ret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchOp {
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    Goto,
    Jsr,
    IfNull,
    IfNonNull,
}

impl BranchOp {
    /// The opposite condition, used when a conditional branch has to be
    /// widened into a `goto_w` pair. `Goto`/`Jsr` have no inverse.
    pub fn invert(self) -> Option<BranchOp> {
        Some(match self {
            BranchOp::IfEq => BranchOp::IfNe,
            BranchOp::IfNe => BranchOp::IfEq,
            BranchOp::IfLt => BranchOp::IfGe,
            BranchOp::IfGe => BranchOp::IfLt,
            BranchOp::IfGt => BranchOp::IfLe,
            BranchOp::IfLe => BranchOp::IfGt,
            BranchOp::IfICmpEq => BranchOp::IfICmpNe,
            BranchOp::IfICmpNe => BranchOp::IfICmpEq,
            BranchOp::IfICmpLt => BranchOp::IfICmpGe,
            BranchOp::IfICmpGe => BranchOp::IfICmpLt,
            BranchOp::IfICmpGt => BranchOp::IfICmpLe,
            BranchOp::IfICmpLe => BranchOp::IfICmpGt,
            BranchOp::IfACmpEq => BranchOp::IfACmpNe,
            BranchOp::IfACmpNe => BranchOp::IfACmpEq,
            BranchOp::IfNull => BranchOp::IfNonNull,
            BranchOp::IfNonNull => BranchOp::IfNull,
            BranchOp::Goto | BranchOp::Jsr => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    /// Whether the call pops a receiver in addition to its arguments.
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOp {
    New,
    ANewArray,
    CheckCast,
    InstanceOf,
}

/// `(owner, name, descriptor)` of a field or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Position marker; never emitted as bytes.
    Label(Label),
    Simple(Opcode),
    /// `bipush`/`sipush`; the assembler picks the narrowest encoding.
    Push(i32),
    /// `ldc`/`ldc_w`/`ldc2_w`; the assembler picks the form.
    Ldc(Const),
    Var { op: VarOp, index: u16 },
    Iinc { index: u16, delta: i16 },
    Branch { op: BranchOp, target: Label },
    TableSwitch {
        default: Label,
        low: i32,
        high: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    Field { op: FieldOp, member: MemberRef },
    Invoke {
        kind: InvokeKind,
        member: MemberRef,
        is_interface: bool,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: BootstrapMethod,
    },
    Type { op: TypeOp, name: String },
    NewArray { atype: u8 },
    MultiANewArray { descriptor: String, dimensions: u8 },
}

impl Insn {
    /// Convenience for building `invokestatic` thunk calls.
    pub fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Insn {
        Insn::Invoke {
            kind: InvokeKind::Static,
            member: MemberRef::new(owner, name, descriptor),
            is_interface: false,
        }
    }
}
