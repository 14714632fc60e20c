//! Classfile reading and writing for the sandbox rewriter.
//!
//! The model is deliberately pool-independent: branch targets are symbolic
//! labels and constants are owned values, so a parsed class can be rewritten
//! instruction by instruction and emitted against a fresh constant pool.

#![forbid(unsafe_code)]

mod annotation;
mod assemble;
mod classfile;
mod code;
mod constant;
mod constant_pool;
mod descriptor;
mod error;
pub mod flags;
mod insn;
mod mutf8;
mod opcode;
mod pool_builder;
mod reader;
mod writer;

pub use crate::annotation::{descriptor_to_internal_name, Annotation, ConstValue, ElementValue};
pub use crate::classfile::{
    parse_header, ClassFile, ClassHeader, Code, Field, InnerClass, Method,
};
pub use crate::code::ExceptionHandler;
pub use crate::constant::{BootstrapMethod, Const, DynamicConst, HandleKind, MethodHandleConst};
pub use crate::descriptor::{
    parameter_slots, parse_field_descriptor, parse_method_descriptor, return_descriptor,
    rewrite_descriptor, BaseType, FieldType, MethodDescriptor, ReturnType,
};
pub use crate::error::{Error, Result};
pub use crate::insn::{
    BranchOp, FieldOp, Insn, InvokeKind, Label, MemberRef, TypeOp, VarOp,
};
pub use crate::opcode::Opcode;
pub use crate::writer::write_class;
