//! Assembly of instruction lists back into `Code` attribute bytes.
//!
//! Offsets are resolved in two stages: a sizing fixpoint that decides which
//! branches need wide encodings, then a single emission pass. Conditional
//! branches that cannot reach their target in an `i16` are rewritten into an
//! inverted condition over `goto_w`.

use std::collections::{HashMap, HashSet};

use crate::code::ExceptionHandler;
use crate::descriptor::parameter_slots;
use crate::error::{Error, Result};
use crate::insn::{BranchOp, FieldOp, Insn, InvokeKind, Label, VarOp};
use crate::pool_builder::{BootstrapTable, PoolBuilder};

pub(crate) struct AssembledCode {
    pub bytes: Vec<u8>,
    /// `(start_pc, end_pc, handler_pc, catch_type_index)` rows.
    pub handlers: Vec<(u16, u16, u16, u16)>,
}

pub(crate) fn assemble(
    instructions: &[Insn],
    handlers: &[ExceptionHandler],
    pool: &mut PoolBuilder,
    bootstraps: &mut BootstrapTable,
) -> Result<AssembledCode> {
    // Pool indices are assigned up front: `ldc` widths depend on them.
    let operands = intern_operands(instructions, pool, bootstraps)?;

    let mut wide: HashSet<usize> = HashSet::new();
    let mut offsets;
    let mut labels: HashMap<Label, u32>;
    loop {
        offsets = Vec::with_capacity(instructions.len());
        labels = HashMap::new();
        let mut pos = 0u32;
        for (i, insn) in instructions.iter().enumerate() {
            offsets.push(pos);
            if let Insn::Label(label) = insn {
                labels.insert(*label, pos);
            }
            pos += insn_size(insn, &operands[i], pos, wide.contains(&i))?;
        }

        let mut grew = false;
        for (i, insn) in instructions.iter().enumerate() {
            if let Insn::Branch { target, .. } = insn {
                if wide.contains(&i) {
                    continue;
                }
                let target_offset =
                    *labels.get(target).ok_or(Error::UnboundLabel(target.0))?;
                let delta = target_offset as i64 - offsets[i] as i64;
                if i16::try_from(delta).is_err() {
                    wide.insert(i);
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
    }

    let mut bytes = Vec::new();
    for (i, insn) in instructions.iter().enumerate() {
        debug_assert_eq!(bytes.len() as u32, offsets[i]);
        emit_insn(insn, &operands[i], &labels, wide.contains(&i), &mut bytes)?;
    }
    if bytes.len() > u16::MAX as usize {
        return Err(Error::CodeTooLarge(bytes.len()));
    }

    let mut rows = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let resolve = |label: Label| -> Result<u16> {
            let offset = labels.get(&label).ok_or(Error::UnboundLabel(label.0))?;
            Ok(*offset as u16)
        };
        let catch_index = match &handler.catch_type {
            Some(name) => pool.class(name)?,
            None => 0,
        };
        rows.push((
            resolve(handler.start)?,
            resolve(handler.end)?,
            resolve(handler.handler)?,
            catch_index,
        ));
    }

    Ok(AssembledCode {
        bytes,
        handlers: rows,
    })
}

/// Per-instruction pre-resolved pool operand.
#[derive(Debug, Clone, Copy, Default)]
struct Operand {
    pool_index: Option<u16>,
    /// `invokeinterface` argument slot count (receiver included).
    interface_count: Option<u8>,
    /// The constant is long/double and requires `ldc2_w`.
    wide_const: bool,
}

fn intern_operands(
    instructions: &[Insn],
    pool: &mut PoolBuilder,
    bootstraps: &mut BootstrapTable,
) -> Result<Vec<Operand>> {
    instructions
        .iter()
        .map(|insn| {
            let mut operand = Operand::default();
            match insn {
                Insn::Ldc(value) => {
                    operand.pool_index = Some(pool.constant(value, bootstraps)?);
                    operand.wide_const = value.is_wide();
                }
                Insn::Push(value) => {
                    // Out-of-range pushes fall back to an integer constant.
                    if i16::try_from(*value).is_err() {
                        operand.pool_index = Some(pool.integer(*value)?);
                    }
                }
                Insn::Field { member, .. } => {
                    operand.pool_index =
                        Some(pool.field_ref(&member.owner, &member.name, &member.descriptor)?);
                }
                Insn::Invoke {
                    kind,
                    member,
                    is_interface,
                } => {
                    operand.pool_index = Some(pool.method_ref(
                        &member.owner,
                        &member.name,
                        &member.descriptor,
                        *is_interface,
                    )?);
                    if *kind == InvokeKind::Interface {
                        let slots: u8 = parameter_slots(&member.descriptor)?.iter().sum();
                        operand.interface_count = Some(slots + 1);
                    }
                }
                Insn::InvokeDynamic {
                    name,
                    descriptor,
                    bootstrap,
                } => {
                    operand.pool_index =
                        Some(pool.invoke_dynamic(name, descriptor, bootstrap, bootstraps)?);
                }
                Insn::Type { name, .. } => {
                    operand.pool_index = Some(pool.class(name)?);
                }
                Insn::MultiANewArray { descriptor, .. } => {
                    operand.pool_index = Some(pool.class(descriptor)?);
                }
                _ => {}
            }
            Ok(operand)
        })
        .collect()
}

fn insn_size(insn: &Insn, operand: &Operand, pos: u32, wide: bool) -> Result<u32> {
    Ok(match insn {
        Insn::Label(_) => 0,
        Insn::Simple(_) => 1,
        Insn::Push(value) => match value {
            -1..=5 => 1,
            v if i8::try_from(*v).is_ok() => 2,
            v if i16::try_from(*v).is_ok() => 3,
            _ => ldc_size(operand),
        },
        Insn::Ldc(_) => ldc_size(operand),
        Insn::Var { op, index } => var_size(*op, *index),
        Insn::Iinc { index, delta } => {
            if *index <= 0xff && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::Branch { op, .. } => match op {
            BranchOp::Goto | BranchOp::Jsr => {
                if wide {
                    5
                } else {
                    3
                }
            }
            _ => {
                if wide {
                    8
                } else {
                    3
                }
            }
        },
        Insn::TableSwitch { targets, .. } => {
            let padding = (4 - (pos + 1) % 4) % 4;
            1 + padding + 12 + 4 * targets.len() as u32
        }
        Insn::LookupSwitch { pairs, .. } => {
            let padding = (4 - (pos + 1) % 4) % 4;
            1 + padding + 8 + 8 * pairs.len() as u32
        }
        Insn::Field { .. } => 3,
        Insn::Invoke { kind, .. } => {
            if *kind == InvokeKind::Interface {
                5
            } else {
                3
            }
        }
        Insn::InvokeDynamic { .. } => 5,
        Insn::Type { .. } => 3,
        Insn::NewArray { .. } => 2,
        Insn::MultiANewArray { .. } => 4,
    })
}

fn ldc_size(operand: &Operand) -> u32 {
    if operand.wide_const {
        3
    } else if operand.pool_index.unwrap_or(u16::MAX) <= 0xff {
        2
    } else {
        3
    }
}

fn var_size(op: VarOp, index: u16) -> u32 {
    if index > 0xff {
        4
    } else if index <= 3 && op != VarOp::Ret {
        1
    } else {
        2
    }
}

fn emit_insn(
    insn: &Insn,
    operand: &Operand,
    labels: &HashMap<Label, u32>,
    wide: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let resolve = |label: Label| -> Result<u32> {
        labels.get(&label).copied().ok_or(Error::UnboundLabel(label.0))
    };
    let base = out.len() as u32;
    match insn {
        Insn::Label(_) => {}
        Insn::Simple(opcode) => out.push(opcode.byte()),
        Insn::Push(value) => match value {
            -1..=5 => out.push((0x03 + value) as u8),
            v if i8::try_from(*v).is_ok() => {
                out.push(0x10);
                out.push(*v as i8 as u8);
            }
            v if i16::try_from(*v).is_ok() => {
                out.push(0x11);
                out.extend_from_slice(&(*v as i16).to_be_bytes());
            }
            _ => emit_ldc(operand, out),
        },
        Insn::Ldc(_) => emit_ldc(operand, out),
        Insn::Var { op, index } => emit_var(*op, *index, out),
        Insn::Iinc { index, delta } => {
            if *index <= 0xff && i8::try_from(*delta).is_ok() {
                out.push(0x84);
                out.push(*index as u8);
                out.push(*delta as i8 as u8);
            } else {
                out.push(0xc4);
                out.push(0x84);
                out.extend_from_slice(&index.to_be_bytes());
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Insn::Branch { op, target } => {
            let target_offset = resolve(*target)?;
            if !wide {
                let delta = target_offset as i64 - base as i64;
                let delta =
                    i16::try_from(delta).map_err(|_| Error::InvalidBranchTarget { offset: delta })?;
                out.push(branch_byte(*op));
                out.extend_from_slice(&delta.to_be_bytes());
            } else {
                match op {
                    BranchOp::Goto | BranchOp::Jsr => {
                        out.push(if *op == BranchOp::Goto { 0xc8 } else { 0xc9 });
                        let delta = (target_offset as i64 - base as i64) as i32;
                        out.extend_from_slice(&delta.to_be_bytes());
                    }
                    conditional => {
                        // if<inv> +8; goto_w target
                        let inverted = conditional
                            .invert()
                            .expect("conditional branches always invert");
                        out.push(branch_byte(inverted));
                        out.extend_from_slice(&8i16.to_be_bytes());
                        out.push(0xc8);
                        let goto_base = base as i64 + 3;
                        let delta = (target_offset as i64 - goto_base) as i32;
                        out.extend_from_slice(&delta.to_be_bytes());
                    }
                }
            }
        }
        Insn::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            out.push(0xaa);
            while out.len() % 4 != 0 {
                out.push(0);
            }
            let default_delta = (resolve(*default)? as i64 - base as i64) as i32;
            out.extend_from_slice(&default_delta.to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for target in targets {
                let delta = (resolve(*target)? as i64 - base as i64) as i32;
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Insn::LookupSwitch { default, pairs } => {
            out.push(0xab);
            while out.len() % 4 != 0 {
                out.push(0);
            }
            let default_delta = (resolve(*default)? as i64 - base as i64) as i32;
            out.extend_from_slice(&default_delta.to_be_bytes());
            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            for (key, target) in pairs {
                out.extend_from_slice(&key.to_be_bytes());
                let delta = (resolve(*target)? as i64 - base as i64) as i32;
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Insn::Field { op, .. } => {
            out.push(match op {
                FieldOp::GetStatic => 0xb2,
                FieldOp::PutStatic => 0xb3,
                FieldOp::GetField => 0xb4,
                FieldOp::PutField => 0xb5,
            });
            out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
        }
        Insn::Invoke { kind, .. } => match kind {
            InvokeKind::Virtual | InvokeKind::Special | InvokeKind::Static => {
                out.push(match kind {
                    InvokeKind::Virtual => 0xb6,
                    InvokeKind::Special => 0xb7,
                    _ => 0xb8,
                });
                out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
            }
            InvokeKind::Interface => {
                out.push(0xb9);
                out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
                out.push(operand.interface_count.unwrap());
                out.push(0);
            }
        },
        Insn::InvokeDynamic { .. } => {
            out.push(0xba);
            out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
            out.push(0);
            out.push(0);
        }
        Insn::Type { op, .. } => {
            out.push(match op {
                crate::insn::TypeOp::New => 0xbb,
                crate::insn::TypeOp::ANewArray => 0xbd,
                crate::insn::TypeOp::CheckCast => 0xc0,
                crate::insn::TypeOp::InstanceOf => 0xc1,
            });
            out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
        }
        Insn::NewArray { atype } => {
            out.push(0xbc);
            out.push(*atype);
        }
        Insn::MultiANewArray { dimensions, .. } => {
            out.push(0xc5);
            out.extend_from_slice(&operand.pool_index.unwrap().to_be_bytes());
            out.push(*dimensions);
        }
    }
    Ok(())
}

fn emit_ldc(operand: &Operand, out: &mut Vec<u8>) {
    let index = operand.pool_index.unwrap();
    if operand.wide_const {
        out.push(0x14);
        out.extend_from_slice(&index.to_be_bytes());
    } else if index <= 0xff {
        out.push(0x12);
        out.push(index as u8);
    } else {
        out.push(0x13);
        out.extend_from_slice(&index.to_be_bytes());
    }
}

fn emit_var(op: VarOp, index: u16, out: &mut Vec<u8>) {
    let (base, short_base) = match op {
        VarOp::ILoad => (0x15, Some(0x1a)),
        VarOp::LLoad => (0x16, Some(0x1e)),
        VarOp::FLoad => (0x17, Some(0x22)),
        VarOp::DLoad => (0x18, Some(0x26)),
        VarOp::ALoad => (0x19, Some(0x2a)),
        VarOp::IStore => (0x36, Some(0x3b)),
        VarOp::LStore => (0x37, Some(0x3f)),
        VarOp::FStore => (0x38, Some(0x43)),
        VarOp::DStore => (0x39, Some(0x47)),
        VarOp::AStore => (0x3a, Some(0x4b)),
        VarOp::Ret => (0xa9, None),
    };
    if index > 0xff {
        out.push(0xc4);
        out.push(base);
        out.extend_from_slice(&index.to_be_bytes());
    } else if index <= 3 && short_base.is_some() {
        out.push(short_base.unwrap() + index as u8);
    } else {
        out.push(base);
        out.push(index as u8);
    }
}

fn branch_byte(op: BranchOp) -> u8 {
    match op {
        BranchOp::IfEq => 0x99,
        BranchOp::IfNe => 0x9a,
        BranchOp::IfLt => 0x9b,
        BranchOp::IfGe => 0x9c,
        BranchOp::IfGt => 0x9d,
        BranchOp::IfLe => 0x9e,
        BranchOp::IfICmpEq => 0x9f,
        BranchOp::IfICmpNe => 0xa0,
        BranchOp::IfICmpLt => 0xa1,
        BranchOp::IfICmpGe => 0xa2,
        BranchOp::IfICmpGt => 0xa3,
        BranchOp::IfICmpLe => 0xa4,
        BranchOp::IfACmpEq => 0xa5,
        BranchOp::IfACmpNe => 0xa6,
        BranchOp::Goto => 0xa7,
        BranchOp::Jsr => 0xa8,
        BranchOp::IfNull => 0xc6,
        BranchOp::IfNonNull => 0xc7,
    }
}
