//! Decoding of `Code` attribute bodies into the symbolic instruction model.

use std::collections::{BTreeSet, HashMap};

use crate::constant::{BootstrapMethod, Const};
use crate::constant_pool::{ConstantPool, LoadableConst};
use crate::error::{Error, Result};
use crate::insn::{BranchOp, FieldOp, Insn, InvokeKind, Label, MemberRef, TypeOp, VarOp};
use crate::opcode::Opcode;
use crate::reader::Reader;

/// Exception table entry with symbolic positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// `None` is the catch-all used by `finally` blocks.
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: Option<String>,
}

/// One decoded instruction at its original byte offset, with branch targets
/// still expressed as absolute offsets.
struct Decoded {
    offset: u32,
    insn: Insn,
}

pub(crate) fn decode_code(
    code: &[u8],
    cp: &ConstantPool,
    bootstraps: &[BootstrapMethod],
    raw_handlers: &[RawHandler],
) -> Result<(Vec<Insn>, Vec<ExceptionHandler>)> {
    let mut reader = Reader::new(code);
    let mut decoded = Vec::new();
    let mut boundaries = BTreeSet::new();
    let mut targets = BTreeSet::new();

    while reader.remaining() > 0 {
        let offset = reader.pos() as u32;
        boundaries.insert(offset);
        let insn = decode_insn(&mut reader, offset, cp, bootstraps, &mut targets)?;
        decoded.push(Decoded { offset, insn });
    }
    let end_offset = code.len() as u32;
    boundaries.insert(end_offset);

    for handler in raw_handlers {
        targets.insert(handler.start_pc as u32);
        targets.insert(handler.end_pc as u32);
        targets.insert(handler.handler_pc as u32);
    }

    for &target in &targets {
        if !boundaries.contains(&target) {
            return Err(Error::InvalidBranchTarget {
                offset: target as i64,
            });
        }
    }

    // Dense label ids in offset order.
    let labels: HashMap<u32, Label> = targets
        .iter()
        .enumerate()
        .map(|(i, &offset)| (offset, Label(i as u32)))
        .collect();

    let mut instructions = Vec::with_capacity(decoded.len() + labels.len());
    for Decoded { offset, insn } in decoded {
        if let Some(&label) = labels.get(&offset) {
            instructions.push(Insn::Label(label));
        }
        instructions.push(relabel(insn, &labels)?);
    }
    if let Some(&label) = labels.get(&end_offset) {
        instructions.push(Insn::Label(label));
    }

    let handlers = raw_handlers
        .iter()
        .map(|h| ExceptionHandler {
            start: labels[&(h.start_pc as u32)],
            end: labels[&(h.end_pc as u32)],
            handler: labels[&(h.handler_pc as u32)],
            catch_type: h.catch_type.clone(),
        })
        .collect();

    Ok((instructions, handlers))
}

/// Replace offset-valued pseudo labels with their dense ids.
fn relabel(insn: Insn, labels: &HashMap<u32, Label>) -> Result<Insn> {
    let lookup = |label: Label| -> Result<Label> {
        labels
            .get(&label.0)
            .copied()
            .ok_or(Error::InvalidBranchTarget {
                offset: label.0 as i64,
            })
    };
    Ok(match insn {
        Insn::Branch { op, target } => Insn::Branch {
            op,
            target: lookup(target)?,
        },
        Insn::TableSwitch {
            default,
            low,
            high,
            targets,
        } => Insn::TableSwitch {
            default: lookup(default)?,
            low,
            high,
            targets: targets
                .into_iter()
                .map(lookup)
                .collect::<Result<Vec<_>>>()?,
        },
        Insn::LookupSwitch { default, pairs } => Insn::LookupSwitch {
            default: lookup(default)?,
            pairs: pairs
                .into_iter()
                .map(|(key, target)| Ok((key, lookup(target)?)))
                .collect::<Result<Vec<_>>>()?,
        },
        other => other,
    })
}

fn branch_target(base: u32, offset: i64, targets: &mut BTreeSet<u32>) -> Result<Label> {
    let target = base as i64 + offset;
    if target < 0 || target > u32::MAX as i64 {
        return Err(Error::InvalidBranchTarget { offset: target });
    }
    targets.insert(target as u32);
    Ok(Label(target as u32))
}

fn resolve_constant(
    cp: &ConstantPool,
    bootstraps: &[BootstrapMethod],
    index: u16,
) -> Result<Const> {
    match cp.get_loadable(index)? {
        LoadableConst::Resolved(value) => Ok(value),
        LoadableConst::Dynamic {
            bootstrap_index,
            name,
            descriptor,
        } => {
            let bootstrap = bootstraps
                .get(bootstrap_index as usize)
                .cloned()
                .ok_or(Error::MalformedAttribute("BootstrapMethods"))?;
            Ok(Const::Dynamic(Box::new(crate::constant::DynamicConst {
                name,
                descriptor,
                bootstrap,
            })))
        }
    }
}

fn decode_insn(
    reader: &mut Reader<'_>,
    offset: u32,
    cp: &ConstantPool,
    bootstraps: &[BootstrapMethod],
    targets: &mut BTreeSet<u32>,
) -> Result<Insn> {
    let opcode = reader.read_u1()?;
    let insn = match opcode {
        0x10 => Insn::Push(reader.read_i1()? as i32),
        0x11 => Insn::Push(reader.read_i2()? as i32),
        0x12 => {
            let index = reader.read_u1()? as u16;
            Insn::Ldc(resolve_constant(cp, bootstraps, index)?)
        }
        0x13 | 0x14 => {
            let index = reader.read_u2()?;
            Insn::Ldc(resolve_constant(cp, bootstraps, index)?)
        }
        0x15..=0x19 => Insn::Var {
            op: load_op(opcode - 0x15),
            index: reader.read_u1()? as u16,
        },
        0x1a..=0x2d => {
            let rel = opcode - 0x1a;
            Insn::Var {
                op: load_op(rel / 4),
                index: (rel % 4) as u16,
            }
        }
        0x36..=0x3a => Insn::Var {
            op: store_op(opcode - 0x36),
            index: reader.read_u1()? as u16,
        },
        0x3b..=0x4e => {
            let rel = opcode - 0x3b;
            Insn::Var {
                op: store_op(rel / 4),
                index: (rel % 4) as u16,
            }
        }
        0x84 => Insn::Iinc {
            index: reader.read_u1()? as u16,
            delta: reader.read_i1()? as i16,
        },
        0x99..=0xa8 | 0xc6 | 0xc7 => {
            let op = branch_op(opcode);
            let target = branch_target(offset, reader.read_i2()? as i64, targets)?;
            Insn::Branch { op, target }
        }
        0xc8 | 0xc9 => {
            let op = if opcode == 0xc8 {
                BranchOp::Goto
            } else {
                BranchOp::Jsr
            };
            let target = branch_target(offset, reader.read_i4()? as i64, targets)?;
            Insn::Branch { op, target }
        }
        0xa9 => Insn::Var {
            op: VarOp::Ret,
            index: reader.read_u1()? as u16,
        },
        0xaa => {
            let padding = (4 - reader.pos() % 4) % 4;
            reader.skip(padding)?;
            let default = branch_target(offset, reader.read_i4()? as i64, targets)?;
            let low = reader.read_i4()?;
            let high = reader.read_i4()?;
            if high < low {
                return Err(Error::Other("tableswitch high < low"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut switch_targets = Vec::with_capacity(count);
            for _ in 0..count {
                switch_targets.push(branch_target(offset, reader.read_i4()? as i64, targets)?);
            }
            Insn::TableSwitch {
                default,
                low,
                high,
                targets: switch_targets,
            }
        }
        0xab => {
            let padding = (4 - reader.pos() % 4) % 4;
            reader.skip(padding)?;
            let default = branch_target(offset, reader.read_i4()? as i64, targets)?;
            let count = reader.read_i4()?;
            if count < 0 {
                return Err(Error::Other("lookupswitch npairs < 0"));
            }
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = reader.read_i4()?;
                let target = branch_target(offset, reader.read_i4()? as i64, targets)?;
                pairs.push((key, target));
            }
            Insn::LookupSwitch { default, pairs }
        }
        0xb2..=0xb5 => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            let op = match opcode {
                0xb2 => FieldOp::GetStatic,
                0xb3 => FieldOp::PutStatic,
                0xb4 => FieldOp::GetField,
                _ => FieldOp::PutField,
            };
            Insn::Field {
                op,
                member: MemberRef::new(member.owner, member.name, member.descriptor),
            }
        }
        0xb6..=0xb8 => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            let kind = match opcode {
                0xb6 => InvokeKind::Virtual,
                0xb7 => InvokeKind::Special,
                _ => InvokeKind::Static,
            };
            Insn::Invoke {
                kind,
                is_interface: member.is_interface,
                member: MemberRef::new(member.owner, member.name, member.descriptor),
            }
        }
        0xb9 => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            reader.skip(2)?; // count + zero byte, both recomputed on write
            Insn::Invoke {
                kind: InvokeKind::Interface,
                is_interface: true,
                member: MemberRef::new(member.owner, member.name, member.descriptor),
            }
        }
        0xba => {
            let index = reader.read_u2()?;
            reader.skip(2)?;
            let (bootstrap_index, name, descriptor) = match cp.get(index)? {
                crate::constant_pool::CpInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    let (name, descriptor) = cp.get_name_and_type(*name_and_type_index)?;
                    (*bootstrap_method_attr_index, name, descriptor)
                }
                other => {
                    return Err(Error::ConstantPoolTypeMismatch {
                        index,
                        expected: "InvokeDynamic",
                        found: other.kind(),
                    })
                }
            };
            let bootstrap = bootstraps
                .get(bootstrap_index as usize)
                .cloned()
                .ok_or(Error::MalformedAttribute("BootstrapMethods"))?;
            Insn::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
            }
        }
        0xbb => Insn::Type {
            op: TypeOp::New,
            name: cp.get_class_name(reader.read_u2()?)?,
        },
        0xbc => Insn::NewArray {
            atype: reader.read_u1()?,
        },
        0xbd => Insn::Type {
            op: TypeOp::ANewArray,
            name: cp.get_class_name(reader.read_u2()?)?,
        },
        0xc0 => Insn::Type {
            op: TypeOp::CheckCast,
            name: cp.get_class_name(reader.read_u2()?)?,
        },
        0xc1 => Insn::Type {
            op: TypeOp::InstanceOf,
            name: cp.get_class_name(reader.read_u2()?)?,
        },
        0xc4 => {
            let wide_opcode = reader.read_u1()?;
            match wide_opcode {
                0x15..=0x19 => Insn::Var {
                    op: load_op(wide_opcode - 0x15),
                    index: reader.read_u2()?,
                },
                0x36..=0x3a => Insn::Var {
                    op: store_op(wide_opcode - 0x36),
                    index: reader.read_u2()?,
                },
                0xa9 => Insn::Var {
                    op: VarOp::Ret,
                    index: reader.read_u2()?,
                },
                0x84 => Insn::Iinc {
                    index: reader.read_u2()?,
                    delta: reader.read_i2()?,
                },
                other => {
                    return Err(Error::UnknownOpcode {
                        opcode: other,
                        offset: offset as usize,
                    })
                }
            }
        }
        0xc5 => Insn::MultiANewArray {
            descriptor: cp.get_class_name(reader.read_u2()?)?,
            dimensions: reader.read_u1()?,
        },
        other => match Opcode::from_byte(other) {
            Some(simple) => Insn::Simple(simple),
            None => {
                return Err(Error::UnknownOpcode {
                    opcode: other,
                    offset: offset as usize,
                })
            }
        },
    };
    Ok(insn)
}

fn load_op(index: u8) -> VarOp {
    match index {
        0 => VarOp::ILoad,
        1 => VarOp::LLoad,
        2 => VarOp::FLoad,
        3 => VarOp::DLoad,
        _ => VarOp::ALoad,
    }
}

fn store_op(index: u8) -> VarOp {
    match index {
        0 => VarOp::IStore,
        1 => VarOp::LStore,
        2 => VarOp::FStore,
        3 => VarOp::DStore,
        _ => VarOp::AStore,
    }
}

fn branch_op(opcode: u8) -> BranchOp {
    match opcode {
        0x99 => BranchOp::IfEq,
        0x9a => BranchOp::IfNe,
        0x9b => BranchOp::IfLt,
        0x9c => BranchOp::IfGe,
        0x9d => BranchOp::IfGt,
        0x9e => BranchOp::IfLe,
        0x9f => BranchOp::IfICmpEq,
        0xa0 => BranchOp::IfICmpNe,
        0xa1 => BranchOp::IfICmpLt,
        0xa2 => BranchOp::IfICmpGe,
        0xa3 => BranchOp::IfICmpGt,
        0xa4 => BranchOp::IfICmpLe,
        0xa5 => BranchOp::IfACmpEq,
        0xa6 => BranchOp::IfACmpNe,
        0xa7 => BranchOp::Goto,
        0xa8 => BranchOp::Jsr,
        0xc6 => BranchOp::IfNull,
        _ => BranchOp::IfNonNull,
    }
}
