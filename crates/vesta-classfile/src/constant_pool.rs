use crate::constant::{Const, HandleKind, MethodHandleConst};
use crate::error::{Error, Result};
use crate::mutf8;
use crate::reader::Reader;

#[derive(Debug, Clone)]
pub enum CpInfo {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType { descriptor_index: u16 },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl CpInfo {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CpInfo::Utf8(_) => "Utf8",
            CpInfo::Integer(_) => "Integer",
            CpInfo::Float(_) => "Float",
            CpInfo::Long(_) => "Long",
            CpInfo::Double(_) => "Double",
            CpInfo::Class { .. } => "Class",
            CpInfo::String { .. } => "String",
            CpInfo::Fieldref { .. } => "Fieldref",
            CpInfo::Methodref { .. } => "Methodref",
            CpInfo::InterfaceMethodref { .. } => "InterfaceMethodref",
            CpInfo::NameAndType { .. } => "NameAndType",
            CpInfo::MethodHandle { .. } => "MethodHandle",
            CpInfo::MethodType { .. } => "MethodType",
            CpInfo::Dynamic { .. } => "Dynamic",
            CpInfo::InvokeDynamic { .. } => "InvokeDynamic",
            CpInfo::Module { .. } => "Module",
            CpInfo::Package { .. } => "Package",
        }
    }
}

/// A member reference resolved out of the pool: `(owner, name, descriptor)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Option<CpInfo>>,
}

impl ConstantPool {
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        if count == 0 {
            return Err(Error::Other("constant_pool_count must be >= 1"));
        }

        let mut entries = vec![None; count];
        let mut i = 1usize;
        while i < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    CpInfo::Utf8(mutf8::decode(bytes)?)
                }
                3 => CpInfo::Integer(reader.read_i4()?),
                4 => {
                    let bits = reader.read_u4()?;
                    CpInfo::Float(f32::from_bits(bits))
                }
                5 => CpInfo::Long(reader.read_i8()?),
                6 => {
                    let bits = reader.read_i8()? as u64;
                    CpInfo::Double(f64::from_bits(bits))
                }
                7 => CpInfo::Class {
                    name_index: reader.read_u2()?,
                },
                8 => CpInfo::String {
                    string_index: reader.read_u2()?,
                },
                9 => CpInfo::Fieldref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => CpInfo::Methodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => CpInfo::InterfaceMethodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => CpInfo::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => CpInfo::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => CpInfo::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => CpInfo::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                18 => CpInfo::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => CpInfo::Module {
                    name_index: reader.read_u2()?,
                },
                20 => CpInfo::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };

            entries[i] = Some(entry);

            // Long/Double take up two slots.
            match entries[i].as_ref().unwrap() {
                CpInfo::Long(_) | CpInfo::Double(_) => {
                    if i + 1 >= count {
                        return Err(Error::Other("malformed constant pool"));
                    }
                    i += 2;
                }
                _ => i += 1,
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, index: u16) -> Result<&CpInfo> {
        let idx = index as usize;
        if idx == 0 || idx >= self.entries.len() {
            return Err(Error::InvalidConstantPoolIndex(index));
        }
        self.entries[idx]
            .as_ref()
            .ok_or(Error::InvalidConstantPoolIndex(index))
    }

    pub fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            CpInfo::Utf8(s) => Ok(s.as_str()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Utf8",
                found: other.kind(),
            }),
        }
    }

    pub fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::Class { name_index } => Ok(self.get_utf8(*name_index)?.to_string()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Class",
                found: other.kind(),
            }),
        }
    }

    pub fn get_name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            CpInfo::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.get_utf8(*name_index)?.to_string(),
                self.get_utf8(*descriptor_index)?.to_string(),
            )),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "NameAndType",
                found: other.kind(),
            }),
        }
    }

    /// Resolve a `Fieldref`, `Methodref` or `InterfaceMethodref` entry.
    pub fn get_member_ref(&self, index: u16) -> Result<PoolMemberRef> {
        let (class_index, nat_index, is_interface) = match self.get(index)? {
            CpInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
            | CpInfo::Methodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            CpInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            other => {
                return Err(Error::ConstantPoolTypeMismatch {
                    index,
                    expected: "Fieldref/Methodref",
                    found: other.kind(),
                })
            }
        };
        let owner = self.get_class_name(class_index)?;
        let (name, descriptor) = self.get_name_and_type(nat_index)?;
        Ok(PoolMemberRef {
            owner,
            name,
            descriptor,
            is_interface,
        })
    }

    pub fn get_method_handle(&self, index: u16) -> Result<MethodHandleConst> {
        match self.get(index)? {
            CpInfo::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                let member = self.get_member_ref(*reference_index)?;
                Ok(MethodHandleConst {
                    kind: HandleKind::from_byte(*reference_kind)?,
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    is_interface: member.is_interface,
                })
            }
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "MethodHandle",
                found: other.kind(),
            }),
        }
    }

    pub fn get_string_constant(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::String { string_index } => Ok(self.get_utf8(*string_index)?.to_string()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "String",
                found: other.kind(),
            }),
        }
    }

    /// Lift a loadable pool entry into a self-contained [`Const`].
    ///
    /// `Dynamic` entries need the parsed `BootstrapMethods` attribute and are
    /// resolved by the caller; this returns the `(bootstrap index, name,
    /// descriptor)` triple for them via [`Error::Other`]-free means, so they
    /// are handled in `code.rs` where the bootstrap table is in scope.
    pub fn get_loadable(&self, index: u16) -> Result<LoadableConst> {
        Ok(match self.get(index)? {
            CpInfo::Integer(v) => LoadableConst::Resolved(Const::Integer(*v)),
            CpInfo::Float(v) => LoadableConst::Resolved(Const::Float(*v)),
            CpInfo::Long(v) => LoadableConst::Resolved(Const::Long(*v)),
            CpInfo::Double(v) => LoadableConst::Resolved(Const::Double(*v)),
            CpInfo::String { string_index } => {
                LoadableConst::Resolved(Const::String(self.get_utf8(*string_index)?.to_string()))
            }
            CpInfo::Class { name_index } => {
                LoadableConst::Resolved(Const::Class(self.get_utf8(*name_index)?.to_string()))
            }
            CpInfo::MethodType { descriptor_index } => LoadableConst::Resolved(Const::MethodType(
                self.get_utf8(*descriptor_index)?.to_string(),
            )),
            CpInfo::MethodHandle { .. } => {
                LoadableConst::Resolved(Const::MethodHandle(self.get_method_handle(index)?))
            }
            CpInfo::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type_index)?;
                LoadableConst::Dynamic {
                    bootstrap_index: *bootstrap_method_attr_index,
                    name,
                    descriptor,
                }
            }
            other => {
                return Err(Error::ConstantPoolTypeMismatch {
                    index,
                    expected: "loadable constant",
                    found: other.kind(),
                })
            }
        })
    }
}

/// Result of [`ConstantPool::get_loadable`].
#[derive(Debug, Clone)]
pub enum LoadableConst {
    Resolved(Const),
    Dynamic {
        bootstrap_index: u16,
        name: String,
        descriptor: String,
    },
}
