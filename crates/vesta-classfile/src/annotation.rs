use crate::constant_pool::{ConstantPool, CpInfo};
use crate::error::{Error, Result};
use crate::pool_builder::PoolBuilder;
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub type_internal_name: Option<String>,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub(crate) fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
        let type_internal_name = descriptor_to_internal_name(&type_descriptor);

        let pair_count = reader.read_u2()? as usize;
        let mut elements = Vec::with_capacity(pair_count);
        for _ in 0..pair_count {
            let name = cp.get_utf8(reader.read_u2()?)?.to_string();
            elements.push((name, ElementValue::parse(reader, cp)?));
        }

        Ok(Self {
            type_descriptor,
            type_internal_name,
            elements,
        })
    }

    pub(crate) fn write(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) -> Result<()> {
        let type_index = pool.utf8(&self.type_descriptor)?;
        out.extend_from_slice(&type_index.to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name, value) in &self.elements {
            let name_index = pool.utf8(name)?;
            out.extend_from_slice(&name_index.to_be_bytes());
            value.write(pool, out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(ConstValue),
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        // Composite tags carry their own payloads; everything else is a
        // single constant-pool reference.
        match reader.read_u1()? {
            b'e' => {
                let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
                let const_name = cp.get_utf8(reader.read_u2()?)?.to_string();
                Ok(ElementValue::Enum {
                    type_descriptor,
                    const_name,
                })
            }
            b'c' => Ok(ElementValue::Class(
                cp.get_utf8(reader.read_u2()?)?.to_string(),
            )),
            b'@' => Ok(ElementValue::Annotation(Box::new(Annotation::parse(
                reader, cp,
            )?))),
            b'[' => {
                let value_count = reader.read_u2()? as usize;
                let mut values = Vec::with_capacity(value_count);
                for _ in 0..value_count {
                    values.push(ElementValue::parse(reader, cp)?);
                }
                Ok(ElementValue::Array(values))
            }
            tag => parse_const_value(tag, reader, cp).map(ElementValue::Const),
        }
    }

    fn write(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ElementValue::Const(cv) => {
                let (tag, index) = match cv {
                    ConstValue::Byte(v) => (b'B', pool.integer(*v as i32)?),
                    ConstValue::Char(v) => (b'C', pool.integer(*v as u32 as i32)?),
                    ConstValue::Short(v) => (b'S', pool.integer(*v as i32)?),
                    ConstValue::Int(v) => (b'I', pool.integer(*v)?),
                    ConstValue::Boolean(v) => (b'Z', pool.integer(i32::from(*v))?),
                    ConstValue::Long(v) => (b'J', pool.long(*v)?),
                    ConstValue::Float(v) => (b'F', pool.float(*v)?),
                    ConstValue::Double(v) => (b'D', pool.double(*v)?),
                    ConstValue::String(v) => (b's', pool.utf8(v)?),
                };
                out.push(tag);
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Enum {
                type_descriptor,
                const_name,
            } => {
                out.push(b'e');
                let type_index = pool.utf8(type_descriptor)?;
                let name_index = pool.utf8(const_name)?;
                out.extend_from_slice(&type_index.to_be_bytes());
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            ElementValue::Class(descriptor) => {
                out.push(b'c');
                let index = pool.utf8(descriptor)?;
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(pool, out)?;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.write(pool, out)?;
                }
            }
        }
        Ok(())
    }
}

/// Decode a constant-valued element: one pool reference whose expected entry
/// kind is picked by the tag.
fn parse_const_value(tag: u8, reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ConstValue> {
    let malformed = Error::MalformedAttribute("RuntimeVisibleAnnotations");
    let index = reader.read_u2()?;
    match (tag, cp.get(index)?) {
        (b'B', CpInfo::Integer(v)) => Ok(ConstValue::Byte(*v as i8)),
        (b'C', CpInfo::Integer(v)) => {
            char::from_u32(*v as u32).map(ConstValue::Char).ok_or(malformed)
        }
        (b'S', CpInfo::Integer(v)) => Ok(ConstValue::Short(*v as i16)),
        (b'Z', CpInfo::Integer(v)) => Ok(ConstValue::Boolean(*v != 0)),
        (b'I', CpInfo::Integer(v)) => Ok(ConstValue::Int(*v)),
        (b'J', CpInfo::Long(v)) => Ok(ConstValue::Long(*v)),
        (b'F', CpInfo::Float(v)) => Ok(ConstValue::Float(*v)),
        (b'D', CpInfo::Double(v)) => Ok(ConstValue::Double(*v)),
        // The attribute format wants a Utf8 entry here, but String entries
        // occur in the wild; accept either.
        (b's', CpInfo::Utf8(s)) => Ok(ConstValue::String(s.clone())),
        (b's', CpInfo::String { .. }) => {
            Ok(ConstValue::String(cp.get_string_constant(index)?))
        }
        _ => Err(malformed),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

/// `La/b/C;` -> `a/b/C`; anything else (primitives, arrays) is `None`.
pub fn descriptor_to_internal_name(desc: &str) -> Option<String> {
    let inner = desc.strip_prefix('L')?.strip_suffix(';')?;
    Some(inner.to_string())
}
