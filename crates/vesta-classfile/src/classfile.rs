use crate::annotation::Annotation;
use crate::code::{decode_code, ExceptionHandler, RawHandler};
use crate::constant::{BootstrapMethod, Const};
use crate::constant_pool::{ConstantPool, LoadableConst};
use crate::error::{Error, Result};
use crate::insn::Insn;
use crate::reader::Reader;

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub source_file: Option<String>,
    pub inner_classes: Vec<InnerClass>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub constant_value: Option<Const>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Checked exception types from the `Exceptions` attribute.
    pub exceptions: Vec<String>,
    pub code: Option<Code>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub handlers: Vec<ExceptionHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub inner: String,
    pub outer: Option<String>,
    pub inner_name: Option<String>,
    pub access_flags: u16,
}

/// Class shape without member bodies, for cheap hierarchy walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub major_version: u16,
    pub access_flags: u16,
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
}

/// Parse only up to the interface list.
pub fn parse_header(bytes: &[u8]) -> Result<ClassHeader> {
    let mut reader = Reader::new(bytes);
    let magic = reader.read_u4()?;
    if magic != 0xCAFEBABE {
        return Err(Error::InvalidMagic(magic));
    }
    let _minor = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    let cp = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let name = cp.get_class_name(reader.read_u2()?)?;
    let super_index = reader.read_u2()?;
    let super_class = if super_index == 0 {
        None
    } else {
        Some(cp.get_class_name(super_index)?)
    };
    let interfaces_count = reader.read_u2()? as usize;
    let mut interfaces = Vec::with_capacity(interfaces_count);
    for _ in 0..interfaces_count {
        interfaces.push(cp.get_class_name(reader.read_u2()?)?);
    }

    Ok(ClassHeader {
        major_version,
        access_flags,
        name,
        super_class,
        interfaces,
    })
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_field(&mut reader, &cp)?);
        }

        // Method bodies reference the BootstrapMethods class attribute, which
        // is parsed after them; retain raw code until it is available.
        let methods_count = reader.read_u2()? as usize;
        let mut raw_methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            raw_methods.push(parse_method(&mut reader, &cp)?);
        }

        let class_attrs = parse_class_attributes(&mut reader, &cp)?;
        reader.ensure_empty()?;

        let bootstraps = resolve_bootstraps(&cp, &class_attrs.raw_bootstraps)?;

        let methods = raw_methods
            .into_iter()
            .map(|raw| {
                let code = match raw.code {
                    Some(rc) => {
                        let (instructions, handlers) =
                            decode_code(&rc.code, &cp, &bootstraps, &rc.handlers)?;
                        Some(Code {
                            max_stack: rc.max_stack,
                            max_locals: rc.max_locals,
                            instructions,
                            handlers,
                        })
                    }
                    None => None,
                };
                Ok(Method {
                    access_flags: raw.access_flags,
                    name: raw.name,
                    descriptor: raw.descriptor,
                    exceptions: raw.exceptions,
                    code,
                    annotations: raw.annotations,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            source_file: class_attrs.source_file,
            inner_classes: class_attrs.inner_classes,
            annotations: class_attrs.annotations,
        })
    }
}

fn parse_field(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Field> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut constant_value = None;
    let mut annotations = Vec::new();

    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let attr_name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(attr_name_index)?;
        let mut sub = Reader::new(info);
        match attr_name {
            "ConstantValue" => {
                let index = sub.read_u2()?;
                match cp.get_loadable(index)? {
                    LoadableConst::Resolved(value) => constant_value = Some(value),
                    LoadableConst::Dynamic { .. } => {
                        return Err(Error::MalformedAttribute("ConstantValue"))
                    }
                }
                sub.ensure_empty()?;
            }
            "RuntimeVisibleAnnotations" => {
                annotations.extend(parse_annotations(&mut sub, cp)?);
            }
            _ => {}
        }
    }

    Ok(Field {
        access_flags,
        name,
        descriptor,
        constant_value,
        annotations,
    })
}

struct RawCode {
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    handlers: Vec<RawHandler>,
}

struct RawMethod {
    access_flags: u16,
    name: String,
    descriptor: String,
    exceptions: Vec<String>,
    code: Option<RawCode>,
    annotations: Vec<Annotation>,
}

fn parse_method(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<RawMethod> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut exceptions = Vec::new();
    let mut code = None;
    let mut annotations = Vec::new();

    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let attr_name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(attr_name_index)?;
        let mut sub = Reader::new(info);
        match attr_name {
            "Code" => {
                let max_stack = sub.read_u2()?;
                let max_locals = sub.read_u2()?;
                let code_length = sub.read_u4()? as usize;
                let code_bytes = sub.read_bytes(code_length)?.to_vec();
                let table_length = sub.read_u2()? as usize;
                let mut handlers = Vec::with_capacity(table_length);
                for _ in 0..table_length {
                    let start_pc = sub.read_u2()?;
                    let end_pc = sub.read_u2()?;
                    let handler_pc = sub.read_u2()?;
                    let catch_index = sub.read_u2()?;
                    let catch_type = if catch_index == 0 {
                        None
                    } else {
                        Some(cp.get_class_name(catch_index)?)
                    };
                    handlers.push(RawHandler {
                        start_pc,
                        end_pc,
                        handler_pc,
                        catch_type,
                    });
                }
                // Nested attributes (StackMapTable, line numbers, local
                // variable tables) are not carried through a rewrite.
                code = Some(RawCode {
                    max_stack,
                    max_locals,
                    code: code_bytes,
                    handlers,
                });
            }
            "Exceptions" => {
                let count = sub.read_u2()? as usize;
                for _ in 0..count {
                    exceptions.push(cp.get_class_name(sub.read_u2()?)?);
                }
                sub.ensure_empty()?;
            }
            "RuntimeVisibleAnnotations" => {
                annotations.extend(parse_annotations(&mut sub, cp)?);
            }
            _ => {}
        }
    }

    Ok(RawMethod {
        access_flags,
        name,
        descriptor,
        exceptions,
        code,
        annotations,
    })
}

#[derive(Default)]
struct ClassAttributes {
    source_file: Option<String>,
    inner_classes: Vec<InnerClass>,
    annotations: Vec<Annotation>,
    raw_bootstraps: Vec<(u16, Vec<u16>)>,
}

fn parse_class_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassAttributes> {
    let mut parsed = ClassAttributes::default();
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let attr_name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(attr_name_index)?;
        let mut sub = Reader::new(info);
        match attr_name {
            "SourceFile" => {
                parsed.source_file = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty()?;
            }
            "InnerClasses" => {
                let count = sub.read_u2()? as usize;
                for _ in 0..count {
                    let inner_index = sub.read_u2()?;
                    let outer_index = sub.read_u2()?;
                    let name_index = sub.read_u2()?;
                    let access_flags = sub.read_u2()?;
                    parsed.inner_classes.push(InnerClass {
                        inner: cp.get_class_name(inner_index)?,
                        outer: if outer_index == 0 {
                            None
                        } else {
                            Some(cp.get_class_name(outer_index)?)
                        },
                        inner_name: if name_index == 0 {
                            None
                        } else {
                            Some(cp.get_utf8(name_index)?.to_string())
                        },
                        access_flags,
                    });
                }
                sub.ensure_empty()?;
            }
            "RuntimeVisibleAnnotations" => {
                parsed.annotations.extend(parse_annotations(&mut sub, cp)?);
            }
            "BootstrapMethods" => {
                let count = sub.read_u2()? as usize;
                for _ in 0..count {
                    let handle_index = sub.read_u2()?;
                    let arg_count = sub.read_u2()? as usize;
                    let mut args = Vec::with_capacity(arg_count);
                    for _ in 0..arg_count {
                        args.push(sub.read_u2()?);
                    }
                    parsed.raw_bootstraps.push((handle_index, args));
                }
                sub.ensure_empty()?;
            }
            _ => {}
        }
    }
    Ok(parsed)
}

fn parse_annotations(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<Annotation>> {
    let num = reader.read_u2()? as usize;
    let mut annotations = Vec::with_capacity(num);
    for _ in 0..num {
        annotations.push(Annotation::parse(reader, cp)?);
    }
    reader.ensure_empty()?;
    Ok(annotations)
}

/// Resolve raw `BootstrapMethods` rows into self-contained specifiers.
///
/// Condy arguments may reference other bootstrap rows; cycles are rejected.
fn resolve_bootstraps(
    cp: &ConstantPool,
    raw: &[(u16, Vec<u16>)],
) -> Result<Vec<BootstrapMethod>> {
    fn resolve(
        cp: &ConstantPool,
        raw: &[(u16, Vec<u16>)],
        index: usize,
        memo: &mut Vec<Option<BootstrapMethod>>,
        visiting: &mut Vec<bool>,
    ) -> Result<BootstrapMethod> {
        if let Some(done) = &memo[index] {
            return Ok(done.clone());
        }
        if visiting[index] {
            return Err(Error::MalformedAttribute("BootstrapMethods"));
        }
        visiting[index] = true;

        let (handle_index, arg_indices) = &raw[index];
        let handle = cp.get_method_handle(*handle_index)?;
        let mut arguments = Vec::with_capacity(arg_indices.len());
        for &arg in arg_indices {
            let value = match cp.get_loadable(arg)? {
                LoadableConst::Resolved(value) => value,
                LoadableConst::Dynamic {
                    bootstrap_index,
                    name,
                    descriptor,
                } => {
                    let nested_index = bootstrap_index as usize;
                    if nested_index >= raw.len() {
                        return Err(Error::MalformedAttribute("BootstrapMethods"));
                    }
                    let bootstrap = resolve(cp, raw, nested_index, memo, visiting)?;
                    Const::Dynamic(Box::new(crate::constant::DynamicConst {
                        name,
                        descriptor,
                        bootstrap,
                    }))
                }
            };
            arguments.push(value);
        }

        visiting[index] = false;
        let method = BootstrapMethod { handle, arguments };
        memo[index] = Some(method.clone());
        Ok(method)
    }

    let mut memo = vec![None; raw.len()];
    let mut visiting = vec![false; raw.len()];
    (0..raw.len())
        .map(|i| resolve(cp, raw, i, &mut memo, &mut visiting))
        .collect()
}
