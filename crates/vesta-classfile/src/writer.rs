//! Serialization of a [`ClassFile`] against a freshly built constant pool.

use crate::assemble::assemble;
use crate::classfile::{ClassFile, Field, Method};
use crate::error::Result;
use crate::pool_builder::{BootstrapTable, PoolBuilder};

/// Emit a classfile. Constant pool ordering of the original input is not
/// preserved; indices are assigned in first-use order.
pub fn write_class(class: &ClassFile) -> Result<Vec<u8>> {
    let mut pool = PoolBuilder::new();
    let mut bootstraps = BootstrapTable::new();

    let this_index = pool.class(&class.this_class)?;
    let super_index = match &class.super_class {
        Some(name) => pool.class(name)?,
        None => 0,
    };
    let interface_indices = class
        .interfaces
        .iter()
        .map(|name| pool.class(name))
        .collect::<Result<Vec<_>>>()?;

    let field_infos = class
        .fields
        .iter()
        .map(|field| write_field(field, &mut pool, &mut bootstraps))
        .collect::<Result<Vec<_>>>()?;

    let method_infos = class
        .methods
        .iter()
        .map(|method| write_method(method, &mut pool, &mut bootstraps))
        .collect::<Result<Vec<_>>>()?;

    let mut class_attrs: Vec<(u16, Vec<u8>)> = Vec::new();
    if let Some(source_file) = &class.source_file {
        let name = pool.utf8("SourceFile")?;
        let index = pool.utf8(source_file)?;
        class_attrs.push((name, index.to_be_bytes().to_vec()));
    }
    if !class.inner_classes.is_empty() {
        let name = pool.utf8("InnerClasses")?;
        let mut payload = Vec::new();
        payload.extend_from_slice(&(class.inner_classes.len() as u16).to_be_bytes());
        for inner in &class.inner_classes {
            let inner_index = pool.class(&inner.inner)?;
            let outer_index = match &inner.outer {
                Some(outer) => pool.class(outer)?,
                None => 0,
            };
            let name_index = match &inner.inner_name {
                Some(name) => pool.utf8(name)?,
                None => 0,
            };
            payload.extend_from_slice(&inner_index.to_be_bytes());
            payload.extend_from_slice(&outer_index.to_be_bytes());
            payload.extend_from_slice(&name_index.to_be_bytes());
            payload.extend_from_slice(&inner.access_flags.to_be_bytes());
        }
        class_attrs.push((name, payload));
    }
    if !class.annotations.is_empty() {
        class_attrs.push(write_annotations(&class.annotations, &mut pool)?);
    }
    if !bootstraps.is_empty() {
        let name = pool.utf8("BootstrapMethods")?;
        let payload = bootstraps.serialize(&mut pool)?;
        class_attrs.push((name, payload));
    }

    // The pool is complete; lay the file out.
    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    out.extend_from_slice(&class.minor_version.to_be_bytes());
    out.extend_from_slice(&class.major_version.to_be_bytes());
    pool.serialize(&mut out);
    out.extend_from_slice(&class.access_flags.to_be_bytes());
    out.extend_from_slice(&this_index.to_be_bytes());
    out.extend_from_slice(&super_index.to_be_bytes());
    out.extend_from_slice(&(interface_indices.len() as u16).to_be_bytes());
    for index in interface_indices {
        out.extend_from_slice(&index.to_be_bytes());
    }
    out.extend_from_slice(&(field_infos.len() as u16).to_be_bytes());
    for info in field_infos {
        out.extend_from_slice(&info);
    }
    out.extend_from_slice(&(method_infos.len() as u16).to_be_bytes());
    for info in method_infos {
        out.extend_from_slice(&info);
    }
    write_attributes(&class_attrs, &mut out);
    Ok(out)
}

fn write_field(
    field: &Field,
    pool: &mut PoolBuilder,
    bootstraps: &mut BootstrapTable,
) -> Result<Vec<u8>> {
    let name_index = pool.utf8(&field.name)?;
    let descriptor_index = pool.utf8(&field.descriptor)?;

    let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
    if let Some(value) = &field.constant_value {
        let attr_name = pool.utf8("ConstantValue")?;
        let value_index = pool.constant(value, bootstraps)?;
        attrs.push((attr_name, value_index.to_be_bytes().to_vec()));
    }
    if !field.annotations.is_empty() {
        attrs.push(write_annotations(&field.annotations, pool)?);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&field.access_flags.to_be_bytes());
    out.extend_from_slice(&name_index.to_be_bytes());
    out.extend_from_slice(&descriptor_index.to_be_bytes());
    write_attributes(&attrs, &mut out);
    Ok(out)
}

fn write_method(
    method: &Method,
    pool: &mut PoolBuilder,
    bootstraps: &mut BootstrapTable,
) -> Result<Vec<u8>> {
    let name_index = pool.utf8(&method.name)?;
    let descriptor_index = pool.utf8(&method.descriptor)?;

    let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
    if let Some(code) = &method.code {
        let attr_name = pool.utf8("Code")?;
        let assembled = assemble(&code.instructions, &code.handlers, pool, bootstraps)?;
        let mut payload = Vec::new();
        payload.extend_from_slice(&code.max_stack.to_be_bytes());
        payload.extend_from_slice(&code.max_locals.to_be_bytes());
        payload.extend_from_slice(&(assembled.bytes.len() as u32).to_be_bytes());
        payload.extend_from_slice(&assembled.bytes);
        payload.extend_from_slice(&(assembled.handlers.len() as u16).to_be_bytes());
        for (start, end, handler, catch_type) in assembled.handlers {
            payload.extend_from_slice(&start.to_be_bytes());
            payload.extend_from_slice(&end.to_be_bytes());
            payload.extend_from_slice(&handler.to_be_bytes());
            payload.extend_from_slice(&catch_type.to_be_bytes());
        }
        payload.extend_from_slice(&0u16.to_be_bytes()); // no nested attributes
        attrs.push((attr_name, payload));
    }
    if !method.exceptions.is_empty() {
        let attr_name = pool.utf8("Exceptions")?;
        let mut payload = Vec::new();
        payload.extend_from_slice(&(method.exceptions.len() as u16).to_be_bytes());
        for exception in &method.exceptions {
            let index = pool.class(exception)?;
            payload.extend_from_slice(&index.to_be_bytes());
        }
        attrs.push((attr_name, payload));
    }
    if !method.annotations.is_empty() {
        attrs.push(write_annotations(&method.annotations, pool)?);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&method.access_flags.to_be_bytes());
    out.extend_from_slice(&name_index.to_be_bytes());
    out.extend_from_slice(&descriptor_index.to_be_bytes());
    write_attributes(&attrs, &mut out);
    Ok(out)
}

fn write_annotations(
    annotations: &[crate::annotation::Annotation],
    pool: &mut PoolBuilder,
) -> Result<(u16, Vec<u8>)> {
    let name = pool.utf8("RuntimeVisibleAnnotations")?;
    let mut payload = Vec::new();
    payload.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        annotation.write(pool, &mut payload)?;
    }
    Ok((name, payload))
}

fn write_attributes(attrs: &[(u16, Vec<u8>)], out: &mut Vec<u8>) {
    out.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    for (name_index, payload) in attrs {
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
    }
}
