use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// The descriptor tag for this type, if `tag` names one.
    pub fn from_tag(tag: u8) -> Option<BaseType> {
        Some(match tag {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }

    /// Stack slots the type occupies (2 for long/double).
    pub fn slots(self) -> u8 {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn slots(&self) -> u8 {
        match self {
            FieldType::Base(base) => base.slots(),
            _ => 1,
        }
    }

    /// The unqualified source-level name, e.g. `Object[]` or `int`.
    ///
    /// Used when formatting rule violation messages.
    pub fn simple_name(&self) -> String {
        match self {
            FieldType::Base(base) => base.keyword().to_string(),
            FieldType::Object(name) => name
                .rsplit('/')
                .next()
                .unwrap_or(name)
                .replace('$', ".")
                .to_string(),
            FieldType::Array(component) => format!("{}[]", component.simple_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(desc)?;
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    if !desc.starts_with('(') {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    let mut idx = 1usize;
    let mut params = Vec::new();
    loop {
        if idx >= desc.len() {
            return Err(Error::InvalidDescriptor(desc.to_string()));
        }
        if desc.as_bytes()[idx] == b')' {
            idx += 1;
            break;
        }
        let (param, remaining) = parse_field_type(&desc[idx..])?;
        idx = desc.len() - remaining.len();
        params.push(param);
    }

    let return_part = &desc[idx..];
    let (return_type, rest) = if let Some(rest) = return_part.strip_prefix('V') {
        (ReturnType::Void, rest)
    } else {
        let (ty, rest) = parse_field_type(return_part)?;
        (ReturnType::Type(ty), rest)
    };
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

/// Parse one type token off the front of `input`, returning it and whatever
/// follows. Array dimensions are counted up front and wrapped around the
/// element type at the end, so the token is scanned in a single pass.
fn parse_field_type(input: &str) -> Result<(FieldType, &str)> {
    let bad = || Error::InvalidDescriptor(input.to_string());

    let mut dimensions = 0usize;
    let tokens = input.as_bytes();
    while tokens.get(dimensions) == Some(&b'[') {
        dimensions += 1;
    }

    let element = &input[dimensions..];
    let (mut parsed, rest) = match element.as_bytes().first() {
        Some(&b'L') => {
            let semi = element.find(';').ok_or_else(bad)?;
            (
                FieldType::Object(element[1..semi].to_string()),
                &element[semi + 1..],
            )
        }
        Some(&tag) => {
            let base = BaseType::from_tag(tag).ok_or_else(bad)?;
            (FieldType::Base(base), &element[1..])
        }
        None => return Err(bad()),
    };

    for _ in 0..dimensions {
        parsed = FieldType::Array(Box::new(parsed));
    }
    Ok((parsed, rest))
}

/// The part of a method descriptor after the closing parenthesis.
pub fn return_descriptor(desc: &str) -> &str {
    match desc.rfind(')') {
        Some(idx) => &desc[idx + 1..],
        None => desc,
    }
}

/// Stack slot widths of the parameters of a method descriptor, in order.
pub fn parameter_slots(desc: &str) -> Result<Vec<u8>> {
    let parsed = parse_method_descriptor(desc)?;
    Ok(parsed.params.iter().map(FieldType::slots).collect())
}

/// Rewrite every object type name in a field or method descriptor.
///
/// Works by scanning rather than parsing, so it accepts both descriptor
/// kinds; array brackets and primitives pass through untouched.
pub fn rewrite_descriptor(desc: &str, rename: &mut dyn FnMut(&str) -> String) -> Result<String> {
    let mut out = String::with_capacity(desc.len());
    let bytes = desc.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == 'L' {
            let end = desc[i..]
                .find(';')
                .map(|off| i + off)
                .ok_or_else(|| Error::InvalidDescriptor(desc.to_string()))?;
            out.push('L');
            out.push_str(&rename(&desc[i + 1..end]));
            out.push(';');
            i = end + 1;
        } else {
            out.push(c);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_descriptor_primitives_and_arrays() {
        assert_eq!(
            parse_field_descriptor("I").unwrap(),
            FieldType::Base(BaseType::Int)
        );
        assert_eq!(
            parse_field_descriptor("[[Ljava/lang/String;").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                "java/lang/String".to_string()
            )))))
        );
    }

    #[test]
    fn parse_method_descriptor_basic() {
        let desc = parse_method_descriptor("(ILjava/lang/String;)[I").unwrap();
        assert_eq!(
            desc.params,
            vec![
                FieldType::Base(BaseType::Int),
                FieldType::Object("java/lang/String".to_string())
            ]
        );
        assert_eq!(
            desc.return_type,
            ReturnType::Type(FieldType::Array(Box::new(FieldType::Base(BaseType::Int))))
        );
    }

    #[test]
    fn simple_names_for_messages() {
        assert_eq!(
            parse_field_descriptor("[Ljava/lang/Object;")
                .unwrap()
                .simple_name(),
            "Object[]"
        );
        assert_eq!(parse_field_descriptor("J").unwrap().simple_name(), "long");
    }

    #[test]
    fn rewrite_descriptor_renames_every_object_type() {
        let rewritten = rewrite_descriptor("(JLa/B;[[Lc/D;)La/B;", &mut |name| {
            format!("sandbox/{name}")
        })
        .unwrap();
        assert_eq!(rewritten, "(JLsandbox/a/B;[[Lsandbox/c/D;)Lsandbox/a/B;");
    }

    #[test]
    fn parameter_slots_count_wide_types() {
        assert_eq!(parameter_slots("(JILjava/lang/String;D)V").unwrap(), vec![2, 1, 1, 2]);
    }
}
