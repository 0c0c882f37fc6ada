//! Type signatures as reported by the target (`I`, `Ljava/lang/String;`,
//! `(I[J)V`, ...).

use crate::error::{JdiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            b'Z' => PrimitiveKind::Boolean,
            b'B' => PrimitiveKind::Byte,
            b'C' => PrimitiveKind::Char,
            b'S' => PrimitiveKind::Short,
            b'I' => PrimitiveKind::Int,
            b'J' => PrimitiveKind::Long,
            b'F' => PrimitiveKind::Float,
            b'D' => PrimitiveKind::Double,
            _ => return None,
        })
    }

    pub fn tag(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveKind),
    /// Internal class name, e.g. `java/lang/String`.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Source-level name, e.g. `java.lang.String[]`.
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Primitive(kind) => kind.name().to_string(),
            FieldType::Object(name) => name.replace('/', "."),
            FieldType::Array(component) => format!("{}[]", component.type_name()),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            FieldType::Primitive(kind) => kind.tag().to_string(),
            FieldType::Object(name) => format!("L{name};"),
            FieldType::Array(component) => format!("[{}", component.signature()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, FieldType::Primitive(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

impl ReturnType {
    pub fn type_name(&self) -> String {
        match self {
            ReturnType::Void => "void".to_string(),
            ReturnType::Type(ty) => ty.type_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

pub fn parse_field_signature(sig: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(sig)?;
    if !rest.is_empty() {
        return Err(JdiError::InvalidSignature(sig.to_string()));
    }
    Ok(ty)
}

/// Accepts any field signature plus `V`.
pub fn parse_type_signature(sig: &str) -> Result<ReturnType> {
    if sig == "V" {
        return Ok(ReturnType::Void);
    }
    parse_field_signature(sig).map(ReturnType::Type)
}

pub fn parse_method_signature(sig: &str) -> Result<MethodSignature> {
    let Some(mut rest) = sig.strip_prefix('(') else {
        return Err(JdiError::InvalidSignature(sig.to_string()));
    };

    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        if rest.is_empty() {
            return Err(JdiError::InvalidSignature(sig.to_string()));
        }
        let (param, after) = parse_field_type(rest)
            .map_err(|_| JdiError::InvalidSignature(sig.to_string()))?;
        params.push(param);
        rest = after;
    }

    let return_type = parse_type_signature(rest)
        .map_err(|_| JdiError::InvalidSignature(sig.to_string()))?;
    Ok(MethodSignature {
        params,
        return_type,
    })
}

/// `Ljava/lang/String;` -> `java.lang.String`; unparseable input is returned
/// unchanged.
pub fn signature_to_type_name(sig: &str) -> String {
    parse_type_signature(sig)
        .map(|ty| ty.type_name())
        .unwrap_or_else(|_| sig.to_string())
}

fn parse_field_type(input: &str) -> Result<(FieldType, &str)> {
    let Some(&first) = input.as_bytes().first() else {
        return Err(JdiError::InvalidSignature(input.to_string()));
    };
    if let Some(kind) = PrimitiveKind::from_tag(first) {
        return Ok((FieldType::Primitive(kind), &input[1..]));
    }
    match first {
        b'L' => match input.find(';') {
            Some(end) if end > 1 => Ok((
                FieldType::Object(input[1..end].to_string()),
                &input[end + 1..],
            )),
            _ => Err(JdiError::InvalidSignature(input.to_string())),
        },
        b'[' => {
            let (component, rest) = parse_field_type(&input[1..])?;
            Ok((FieldType::Array(Box::new(component)), rest))
        }
        _ => Err(JdiError::InvalidSignature(input.to_string())),
    }
}
