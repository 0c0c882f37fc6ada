//! Values read from (or written to) the target.
//!
//! Primitive values are plain scalars. Object references are mirrors: the
//! first access to a detail (a string's characters, a class object's reflected
//! type, ...) goes to the target, and the answer is cached for good. Two threads
//! racing on the first access may both fetch; the payload is immutable, so
//! whichever lands first wins and the other copy is dropped.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{JdiError, Result};
use crate::request::{ObjectTag, Request, TaggedObjectId};
use crate::session::{Mirror, MirrorId, Session, SessionRef};
use crate::signature::{parse_type_signature, signature_to_type_name, FieldType, PrimitiveKind, ReturnType};
use crate::thread::ThreadReference;
use crate::types::ReferenceType;
use crate::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PrimitiveValue::Boolean(v) => write!(f, "{v}"),
            PrimitiveValue::Byte(v) => write!(f, "{v}"),
            PrimitiveValue::Char(v) => match char::from_u32(u32::from(v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            PrimitiveValue::Short(v) => write!(f, "{v}"),
            PrimitiveValue::Int(v) => write!(f, "{v}"),
            PrimitiveValue::Long(v) => write!(f, "{v}"),
            PrimitiveValue::Float(v) => write!(f, "{v}"),
            PrimitiveValue::Double(v) => write!(f, "{v}"),
        }
    }
}

fn in_range(v: f64, min: f64, max: f64) -> bool {
    min <= v && v <= max
}

// 2^63; the first double past `i64::MAX`.
const LONG_LIMIT: f64 = 9_223_372_036_854_775_808.0;

impl PrimitiveValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::Short(_) => PrimitiveKind::Short,
            PrimitiveValue::Int(_) => PrimitiveKind::Int,
            PrimitiveValue::Long(_) => PrimitiveKind::Long,
            PrimitiveValue::Float(_) => PrimitiveKind::Float,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Integral payload widened to `i64`; `None` for boolean and floating kinds.
    fn integral(&self) -> Option<i64> {
        match *self {
            PrimitiveValue::Byte(v) => Some(i64::from(v)),
            PrimitiveValue::Char(v) => Some(i64::from(v)),
            PrimitiveValue::Short(v) => Some(i64::from(v)),
            PrimitiveValue::Int(v) => Some(i64::from(v)),
            PrimitiveValue::Long(v) => Some(v),
            PrimitiveValue::Boolean(_) | PrimitiveValue::Float(_) | PrimitiveValue::Double(_) => {
                None
            }
        }
    }

    // Unchecked accessors. These truncate the way a Java cast does and are
    // meant for display; use the checked family when the result is stored.

    pub fn as_boolean(&self) -> bool {
        match *self {
            PrimitiveValue::Boolean(v) => v,
            PrimitiveValue::Float(v) => v != 0.0,
            PrimitiveValue::Double(v) => v != 0.0,
            _ => self.as_long() != 0,
        }
    }

    pub fn as_byte(&self) -> i8 {
        match *self {
            PrimitiveValue::Float(v) => (v as i32) as i8,
            PrimitiveValue::Double(v) => (v as i32) as i8,
            _ => self.as_long() as i8,
        }
    }

    pub fn as_char(&self) -> u16 {
        match *self {
            PrimitiveValue::Float(v) => (v as i32) as u16,
            PrimitiveValue::Double(v) => (v as i32) as u16,
            _ => self.as_long() as u16,
        }
    }

    pub fn as_short(&self) -> i16 {
        match *self {
            PrimitiveValue::Float(v) => (v as i32) as i16,
            PrimitiveValue::Double(v) => (v as i32) as i16,
            _ => self.as_long() as i16,
        }
    }

    pub fn as_int(&self) -> i32 {
        match *self {
            PrimitiveValue::Float(v) => v as i32,
            PrimitiveValue::Double(v) => v as i32,
            _ => self.as_long() as i32,
        }
    }

    pub fn as_long(&self) -> i64 {
        match *self {
            PrimitiveValue::Boolean(v) => i64::from(v),
            PrimitiveValue::Float(v) => v as i64,
            PrimitiveValue::Double(v) => v as i64,
            _ => self.integral().unwrap_or_default(),
        }
    }

    pub fn as_float(&self) -> f32 {
        match *self {
            PrimitiveValue::Float(v) => v,
            PrimitiveValue::Double(v) => v as f32,
            PrimitiveValue::Long(v) => v as f32,
            _ => self.as_long() as f32,
        }
    }

    pub fn as_double(&self) -> f64 {
        match *self {
            PrimitiveValue::Float(v) => f64::from(v),
            PrimitiveValue::Double(v) => v,
            PrimitiveValue::Long(v) => v as f64,
            _ => self.as_long() as f64,
        }
    }

    /// Unchecked conversion to `target`.
    pub fn cast(&self, target: PrimitiveKind) -> PrimitiveValue {
        match target {
            PrimitiveKind::Boolean => PrimitiveValue::Boolean(self.as_boolean()),
            PrimitiveKind::Byte => PrimitiveValue::Byte(self.as_byte()),
            PrimitiveKind::Char => PrimitiveValue::Char(self.as_char()),
            PrimitiveKind::Short => PrimitiveValue::Short(self.as_short()),
            PrimitiveKind::Int => PrimitiveValue::Int(self.as_int()),
            PrimitiveKind::Long => PrimitiveValue::Long(self.as_long()),
            PrimitiveKind::Float => PrimitiveValue::Float(self.as_float()),
            PrimitiveKind::Double => PrimitiveValue::Double(self.as_double()),
        }
    }

    /// Converts to `target`, failing with [`JdiError::InvalidConversion`] when
    /// magnitude or precision would be lost.
    pub fn checked_cast(&self, target: PrimitiveKind) -> Result<PrimitiveValue> {
        let source = self.kind();
        if source == target {
            return Ok(*self);
        }
        let fits = match (source, target) {
            (_, PrimitiveKind::Boolean) | (PrimitiveKind::Boolean, _) => false,
            (_, PrimitiveKind::Double) => true,
            _ => self.fits(target),
        };
        if fits {
            Ok(self.cast(target))
        } else {
            Err(JdiError::InvalidConversion(format!(
                "{} value {self} cannot be converted to {} without loss",
                source.name(),
                target.name()
            )))
        }
    }

    fn fits(&self, target: PrimitiveKind) -> bool {
        if let Some(wide) = self.integral() {
            return match target {
                PrimitiveKind::Byte => i8::try_from(wide).is_ok(),
                PrimitiveKind::Char => u16::try_from(wide).is_ok(),
                PrimitiveKind::Short => i16::try_from(wide).is_ok(),
                PrimitiveKind::Int => i32::try_from(wide).is_ok(),
                // Round trip through f64 (exact for every f32) into i128 so a
                // rounded-up i64::MAX does not saturate back onto itself.
                PrimitiveKind::Float => f64::from(wide as f32) as i128 == i128::from(wide),
                PrimitiveKind::Long | PrimitiveKind::Double => true,
                PrimitiveKind::Boolean => false,
            };
        }

        let v = self.as_double();
        match target {
            PrimitiveKind::Byte => in_range(v, f64::from(i8::MIN), f64::from(i8::MAX)),
            PrimitiveKind::Char => in_range(v, 0.0, f64::from(u16::MAX)),
            PrimitiveKind::Short => in_range(v, f64::from(i16::MIN), f64::from(i16::MAX)),
            PrimitiveKind::Int => f64::from(v as i32) == v,
            PrimitiveKind::Long => (-LONG_LIMIT..LONG_LIMIT).contains(&v) && (v as i64) as f64 == v,
            PrimitiveKind::Float => v.is_nan() || f64::from(v as f32) == v,
            PrimitiveKind::Double => true,
            PrimitiveKind::Boolean => false,
        }
    }

    pub fn checked_boolean(&self) -> Result<bool> {
        self.checked_cast(PrimitiveKind::Boolean).map(|v| v.as_boolean())
    }

    pub fn checked_byte(&self) -> Result<i8> {
        self.checked_cast(PrimitiveKind::Byte).map(|v| v.as_byte())
    }

    pub fn checked_char(&self) -> Result<u16> {
        self.checked_cast(PrimitiveKind::Char).map(|v| v.as_char())
    }

    pub fn checked_short(&self) -> Result<i16> {
        self.checked_cast(PrimitiveKind::Short).map(|v| v.as_short())
    }

    pub fn checked_int(&self) -> Result<i32> {
        self.checked_cast(PrimitiveKind::Int).map(|v| v.as_int())
    }

    pub fn checked_long(&self) -> Result<i64> {
        self.checked_cast(PrimitiveKind::Long).map(|v| v.as_long())
    }

    pub fn checked_float(&self) -> Result<f32> {
        self.checked_cast(PrimitiveKind::Float).map(|v| v.as_float())
    }

    pub fn checked_double(&self) -> Result<f64> {
        self.checked_cast(PrimitiveKind::Double).map(|v| v.as_double())
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PrimitiveValue {
                fn from(v: $ty) -> Self {
                    PrimitiveValue::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Primitive(PrimitiveValue::$variant(v))
                }
            }
        )*
    };
}

primitive_from!(
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
);

/// Common part of every object mirror: its identity plus the lazily fetched
/// runtime type.
#[derive(Clone)]
pub struct ObjectMirror {
    pub(crate) id: MirrorId,
    runtime_type: Arc<OnceLock<ReferenceType>>,
}

impl ObjectMirror {
    pub fn new(id: MirrorId) -> Self {
        Self {
            id,
            runtime_type: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id.id()
    }

    pub fn mirror_id(&self) -> &MirrorId {
        &self.id
    }

    pub fn reference_type(&self) -> Result<ReferenceType> {
        if let Some(ty) = self.runtime_type.get() {
            return Ok(ty.clone());
        }
        let session = self.session()?;
        let data = session
            .execute(Request::ObjectReferenceType { object: self.id() })?
            .into_type()?;
        let ty = session.reference_type(data);
        Ok(self.runtime_type.get_or_init(|| ty).clone())
    }
}

macro_rules! object_mirror {
    ($name:ident, |$this:ident| $core:expr) => {
        impl $crate::session::Mirror for $name {
            fn session_ref(&self) -> &$crate::session::SessionRef {
                let $this = self;
                $core.id.session_ref()
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                let $this = self;
                let lhs = &$core.id;
                let $this = other;
                lhs == &$core.id
            }
        }

        impl ::std::cmp::Eq for $name {}

        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                let $this = self;
                ::std::hash::Hash::hash(&$core.id, state);
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let $this = self;
                f.debug_struct(stringify!($name))
                    .field("session", &$core.id.session_ref().id())
                    .field("id", &format_args!("{:#x}", $core.id.id()))
                    .finish()
            }
        }
    };
}

pub(crate) use object_mirror;

object_mirror!(ObjectMirror, |this| this);

#[derive(Clone)]
pub struct StringReference {
    object: ObjectMirror,
    value: Arc<OnceLock<String>>,
}

object_mirror!(StringReference, |this| this.object);

impl StringReference {
    pub fn new(id: MirrorId) -> Self {
        Self {
            object: ObjectMirror::new(id),
            value: Arc::new(OnceLock::new()),
        }
    }

    pub fn object(&self) -> &ObjectMirror {
        &self.object
    }

    /// Characters of the remote string.
    pub fn value(&self) -> Result<String> {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }
        let value = self
            .session()?
            .execute(Request::StringValue {
                object: self.object.id(),
            })?
            .into_string()?;
        Ok(self.value.get_or_init(|| value).clone())
    }
}

#[derive(Clone)]
pub struct ClassObjectReference {
    object: ObjectMirror,
    reflected: Arc<OnceLock<ReferenceType>>,
}

object_mirror!(ClassObjectReference, |this| this.object);

impl ClassObjectReference {
    pub fn new(id: MirrorId) -> Self {
        Self {
            object: ObjectMirror::new(id),
            reflected: Arc::new(OnceLock::new()),
        }
    }

    pub fn object(&self) -> &ObjectMirror {
        &self.object
    }

    /// The type this `java.lang.Class` instance stands for.
    pub fn reflected_type(&self) -> Result<ReferenceType> {
        if let Some(ty) = self.reflected.get() {
            return Ok(ty.clone());
        }
        let session = self.session()?;
        let data = session
            .execute(Request::ReflectedType {
                class_object: self.object.id(),
            })?
            .into_type()?;
        let ty = session.reference_type(data);
        Ok(self.reflected.get_or_init(|| ty).clone())
    }
}

#[derive(Clone)]
pub struct ModuleReference {
    object: ObjectMirror,
    name: Arc<OnceLock<Option<String>>>,
    class_loader: Arc<OnceLock<Option<ObjectReference>>>,
}

object_mirror!(ModuleReference, |this| this.object);

impl ModuleReference {
    pub fn new(id: MirrorId) -> Self {
        Self {
            object: ObjectMirror::new(id),
            name: Arc::new(OnceLock::new()),
            class_loader: Arc::new(OnceLock::new()),
        }
    }

    pub fn object(&self) -> &ObjectMirror {
        &self.object
    }

    /// `None` for an unnamed module.
    pub fn name(&self) -> Result<Option<String>> {
        if let Some(name) = self.name.get() {
            return Ok(name.clone());
        }
        let name = self
            .session()?
            .execute(Request::ModuleName {
                module: self.object.id(),
            })?
            .into_string()?;
        let name = (!name.is_empty()).then_some(name);
        Ok(self.name.get_or_init(|| name).clone())
    }

    /// `None` when the module was defined by the bootstrap loader.
    pub fn class_loader(&self) -> Result<Option<ObjectReference>> {
        if let Some(loader) = self.class_loader.get() {
            return Ok(loader.clone());
        }
        let session = self.session()?;
        let loader = session
            .execute(Request::ModuleClassLoader {
                module: self.object.id(),
            })?
            .into_object()?
            .map(|tagged| ObjectReference::from_tagged(&session, tagged));
        Ok(self.class_loader.get_or_init(|| loader).clone())
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ObjectReference {
    Object(ObjectMirror),
    String(StringReference),
    ClassObject(ClassObjectReference),
    Module(ModuleReference),
    Thread(ThreadReference),
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectReference::Object(v) => v.fmt(f),
            ObjectReference::String(v) => v.fmt(f),
            ObjectReference::ClassObject(v) => v.fmt(f),
            ObjectReference::Module(v) => v.fmt(f),
            ObjectReference::Thread(v) => v.fmt(f),
        }
    }
}

impl Mirror for ObjectReference {
    fn session_ref(&self) -> &SessionRef {
        self.object().mirror_id().session_ref()
    }
}

impl ObjectReference {
    pub fn from_tagged(session: &Session, tagged: TaggedObjectId) -> Self {
        let id = session.mirror_id(tagged.id);
        match tagged.tag {
            ObjectTag::Object => ObjectReference::Object(ObjectMirror::new(id)),
            ObjectTag::String => ObjectReference::String(StringReference::new(id)),
            ObjectTag::ClassObject => ObjectReference::ClassObject(ClassObjectReference::new(id)),
            ObjectTag::Module => ObjectReference::Module(ModuleReference::new(id)),
            ObjectTag::Thread => ObjectReference::Thread(ThreadReference::new(id)),
        }
    }

    pub fn tag(&self) -> ObjectTag {
        match self {
            ObjectReference::Object(_) => ObjectTag::Object,
            ObjectReference::String(_) => ObjectTag::String,
            ObjectReference::ClassObject(_) => ObjectTag::ClassObject,
            ObjectReference::Module(_) => ObjectTag::Module,
            ObjectReference::Thread(_) => ObjectTag::Thread,
        }
    }

    pub fn object(&self) -> &ObjectMirror {
        match self {
            ObjectReference::Object(v) => v,
            ObjectReference::String(v) => v.object(),
            ObjectReference::ClassObject(v) => v.object(),
            ObjectReference::Module(v) => v.object(),
            ObjectReference::Thread(v) => v.object(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.object().id()
    }

    pub fn reference_type(&self) -> Result<ReferenceType> {
        self.object().reference_type()
    }

    pub fn as_string(&self) -> Option<&StringReference> {
        match self {
            ObjectReference::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_class_object(&self) -> Option<&ClassObjectReference> {
        match self {
            ObjectReference::ClassObject(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleReference> {
        match self {
            ObjectReference::Module(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadReference> {
        match self {
            ObjectReference::Thread(v) => Some(v),
            _ => None,
        }
    }
}

/// A value of the target. `null` is represented as `Option::<Value>::None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Primitive(PrimitiveValue),
    Object(ObjectReference),
}

impl Value {
    pub fn from_tagged(session: &Session, tagged: Option<TaggedObjectId>) -> Option<Value> {
        tagged.map(|tagged| Value::Object(ObjectReference::from_tagged(session, tagged)))
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectReference> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl From<ObjectReference> for Value {
    fn from(v: ObjectReference) -> Self {
        Value::Object(v)
    }
}

/// Something a value can be stored into: a field, a local variable, an array
/// component.
pub trait ValueContainer: Mirror {
    fn type_signature(&self) -> &str;

    fn type_name(&self) -> String {
        signature_to_type_name(self.type_signature())
    }
}

/// Checks (and, for primitives, converts) `value` for storing into
/// `destination`.
///
/// `None` is `null`: accepted for reference destinations, rejected for
/// primitive ones.
pub fn prepare_for_assignment(
    value: Option<&Value>,
    destination: &dyn ValueContainer,
) -> Result<Option<Value>> {
    let target = parse_type_signature(destination.type_signature())?;
    let Some(value) = value else {
        return match target {
            ReturnType::Type(FieldType::Primitive(_)) | ReturnType::Void => {
                Err(JdiError::InvalidConversion(format!(
                    "cannot assign null to {}",
                    destination.type_name()
                )))
            }
            ReturnType::Type(_) => Ok(None),
        };
    };

    match (value, target) {
        (Value::Void, _) => Err(JdiError::InvalidConversion(format!(
            "cannot assign a void value to {}",
            destination.type_name()
        ))),
        (_, ReturnType::Void) => Err(JdiError::InvalidConversion(
            "a void destination cannot hold a value".to_string(),
        )),
        (Value::Primitive(primitive), ReturnType::Type(FieldType::Primitive(kind))) => {
            primitive.checked_cast(kind).map(|v| Some(Value::Primitive(v)))
        }
        (Value::Primitive(primitive), ReturnType::Type(_)) => Err(JdiError::InvalidConversion(
            format!(
                "cannot assign {} value to reference type {}",
                primitive.kind().name(),
                destination.type_name()
            ),
        )),
        (Value::Object(_), ReturnType::Type(FieldType::Primitive(kind))) => {
            Err(JdiError::InvalidConversion(format!(
                "cannot assign an object reference to {}",
                kind.name()
            )))
        }
        (Value::Object(object), ReturnType::Type(_)) => {
            if object.session_id() != destination.session_id() {
                return Err(JdiError::SessionMismatch {
                    mirror: object.session_id(),
                    current: destination.session_id(),
                });
            }
            Ok(Some(value.clone()))
        }
    }
}
