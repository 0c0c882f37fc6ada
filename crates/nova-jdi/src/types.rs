use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::component::Field;
use crate::error::{JdiError, Result};
use crate::method::Method;
use crate::request::{ComponentData, ReferenceTypeData, Request, TypeTag};
use crate::session::{Mirror, MirrorId, SessionRef};
use crate::signature::{parse_type_signature, signature_to_type_name, FieldType, PrimitiveKind, ReturnType};
use crate::{FieldId, MethodId, ReferenceTypeId};

/// Any type a value, field or method can have.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Primitive(PrimitiveKind),
    Reference(ReferenceType),
}

impl Type {
    pub fn name(&self) -> String {
        match self {
            Type::Void => "void".to_string(),
            Type::Primitive(kind) => kind.name().to_string(),
            Type::Reference(ty) => ty.name(),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            Type::Void => "V".to_string(),
            Type::Primitive(kind) => kind.tag().to_string(),
            Type::Reference(ty) => ty.signature().to_string(),
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceType> {
        match self {
            Type::Reference(ty) => Some(ty),
            _ => None,
        }
    }
}

struct ReferenceTypeInner {
    id: MirrorId,
    tag: TypeTag,
    signature: String,
    generic_signature: Option<String>,
    fields: OnceLock<Arc<[ComponentData]>>,
    methods: OnceLock<Arc<[ComponentData]>>,
}

/// A class, interface or array type loaded in the target.
///
/// Reflection data (declared fields and methods) is fetched on first use and
/// kept for the lifetime of the type.
#[derive(Clone)]
pub struct ReferenceType {
    inner: Arc<ReferenceTypeInner>,
}

impl fmt::Debug for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceType")
            .field("session", &self.session_id())
            .field("id", &format_args!("{:#x}", self.id()))
            .field("signature", &self.inner.signature)
            .finish()
    }
}

impl Mirror for ReferenceType {
    fn session_ref(&self) -> &SessionRef {
        self.inner.id.session_ref()
    }
}

impl PartialEq for ReferenceType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ReferenceType {}

impl Hash for ReferenceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

/// Types order by signature; identical signatures (the same class from
/// different loaders) fall back to session, then type id.
impl Ord for ReferenceType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .signature
            .cmp(&other.inner.signature)
            .then_with(|| self.session_id().cmp(&other.session_id()))
            .then_with(|| self.id().cmp(&other.id()))
    }
}

impl PartialOrd for ReferenceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl ReferenceType {
    pub(crate) fn new(session: SessionRef, data: ReferenceTypeData) -> Self {
        Self {
            inner: Arc::new(ReferenceTypeInner {
                id: MirrorId::new(session, data.id),
                tag: data.tag,
                signature: data.signature,
                generic_signature: (!data.generic_signature.is_empty())
                    .then_some(data.generic_signature),
                fields: OnceLock::new(),
                methods: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> ReferenceTypeId {
        self.inner.id.id()
    }

    pub fn tag(&self) -> TypeTag {
        self.inner.tag
    }

    pub fn signature(&self) -> &str {
        &self.inner.signature
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.inner.generic_signature.as_deref()
    }

    pub fn name(&self) -> String {
        signature_to_type_name(&self.inner.signature)
    }

    pub fn is_interface(&self) -> bool {
        self.inner.tag == TypeTag::Interface
    }

    pub fn is_array(&self) -> bool {
        self.inner.tag == TypeTag::Array
    }

    fn field_data(&self) -> Result<Arc<[ComponentData]>> {
        if let Some(fields) = self.inner.fields.get() {
            return Ok(fields.clone());
        }
        let fields: Arc<[ComponentData]> = self
            .session()?
            .execute(Request::Fields { type_id: self.id() })?
            .into_components()?
            .into();
        Ok(self.inner.fields.get_or_init(|| fields).clone())
    }

    fn method_data(&self) -> Result<Arc<[ComponentData]>> {
        if let Some(methods) = self.inner.methods.get() {
            return Ok(methods.clone());
        }
        let methods: Arc<[ComponentData]> = self
            .session()?
            .execute(Request::Methods { type_id: self.id() })?
            .into_components()?
            .into();
        Ok(self.inner.methods.get_or_init(|| methods).clone())
    }

    /// Fields declared by this type, in declaration order.
    pub fn fields(&self) -> Result<Vec<Field>> {
        Ok(self
            .field_data()?
            .iter()
            .map(|data| Field::new(self.clone(), data.clone()))
            .collect())
    }

    pub fn field_by_name(&self, name: &str) -> Result<Option<Field>> {
        Ok(self
            .field_data()?
            .iter()
            .find(|data| data.name == name)
            .map(|data| Field::new(self.clone(), data.clone())))
    }

    /// Methods declared by this type, in declaration order.
    pub fn methods(&self) -> Result<Vec<Method>> {
        Ok(self
            .method_data()?
            .iter()
            .map(|data| Method::new(self.clone(), data.clone()))
            .collect())
    }

    pub fn methods_by_name(&self, name: &str) -> Result<Vec<Method>> {
        Ok(self
            .method_data()?
            .iter()
            .filter(|data| data.name == name)
            .map(|data| Method::new(self.clone(), data.clone()))
            .collect())
    }

    /// Resolves a method id from a location or frame.
    ///
    /// Id `0` denotes a method that has since been redefined; it yields the
    /// obsolete method variant.
    pub fn method_by_id(&self, method_id: MethodId) -> Result<Method> {
        if method_id == 0 {
            return Ok(Method::obsolete(self.clone()));
        }
        self.method_data()?
            .iter()
            .find(|data| data.id == method_id)
            .map(|data| Method::new(self.clone(), data.clone()))
            .ok_or_else(|| {
                JdiError::Protocol(format!(
                    "method {method_id:#x} is not declared by {}",
                    self.name()
                ))
            })
    }

    /// Declaration index of a field of this type.
    pub fn field_index(&self, field_id: FieldId) -> Result<Option<usize>> {
        Ok(self.field_data()?.iter().position(|data| data.id == field_id))
    }

    /// Declaration index of a method of this type.
    pub fn method_index(&self, method_id: MethodId) -> Result<Option<usize>> {
        Ok(self
            .method_data()?
            .iter()
            .position(|data| data.id == method_id))
    }

    /// Resolves a type signature seen in this type (a field's type, a
    /// parameter type, ...).
    ///
    /// Primitive and `void` signatures resolve locally. Reference signatures
    /// must name a type the target has already loaded, otherwise this fails
    /// with [`JdiError::TypeNotLoaded`].
    pub fn find_type(&self, signature: &str) -> Result<Type> {
        match parse_type_signature(signature)? {
            ReturnType::Void => Ok(Type::Void),
            ReturnType::Type(FieldType::Primitive(kind)) => Ok(Type::Primitive(kind)),
            ReturnType::Type(_) => {
                if signature == self.signature() {
                    return Ok(Type::Reference(self.clone()));
                }
                let session = self.session()?;
                let candidates = session
                    .execute(Request::ClassesBySignature {
                        signature: signature.to_string(),
                    })?
                    .into_types()?;
                candidates
                    .into_iter()
                    .next()
                    .map(|data| Type::Reference(session.reference_type(data)))
                    .ok_or_else(|| JdiError::TypeNotLoaded {
                        signature: signature.to_string(),
                    })
            }
        }
    }
}
