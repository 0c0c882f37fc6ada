//! Fields and the parts they share with methods.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{JdiError, Result};
use crate::request::ComponentData;
use crate::session::{Mirror, SessionRef};
use crate::signature::signature_to_type_name;
use crate::types::{ReferenceType, Type};
use crate::value::ValueContainer;

/// Access and property flags of a type component, as reported by the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const PUBLIC: u32 = 0x0001;
    pub const PRIVATE: u32 = 0x0002;
    pub const PROTECTED: u32 = 0x0004;
    pub const STATIC: u32 = 0x0008;
    pub const FINAL: u32 = 0x0010;
    pub const SYNCHRONIZED: u32 = 0x0020;
    pub const VOLATILE: u32 = 0x0040;
    pub const BRIDGE: u32 = 0x0040;
    pub const TRANSIENT: u32 = 0x0080;
    pub const VARARGS: u32 = 0x0080;
    pub const NATIVE: u32 = 0x0100;
    pub const INTERFACE: u32 = 0x0200;
    pub const ABSTRACT: u32 = 0x0400;
    pub const STRICT: u32 = 0x0800;
    pub const ENUM: u32 = 0x4000;
    /// JDWP reports synthetic members in the high bits rather than through the
    /// class-file `ACC_SYNTHETIC` flag.
    pub const SYNTHETIC: u32 = 0xf000_0000;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifiers({:#x})", self.0)
    }
}

/// Attributes shared by fields and methods.
#[derive(Clone)]
pub struct TypeComponent {
    declaring_type: ReferenceType,
    id: u64,
    name: String,
    signature: String,
    generic_signature: Option<String>,
    modifiers: Modifiers,
}

impl fmt::Debug for TypeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeComponent")
            .field("declaring_type", &self.declaring_type.signature())
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Component ids are only unique within their declaring type.
impl PartialEq for TypeComponent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.declaring_type == other.declaring_type
    }
}

impl Eq for TypeComponent {}

impl Hash for TypeComponent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.id.hash(state);
    }
}

impl Mirror for TypeComponent {
    fn session_ref(&self) -> &SessionRef {
        self.declaring_type.session_ref()
    }
}

impl TypeComponent {
    pub fn new(declaring_type: ReferenceType, data: ComponentData) -> Self {
        Self {
            declaring_type,
            id: data.id,
            name: data.name,
            signature: data.signature,
            generic_signature: (!data.generic_signature.is_empty())
                .then_some(data.generic_signature),
            modifiers: Modifiers::new(data.modifiers),
        }
    }

    pub fn declaring_type(&self) -> &ReferenceType {
        &self.declaring_type
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.modifiers.contains(Modifiers::PROTECTED)
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.contains(Modifiers::PUBLIC)
    }

    pub fn is_package_private(&self) -> bool {
        !self
            .modifiers
            .contains(Modifiers::PUBLIC | Modifiers::PRIVATE | Modifiers::PROTECTED)
    }

    pub fn is_synthetic(&self) -> bool {
        self.modifiers.contains(Modifiers::SYNTHETIC)
    }

    /// Orders by declaring type, then by declaration position within it.
    ///
    /// `index_of` maps a component id to its position in the declaring type.
    pub(crate) fn compare_with(
        &self,
        other: &TypeComponent,
        index_of: impl Fn(&ReferenceType, u64) -> Result<Option<usize>>,
    ) -> Result<Ordering> {
        let by_type = self.declaring_type.cmp(&other.declaring_type);
        if by_type != Ordering::Equal {
            return Ok(by_type);
        }
        let position = |component: &TypeComponent| {
            index_of(&component.declaring_type, component.id)?.ok_or_else(|| {
                JdiError::internal(format!(
                    "{} is not declared by {}",
                    component.name,
                    component.declaring_type.name()
                ))
            })
        };
        Ok(position(self)?.cmp(&position(other)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    component: TypeComponent,
}

impl Mirror for Field {
    fn session_ref(&self) -> &SessionRef {
        self.component.session_ref()
    }
}

impl std::ops::Deref for Field {
    type Target = TypeComponent;

    fn deref(&self) -> &TypeComponent {
        &self.component
    }
}

impl ValueContainer for Field {
    fn type_signature(&self) -> &str {
        self.component.signature()
    }
}

impl Field {
    pub fn new(declaring_type: ReferenceType, data: ComponentData) -> Self {
        Self {
            component: TypeComponent::new(declaring_type, data),
        }
    }

    pub fn component(&self) -> &TypeComponent {
        &self.component
    }

    pub fn is_transient(&self) -> bool {
        self.modifiers().contains(Modifiers::TRANSIENT)
    }

    pub fn is_volatile(&self) -> bool {
        self.modifiers().contains(Modifiers::VOLATILE)
    }

    pub fn is_enum_constant(&self) -> bool {
        self.modifiers().contains(Modifiers::ENUM)
    }

    pub fn type_name(&self) -> String {
        signature_to_type_name(self.signature())
    }

    /// Declared type of the field; fails with [`JdiError::TypeNotLoaded`] if
    /// the target has not loaded it yet.
    pub fn type_(&self) -> Result<Type> {
        self.find_type(self.signature())
    }

    pub fn find_type(&self, signature: &str) -> Result<Type> {
        self.declaring_type().find_type(signature)
    }

    pub fn compare_to(&self, other: &Field) -> Result<Ordering> {
        self.component
            .compare_with(&other.component, |ty, id| ty.field_index(id))
    }
}
