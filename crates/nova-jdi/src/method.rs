//! Methods, code locations and local variables.
//!
//! A method mirror is built in one of three fixed profiles (see
//! [`MethodKind`]). Only concrete methods have code; the others answer code
//! queries with empty results or [`JdiError::AbsentInformation`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::component::{Modifiers, TypeComponent};
use crate::error::{JdiError, Result};
use crate::request::{ComponentData, LineTableData, LocationData, Request, VariableTableData};
use crate::session::{Mirror, Session, SessionRef};
use crate::signature::{parse_method_signature, signature_to_type_name, MethodSignature};
use crate::types::{ReferenceType, Type};
use crate::value::ValueContainer;
use crate::MethodId;

/// JDWP `ABSENT_INFORMATION`.
const ERROR_ABSENT_INFORMATION: u16 = 101;

const OBSOLETE_NAME: &str = "<obsolete>";
const UNKNOWN_TYPE_NAME: &str = "<unknown>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Has bytecode, line and variable tables.
    Concrete,
    /// `native` or `abstract`: no code.
    NonConcrete,
    /// Superseded by a class redefinition; even its signature is unknown.
    Obsolete,
}

impl MethodKind {
    fn select(id: MethodId, modifiers: Modifiers) -> Self {
        if id == 0 {
            MethodKind::Obsolete
        } else if modifiers.contains(Modifiers::NATIVE | Modifiers::ABSTRACT) {
            MethodKind::NonConcrete
        } else {
            MethodKind::Concrete
        }
    }
}

#[derive(Clone)]
pub struct Method {
    component: TypeComponent,
    kind: MethodKind,
    line_table: Arc<OnceLock<LineTableData>>,
    variable_table: Arc<OnceLock<VariableTableData>>,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("declaring_type", &self.declaring_type().signature())
            .field("name", &self.name())
            .field("signature", &self.signature())
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.component == other.component
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.component.hash(state);
    }
}

impl Mirror for Method {
    fn session_ref(&self) -> &SessionRef {
        self.component.session_ref()
    }
}

impl std::ops::Deref for Method {
    type Target = TypeComponent;

    fn deref(&self) -> &TypeComponent {
        &self.component
    }
}

impl Method {
    pub fn new(declaring_type: ReferenceType, data: ComponentData) -> Self {
        let kind = MethodKind::select(data.id, Modifiers::new(data.modifiers));
        Self {
            component: TypeComponent::new(declaring_type, data),
            kind,
            line_table: Arc::new(OnceLock::new()),
            variable_table: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn obsolete(declaring_type: ReferenceType) -> Self {
        Self::new(
            declaring_type,
            ComponentData {
                id: 0,
                name: OBSOLETE_NAME.to_string(),
                signature: String::new(),
                generic_signature: String::new(),
                modifiers: 0,
            },
        )
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn component(&self) -> &TypeComponent {
        &self.component
    }

    pub fn is_native(&self) -> bool {
        self.modifiers().contains(Modifiers::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers().contains(Modifiers::ABSTRACT)
    }

    pub fn is_synchronized(&self) -> bool {
        self.modifiers().contains(Modifiers::SYNCHRONIZED)
    }

    pub fn is_bridge(&self) -> bool {
        self.modifiers().contains(Modifiers::BRIDGE)
    }

    pub fn is_varargs(&self) -> bool {
        self.modifiers().contains(Modifiers::VARARGS)
    }

    pub fn is_constructor(&self) -> bool {
        self.name() == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name() == "<clinit>"
    }

    /// Obsolete methods always are; everything else is asked of the target,
    /// since a redefinition can happen at any time.
    pub fn is_obsolete(&self) -> Result<bool> {
        if self.kind == MethodKind::Obsolete {
            return Ok(true);
        }
        self.session()?
            .execute(Request::IsObsolete {
                type_id: self.declaring_type().id(),
                method_id: self.id(),
            })?
            .into_bool()
    }

    fn parsed_signature(&self) -> Result<MethodSignature> {
        parse_method_signature(self.signature())
    }

    pub fn return_type_name(&self) -> Result<String> {
        match self.kind {
            MethodKind::Obsolete => Ok(UNKNOWN_TYPE_NAME.to_string()),
            _ => Ok(self.parsed_signature()?.return_type.type_name()),
        }
    }

    pub fn return_type(&self) -> Result<Type> {
        if self.kind == MethodKind::Obsolete {
            return Err(JdiError::TypeNotLoaded {
                signature: UNKNOWN_TYPE_NAME.to_string(),
            });
        }
        let signature = self.signature();
        let start = signature
            .rfind(')')
            .ok_or_else(|| JdiError::InvalidSignature(signature.to_string()))?;
        self.declaring_type().find_type(&signature[start + 1..])
    }

    pub fn argument_signatures(&self) -> Result<Vec<String>> {
        if self.kind == MethodKind::Obsolete {
            return Ok(Vec::new());
        }
        Ok(self
            .parsed_signature()?
            .params
            .iter()
            .map(|param| param.signature())
            .collect())
    }

    pub fn argument_type_names(&self) -> Result<Vec<String>> {
        if self.kind == MethodKind::Obsolete {
            return Ok(Vec::new());
        }
        Ok(self
            .parsed_signature()?
            .params
            .iter()
            .map(|param| param.type_name())
            .collect())
    }

    /// Fails with [`JdiError::TypeNotLoaded`] on the first argument type the
    /// target has not loaded.
    pub fn argument_types(&self) -> Result<Vec<Type>> {
        self.argument_signatures()?
            .iter()
            .map(|signature| self.declaring_type().find_type(signature))
            .collect()
    }

    fn absent(&self, what: &str) -> JdiError {
        JdiError::AbsentInformation(format!(
            "{what} of {}.{} ({})",
            self.declaring_type().name(),
            self.name(),
            match self.kind {
                MethodKind::Obsolete => "obsolete method",
                _ if self.is_native() => "native method",
                _ => "abstract method",
            }
        ))
    }

    /// Maps the target's `ABSENT_INFORMATION` reply onto
    /// [`JdiError::AbsentInformation`].
    fn map_absent(&self, err: JdiError, what: &str) -> JdiError {
        match err {
            JdiError::CommandFailed {
                error_code: ERROR_ABSENT_INFORMATION,
            } => JdiError::AbsentInformation(format!(
                "{}.{} was compiled without {what}",
                self.declaring_type().name(),
                self.name()
            )),
            other => other,
        }
    }

    fn line_table(&self) -> Result<&LineTableData> {
        if let Some(table) = self.line_table.get() {
            return Ok(table);
        }
        let table = self
            .session()?
            .execute(Request::LineTable {
                type_id: self.declaring_type().id(),
                method_id: self.id(),
            })
            .map_err(|err| self.map_absent(err, "line number information"))?
            .into_line_table()?;
        Ok(self.line_table.get_or_init(|| table))
    }

    fn variable_table(&self) -> Result<&VariableTableData> {
        if let Some(table) = self.variable_table.get() {
            return Ok(table);
        }
        let table = self
            .session()?
            .execute(Request::VariableTable {
                type_id: self.declaring_type().id(),
                method_id: self.id(),
            })
            .map_err(|err| self.map_absent(err, "local variable information"))?
            .into_variable_table()?;
        Ok(self.variable_table.get_or_init(|| table))
    }

    /// First executable location.
    ///
    /// `None` for abstract (and obsolete) methods; native methods report a
    /// location with code index `-1`.
    pub fn location(&self) -> Result<Option<Location>> {
        match self.kind {
            MethodKind::Concrete => {
                let start = self.line_table()?.start;
                Ok(Some(Location::new(
                    self.declaring_type().clone(),
                    self.id(),
                    start,
                    Some(self.line_of(start)?),
                )))
            }
            MethodKind::NonConcrete | MethodKind::Obsolete if self.is_native() => Ok(Some(
                Location::new(self.declaring_type().clone(), self.id(), -1, Some(-1)),
            )),
            MethodKind::NonConcrete | MethodKind::Obsolete => Ok(None),
        }
    }

    /// One location per line-table entry, in code-index order.
    pub fn all_line_locations(&self) -> Result<Vec<Location>> {
        if self.kind != MethodKind::Concrete {
            return Ok(Vec::new());
        }
        let table = self.line_table()?;
        if table.lines.is_empty() {
            return Err(JdiError::AbsentInformation(format!(
                "{}.{} has no line number information",
                self.declaring_type().name(),
                self.name()
            )));
        }
        let mut lines = table.lines.clone();
        lines.sort_by_key(|entry| entry.code_index);
        Ok(lines
            .into_iter()
            .map(|entry| {
                Location::new(
                    self.declaring_type().clone(),
                    self.id(),
                    entry.code_index,
                    Some(entry.line),
                )
            })
            .collect())
    }

    pub fn locations_of_line(&self, line: i32) -> Result<Vec<Location>> {
        Ok(self
            .all_line_locations()?
            .into_iter()
            .filter(|location| location.line == Some(line))
            .collect())
    }

    /// Source line of `code_index`, or `-1` when unknown.
    pub fn line_of(&self, code_index: i64) -> Result<i32> {
        if self.kind != MethodKind::Concrete {
            return Ok(-1);
        }
        let table = self.line_table()?;
        Ok(table
            .lines
            .iter()
            .filter(|entry| entry.code_index <= code_index)
            .max_by_key(|entry| entry.code_index)
            .map_or(-1, |entry| entry.line))
    }

    pub fn variables(&self) -> Result<Vec<LocalVariable>> {
        if self.kind != MethodKind::Concrete {
            return Err(self.absent("local variables"));
        }
        let table = self.variable_table()?;
        Ok(table
            .variables
            .iter()
            .map(|data| LocalVariable {
                method: self.clone(),
                name: data.name.clone(),
                signature: data.signature.clone(),
                generic_signature: (!data.generic_signature.is_empty())
                    .then(|| data.generic_signature.clone()),
                scope_start: data.code_index,
                scope_end: data
                    .code_index
                    .saturating_add(i64::from(data.length))
                    .saturating_sub(1),
                slot: data.slot,
                argument: data.slot < table.arg_count,
            })
            .collect())
    }

    pub fn variables_by_name(&self, name: &str) -> Result<Vec<LocalVariable>> {
        Ok(self
            .variables()?
            .into_iter()
            .filter(|variable| variable.name == name)
            .collect())
    }

    pub fn arguments(&self) -> Result<Vec<LocalVariable>> {
        if self.kind != MethodKind::Concrete {
            return Err(self.absent("arguments"));
        }
        Ok(self
            .variables()?
            .into_iter()
            .filter(|variable| variable.argument)
            .collect())
    }

    pub fn bytecodes(&self) -> Result<Vec<u8>> {
        if self.kind != MethodKind::Concrete {
            return Ok(Vec::new());
        }
        self.session()?
            .execute(Request::Bytecodes {
                type_id: self.declaring_type().id(),
                method_id: self.id(),
            })?
            .into_bytes()
    }

    pub fn compare_to(&self, other: &Method) -> Result<Ordering> {
        self.component
            .compare_with(&other.component, |ty, id| ty.method_index(id))
    }
}

/// A code position: declaring type, method and code index.
#[derive(Clone)]
pub struct Location {
    declaring_type: ReferenceType,
    method_id: MethodId,
    code_index: i64,
    line: Option<i32>,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("declaring_type", &self.declaring_type.signature())
            .field("method_id", &format_args!("{:#x}", self.method_id))
            .field("code_index", &self.code_index)
            .field("line", &self.line)
            .finish()
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.method_id == other.method_id
            && self.code_index == other.code_index
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.method_id.hash(state);
        self.code_index.hash(state);
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.declaring_type
            .cmp(&other.declaring_type)
            .then_with(|| self.method_id.cmp(&other.method_id))
            .then_with(|| self.code_index.cmp(&other.code_index))
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Mirror for Location {
    fn session_ref(&self) -> &SessionRef {
        self.declaring_type.session_ref()
    }
}

impl Location {
    pub fn new(
        declaring_type: ReferenceType,
        method_id: MethodId,
        code_index: i64,
        line: Option<i32>,
    ) -> Self {
        Self {
            declaring_type,
            method_id,
            code_index,
            line,
        }
    }

    pub fn from_data(session: &Session, data: LocationData) -> Self {
        Self::new(
            session.reference_type(data.declaring_type),
            data.method_id,
            data.index,
            None,
        )
    }

    pub fn declaring_type(&self) -> &ReferenceType {
        &self.declaring_type
    }

    pub fn method_id(&self) -> MethodId {
        self.method_id
    }

    pub fn code_index(&self) -> i64 {
        self.code_index
    }

    pub fn method(&self) -> Result<Method> {
        self.declaring_type.method_by_id(self.method_id)
    }

    /// Source line, looked up in the method's line table when the location
    /// did not come from one. `-1` when unknown.
    pub fn line_number(&self) -> Result<i32> {
        match self.line {
            Some(line) => Ok(line),
            None => self.method()?.line_of(self.code_index),
        }
    }
}

#[derive(Clone)]
pub struct LocalVariable {
    method: Method,
    name: String,
    signature: String,
    generic_signature: Option<String>,
    scope_start: i64,
    scope_end: i64,
    slot: i32,
    argument: bool,
}

impl fmt::Debug for LocalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalVariable")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("slot", &self.slot)
            .finish()
    }
}

impl PartialEq for LocalVariable {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.slot == other.slot
            && self.scope_start == other.scope_start
    }
}

impl Eq for LocalVariable {}

impl Hash for LocalVariable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.slot.hash(state);
        self.scope_start.hash(state);
    }
}

impl Mirror for LocalVariable {
    fn session_ref(&self) -> &SessionRef {
        self.method.session_ref()
    }
}

impl ValueContainer for LocalVariable {
    fn type_signature(&self) -> &str {
        &self.signature
    }
}

impl LocalVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    pub fn is_argument(&self) -> bool {
        self.argument
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn type_name(&self) -> String {
        signature_to_type_name(&self.signature)
    }

    pub fn type_(&self) -> Result<Type> {
        self.method.declaring_type().find_type(&self.signature)
    }

    /// Whether the variable is in scope at `location`.
    pub fn is_visible(&self, location: &Location) -> bool {
        location.declaring_type() == self.method.declaring_type()
            && location.method_id() == self.method.id()
            && (self.scope_start..=self.scope_end).contains(&location.code_index())
    }
}
