//! Request/reply vocabulary exchanged with the target.
//!
//! Encoding these into JDWP packets is the job of a [`RequestExecutor`]; the
//! mirror layer only ever sees the decoded [`Reply`].

use crate::connect::transport::Connection;
use crate::error::{JdiError, Result};
use crate::{FieldId, FrameId, MethodId, ObjectId, ReferenceTypeId};

/// Executes one request against the target over the session's connection.
///
/// The session serializes calls, so implementations get exclusive access to the
/// connection for the duration of a request.
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, connection: &mut dyn Connection, request: &Request) -> Result<Reply>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Request {
    StringValue { object: ObjectId },
    ReflectedType { class_object: ObjectId },
    ModuleName { module: ObjectId },
    ModuleClassLoader { module: ObjectId },
    ObjectReferenceType { object: ObjectId },
    ClassesBySignature { signature: String },
    Fields { type_id: ReferenceTypeId },
    Methods { type_id: ReferenceTypeId },
    LineTable { type_id: ReferenceTypeId, method_id: MethodId },
    VariableTable { type_id: ReferenceTypeId, method_id: MethodId },
    Bytecodes { type_id: ReferenceTypeId, method_id: MethodId },
    IsObsolete { type_id: ReferenceTypeId, method_id: MethodId },
    ThreadName { thread: ObjectId },
    ThreadSuspend { thread: ObjectId },
    ThreadResume { thread: ObjectId },
    FrameCount { thread: ObjectId },
    Frames { thread: ObjectId, start: i32, length: i32 },
    OwnedMonitorsStackDepth { thread: ObjectId },
    ThisObject { thread: ObjectId, frame: FrameId },
    ResumeAll,
    Dispose,
}

impl Request {
    /// Short command name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::StringValue { .. } => "StringReference.Value",
            Request::ReflectedType { .. } => "ClassObjectReference.ReflectedType",
            Request::ModuleName { .. } => "ModuleReference.Name",
            Request::ModuleClassLoader { .. } => "ModuleReference.ClassLoader",
            Request::ObjectReferenceType { .. } => "ObjectReference.ReferenceType",
            Request::ClassesBySignature { .. } => "VirtualMachine.ClassesBySignature",
            Request::Fields { .. } => "ReferenceType.FieldsWithGeneric",
            Request::Methods { .. } => "ReferenceType.MethodsWithGeneric",
            Request::LineTable { .. } => "Method.LineTable",
            Request::VariableTable { .. } => "Method.VariableTableWithGeneric",
            Request::Bytecodes { .. } => "Method.Bytecodes",
            Request::IsObsolete { .. } => "Method.IsObsolete",
            Request::ThreadName { .. } => "ThreadReference.Name",
            Request::ThreadSuspend { .. } => "ThreadReference.Suspend",
            Request::ThreadResume { .. } => "ThreadReference.Resume",
            Request::FrameCount { .. } => "ThreadReference.FrameCount",
            Request::Frames { .. } => "ThreadReference.Frames",
            Request::OwnedMonitorsStackDepth { .. } => "ThreadReference.OwnedMonitorsStackDepthInfo",
            Request::ThisObject { .. } => "StackFrame.ThisObject",
            Request::ResumeAll => "VirtualMachine.Resume",
            Request::Dispose => "VirtualMachine.Dispose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Class,
    Interface,
    Array,
}

/// Tag carried by an object id on the wire, selecting the value variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectTag {
    Object,
    String,
    ClassObject,
    Module,
    Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedObjectId {
    pub tag: ObjectTag,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceTypeData {
    pub tag: TypeTag,
    pub id: ReferenceTypeId,
    pub signature: String,
    /// Empty when the type has no generic signature.
    pub generic_signature: String,
}

/// Reflection data for a field or a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentData {
    pub id: FieldId,
    pub name: String,
    pub signature: String,
    pub generic_signature: String,
    pub modifiers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineEntry {
    pub code_index: i64,
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineTableData {
    pub start: i64,
    pub end: i64,
    pub lines: Vec<LineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableData {
    pub code_index: i64,
    pub name: String,
    pub signature: String,
    pub generic_signature: String,
    pub length: u32,
    pub slot: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableTableData {
    pub arg_count: i32,
    pub variables: Vec<VariableData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationData {
    pub declaring_type: ReferenceTypeData,
    pub method_id: MethodId,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameData {
    pub frame_id: FrameId,
    pub location: LocationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorData {
    pub monitor: TaggedObjectId,
    pub stack_depth: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reply {
    Ack,
    Bool(bool),
    Int(i32),
    String(String),
    Bytes(Vec<u8>),
    /// `None` is the null object.
    Object(Option<TaggedObjectId>),
    Type(ReferenceTypeData),
    Types(Vec<ReferenceTypeData>),
    Components(Vec<ComponentData>),
    LineTable(LineTableData),
    VariableTable(VariableTableData),
    Frames(Vec<FrameData>),
    Monitors(Vec<MonitorData>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Ack => "ack",
            Reply::Bool(_) => "boolean",
            Reply::Int(_) => "int",
            Reply::String(_) => "string",
            Reply::Bytes(_) => "bytes",
            Reply::Object(_) => "object",
            Reply::Type(_) => "reference type",
            Reply::Types(_) => "reference types",
            Reply::Components(_) => "components",
            Reply::LineTable(_) => "line table",
            Reply::VariableTable(_) => "variable table",
            Reply::Frames(_) => "frames",
            Reply::Monitors(_) => "monitors",
        }
    }

    fn unexpected(self, expected: &str) -> JdiError {
        JdiError::Protocol(format!(
            "expected {expected} reply, got {}",
            self.kind()
        ))
    }

    pub fn into_ack(self) -> Result<()> {
        match self {
            Reply::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Reply::Bool(v) => Ok(v),
            other => Err(other.unexpected("boolean")),
        }
    }

    pub fn into_int(self) -> Result<i32> {
        match self {
            Reply::Int(v) => Ok(v),
            other => Err(other.unexpected("int")),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Reply::String(v) => Ok(v),
            other => Err(other.unexpected("string")),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Reply::Bytes(v) => Ok(v),
            other => Err(other.unexpected("bytes")),
        }
    }

    pub fn into_object(self) -> Result<Option<TaggedObjectId>> {
        match self {
            Reply::Object(v) => Ok(v),
            other => Err(other.unexpected("object")),
        }
    }

    pub fn into_type(self) -> Result<ReferenceTypeData> {
        match self {
            Reply::Type(v) => Ok(v),
            other => Err(other.unexpected("reference type")),
        }
    }

    pub fn into_types(self) -> Result<Vec<ReferenceTypeData>> {
        match self {
            Reply::Types(v) => Ok(v),
            other => Err(other.unexpected("reference types")),
        }
    }

    pub fn into_components(self) -> Result<Vec<ComponentData>> {
        match self {
            Reply::Components(v) => Ok(v),
            other => Err(other.unexpected("components")),
        }
    }

    pub fn into_line_table(self) -> Result<LineTableData> {
        match self {
            Reply::LineTable(v) => Ok(v),
            other => Err(other.unexpected("line table")),
        }
    }

    pub fn into_variable_table(self) -> Result<VariableTableData> {
        match self {
            Reply::VariableTable(v) => Ok(v),
            other => Err(other.unexpected("variable table")),
        }
    }

    pub fn into_frames(self) -> Result<Vec<FrameData>> {
        match self {
            Reply::Frames(v) => Ok(v),
            other => Err(other.unexpected("frames")),
        }
    }

    pub fn into_monitors(self) -> Result<Vec<MonitorData>> {
        match self {
            Reply::Monitors(v) => Ok(v),
            other => Err(other.unexpected("monitors")),
        }
    }
}
