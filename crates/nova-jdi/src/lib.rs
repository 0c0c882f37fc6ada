//! Debugger-side mirrors of a remote Java VM for Nova.
//!
//! A [`Session`] owns one negotiated connection to a target. Everything read
//! from the target (values, types, methods, threads, frames) is a *mirror*
//! bound to the session it came from; mirrors from different sessions never
//! mix, and mirrors outlived by their session fail with
//! [`JdiError::Disconnected`].
//!
//! Sessions are established through the connectors in [`connect`]: attach to
//! a listening target, listen for one to connect, or launch one.
//!
//! Wire encoding is out of scope here. Each request is handed, as a typed
//! [`Request`], to a [`RequestExecutor`] together with the session's
//! [`Connection`](connect::transport::Connection).

pub mod component;
pub mod config;
pub mod connect;
pub mod error;
pub mod method;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod request;
pub mod session;
pub mod signature;
pub mod thread;
pub mod types;
pub mod value;

pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type FieldId = u64;
pub type MethodId = u64;
pub type FrameId = u64;

/// Size of the fixed JDWP packet header, length prefix included.
pub const JDWP_HEADER_LEN: usize = 11;

/// Upper bound on accepted packet sizes.
pub const MAX_JDWP_PACKET_BYTES: usize = 16 * 1024 * 1024;

pub(crate) fn validate_jdwp_packet_length(length: usize) -> Result<(), String> {
    if length < JDWP_HEADER_LEN {
        return Err(format!("invalid packet length {length}"));
    }
    if length > MAX_JDWP_PACKET_BYTES {
        return Err(format!(
            "packet length {length} exceeds maximum allowed ({MAX_JDWP_PACKET_BYTES} bytes)"
        ));
    }
    Ok(())
}

pub use component::{Field, Modifiers, TypeComponent};
pub use config::{init_tracing, JdiConfig};
pub use error::{JdiError, Result};
pub use method::{LocalVariable, Location, Method, MethodKind};
pub use request::{Reply, Request, RequestExecutor};
pub use session::{
    ListenerAction, Mirror, MirrorId, Session, SessionBuilder, SessionId, SessionRef,
    Subscription, SuspendState, ThreadResumeListener,
};
pub use signature::PrimitiveKind;
pub use thread::{MonitorInfo, StackFrame, ThreadReference};
pub use types::{ReferenceType, Type};
pub use value::{
    prepare_for_assignment, ClassObjectReference, ModuleReference, ObjectReference,
    PrimitiveValue, StringReference, Value, ValueContainer,
};
