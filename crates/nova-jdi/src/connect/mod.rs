//! Establishing sessions: connectors negotiate over a [`TransportService`]
//! and hand the resulting connection to a [`SessionBuilder`].
//!
//! [`TransportService`]: transport::TransportService

pub mod argument;
pub mod attach;
pub mod launch;
pub mod listen;
pub mod resources;
pub mod socket;
pub mod transport;

use std::sync::Arc;

use crate::config::{ConnectConfig, TransportConfig};
use crate::error::Result;
use crate::session::{Session, SessionBuilder};

use argument::{ArgumentSchema, ConnectorArguments};
use resources::{BuiltinResources, StringResources};

/// Everything a connector needs besides its transport.
#[derive(Clone)]
pub struct ConnectorContext {
    pub builder: SessionBuilder,
    pub resources: Arc<dyn StringResources>,
    pub connect: ConnectConfig,
    pub transport: TransportConfig,
}

impl ConnectorContext {
    pub fn new(builder: SessionBuilder) -> Self {
        Self {
            builder,
            resources: Arc::new(BuiltinResources),
            connect: ConnectConfig::default(),
            transport: TransportConfig::default(),
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn StringResources>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_connect_config(mut self, connect: ConnectConfig) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_transport_config(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub(crate) fn string(&self, key: &str) -> String {
        resources::lookup(self.resources.as_ref(), key)
    }
}

pub trait Connector: Send + Sync {
    /// Unique name, e.g. `SocketAttach`.
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// Name of the transport the connector negotiates over.
    fn transport_name(&self) -> String;

    fn schema(&self) -> &ArgumentSchema;

    /// A fresh argument map holding every argument's default value.
    fn default_arguments(&self) -> ConnectorArguments {
        self.schema().default_arguments()
    }
}

/// Attaches to a target that is already listening.
pub trait AttachingConnector: Connector {
    fn attach(&self, args: &ConnectorArguments) -> Result<Session>;
}

/// Waits for a target to connect.
pub trait ListeningConnector: Connector {
    /// Starts listening and returns the resolved address.
    ///
    /// Wildcard arguments (such as an empty or zero port) are rewritten in
    /// `args` to the concrete values the transport bound, so the same map
    /// identifies this listener in [`ListeningConnector::accept`] and
    /// [`ListeningConnector::stop_listening`].
    fn start_listening(&self, args: &mut ConnectorArguments) -> Result<String>;

    fn stop_listening(&self, args: &ConnectorArguments) -> Result<()>;

    /// Waits for one target. Listens only for the duration of the call when
    /// [`ListeningConnector::start_listening`] was not called first.
    fn accept(&self, args: &ConnectorArguments) -> Result<Session>;

    fn supports_multiple_connections(&self) -> bool {
        true
    }
}

/// Starts a target process and connects to it.
pub trait LaunchingConnector: Connector {
    fn launch(&self, args: &ConnectorArguments) -> Result<Session>;
}
