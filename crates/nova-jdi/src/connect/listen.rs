use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connect::argument::{ArgumentSchema, ArgumentSpec, ConnectorArguments};
use crate::connect::attach::{timeout_ms, timeout_spec, ARG_ADDRESS, ARG_PORT};
use crate::connect::socket::SocketTransport;
use crate::connect::transport::{ListenGuard, ListenKey, TransportService};
use crate::connect::{Connector, ConnectorContext, ListeningConnector};
use crate::error::{JdiError, Result};
use crate::session::Session;

pub(crate) const ARG_LOCAL_ADDRESS: &str = "localAddress";

/// Listens over any transport, on the address given in `address`.
///
/// Each active listener is keyed by the exact argument map that started it.
pub struct GenericListeningConnector {
    transport: Arc<dyn TransportService>,
    context: ConnectorContext,
    schema: ArgumentSchema,
    listening: Mutex<HashMap<ConnectorArguments, ListenKey>>,
}

impl GenericListeningConnector {
    pub fn new(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = Self::pinned_schema(&context).with(ArgumentSpec::string(
            ARG_ADDRESS,
            context.resources.as_ref(),
            "",
            false,
        ));
        Self::with_schema(transport, context, schema)
    }

    fn pinned(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = Self::pinned_schema(&context);
        Self::with_schema(transport, context, schema)
    }

    fn with_schema(
        transport: Arc<dyn TransportService>,
        context: ConnectorContext,
        schema: ArgumentSchema,
    ) -> Self {
        Self {
            transport,
            context,
            schema,
            listening: Mutex::new(HashMap::new()),
        }
    }

    fn pinned_schema(context: &ConnectorContext) -> ArgumentSchema {
        ArgumentSchema::new().with(timeout_spec(context, context.connect.accept_timeout_ms))
    }

    /// Number of listeners started through this connector and not yet stopped.
    pub fn listening_count(&self) -> usize {
        self.listening.lock().len()
    }

    pub fn is_listening(&self, args: &ConnectorArguments) -> bool {
        self.listening.lock().contains_key(args)
    }

    fn ensure_not_listening(&self, args: &ConnectorArguments) -> Result<()> {
        if self.is_listening(args) {
            return Err(JdiError::argument(ARG_ADDRESS, "already listening"));
        }
        Ok(())
    }

    /// Records `key` under `args`. The listener is released if `args` is
    /// already taken.
    fn register(&self, args: ConnectorArguments, key: ListenKey) -> Result<()> {
        let mut listening = self.listening.lock();
        if listening.contains_key(&args) {
            drop(listening);
            let _guard = ListenGuard::new(self.transport.as_ref(), key);
            return Err(JdiError::argument(ARG_ADDRESS, "already listening"));
        }
        listening.insert(args, key);
        Ok(())
    }

    fn listen_at(&self, address: &str) -> Result<ListenKey> {
        let address = (!address.is_empty()).then_some(address);
        self.transport.start_listening(address)
    }

    fn accept_on(&self, key: &ListenKey, args: &ConnectorArguments) -> Result<Session> {
        let timeout = timeout_ms(args)?;
        tracing::debug!(
            target: "nova.jdi",
            transport = self.transport.name(),
            address = key.address(),
            timeout_ms = timeout,
            "waiting for target"
        );
        let connection =
            self.transport
                .accept(key, timeout, self.context.connect.handshake_timeout_ms)?;
        Ok(self.context.builder.build(connection))
    }

    /// Accepts on the listener registered for `args`, or on one that lives only
    /// for this call.
    fn accept_with(
        &self,
        args: &ConnectorArguments,
        address: impl FnOnce(&ConnectorArguments) -> String,
    ) -> Result<Session> {
        let registered = self.listening.lock().get(args).cloned();
        if let Some(key) = registered {
            return self.accept_on(&key, args);
        }
        let key = self.listen_at(&address(args))?;
        let guard = ListenGuard::new(self.transport.as_ref(), key);
        self.accept_on(guard.key(), args)
    }
}

impl Connector for GenericListeningConnector {
    fn name(&self) -> String {
        format!("{}Listen", self.transport.name())
    }

    fn description(&self) -> String {
        self.context
            .string("connector.generic_listening.description")
            .replace("{transport}", self.transport.name())
    }

    fn transport_name(&self) -> String {
        self.transport.name().to_string()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl ListeningConnector for GenericListeningConnector {
    fn start_listening(&self, args: &mut ConnectorArguments) -> Result<String> {
        args.validate(&self.schema)?;
        self.ensure_not_listening(args)?;
        let key = self.listen_at(args.string(ARG_ADDRESS))?;
        let address = key.address().to_string();
        self.register(args.clone(), key)?;
        Ok(address)
    }

    fn stop_listening(&self, args: &ConnectorArguments) -> Result<()> {
        let key = self
            .listening
            .lock()
            .remove(args)
            .ok_or_else(|| JdiError::argument(ARG_ADDRESS, "not listening"))?;
        self.transport.stop_listening(&key)
    }

    fn accept(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        self.accept_with(args, |args| args.string(ARG_ADDRESS).to_string())
    }
}

/// Listens on a TCP port, optionally bound to `localAddress`.
pub struct SocketListeningConnector {
    generic: GenericListeningConnector,
    schema: ArgumentSchema,
}

impl SocketListeningConnector {
    pub fn new(context: ConnectorContext) -> Self {
        Self::with_transport(Arc::new(SocketTransport::new()), context)
    }

    pub fn with_transport(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = GenericListeningConnector::pinned_schema(&context)
            .with(ArgumentSpec::integer(
                ARG_PORT,
                context.resources.as_ref(),
                "",
                false,
                0,
                i64::from(u16::MAX),
            ))
            .with(ArgumentSpec::string(
                ARG_LOCAL_ADDRESS,
                context.resources.as_ref(),
                "",
                false,
            ));
        Self {
            generic: GenericListeningConnector::pinned(transport, context),
            schema,
        }
    }

    pub fn listening_count(&self) -> usize {
        self.generic.listening_count()
    }

    fn address(args: &ConnectorArguments) -> String {
        let port = match args.string(ARG_PORT) {
            "" => "0",
            port => port,
        };
        match args.string(ARG_LOCAL_ADDRESS) {
            "" => port.to_string(),
            local => format!("{local}:{port}"),
        }
    }

    fn is_wildcard_port(args: &ConnectorArguments) -> bool {
        matches!(args.string(ARG_PORT), "" | "0")
    }
}

impl Connector for SocketListeningConnector {
    fn name(&self) -> String {
        self.generic.name()
    }

    fn description(&self) -> String {
        self.generic
            .context
            .string("connector.socket_listening.description")
    }

    fn transport_name(&self) -> String {
        self.generic.transport_name()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl ListeningConnector for SocketListeningConnector {
    fn start_listening(&self, args: &mut ConnectorArguments) -> Result<String> {
        args.validate(&self.schema)?;
        if !Self::is_wildcard_port(args) {
            self.generic.ensure_not_listening(args)?;
        }
        let key = self.generic.listen_at(&Self::address(args))?;
        if Self::is_wildcard_port(args) {
            if let Some(port) = key.port() {
                args.set(ARG_PORT, port);
            }
        }
        let address = key.address().to_string();
        self.generic.register(args.clone(), key)?;
        Ok(address)
    }

    fn stop_listening(&self, args: &ConnectorArguments) -> Result<()> {
        self.generic.stop_listening(args)
    }

    fn accept(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        self.generic.accept_with(args, Self::address)
    }
}
