use std::sync::Arc;

use crate::connect::argument::{ArgumentSchema, ArgumentSpec, ConnectorArguments};
use crate::connect::socket::SocketTransport;
use crate::connect::transport::TransportService;
use crate::connect::{AttachingConnector, Connector, ConnectorContext};
use crate::error::{JdiError, Result};
use crate::session::Session;

pub(crate) const ARG_ADDRESS: &str = "address";
pub(crate) const ARG_TIMEOUT: &str = "timeout";
pub(crate) const ARG_HOSTNAME: &str = "hostname";
pub(crate) const ARG_PORT: &str = "port";

/// `timeout` argument shared by attaching and listening connectors. Empty
/// means wait indefinitely.
pub(crate) fn timeout_spec(context: &ConnectorContext, default_ms: u64) -> ArgumentSpec {
    let default = if default_ms == 0 {
        String::new()
    } else {
        default_ms.to_string()
    };
    ArgumentSpec::integer(
        ARG_TIMEOUT,
        context.resources.as_ref(),
        &default,
        false,
        0,
        i64::from(i32::MAX),
    )
}

/// Reads the validated `timeout` argument.
pub(crate) fn timeout_ms(args: &ConnectorArguments) -> Result<u64> {
    let timeout = args.integer(ARG_TIMEOUT)?.unwrap_or(0);
    u64::try_from(timeout)
        .map_err(|_| JdiError::argument(ARG_TIMEOUT, "timeout must not be negative"))
}

/// Attaches over any transport, to the address given in `address`.
pub struct GenericAttachingConnector {
    transport: Arc<dyn TransportService>,
    context: ConnectorContext,
    schema: ArgumentSchema,
}

impl GenericAttachingConnector {
    pub fn new(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = Self::pinned_schema(&context).with(ArgumentSpec::string(
            ARG_ADDRESS,
            context.resources.as_ref(),
            "",
            true,
        ));
        Self {
            transport,
            context,
            schema,
        }
    }

    /// Connector whose address is derived from other arguments by a wrapper.
    fn pinned(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = Self::pinned_schema(&context);
        Self {
            transport,
            context,
            schema,
        }
    }

    fn pinned_schema(context: &ConnectorContext) -> ArgumentSchema {
        ArgumentSchema::new().with(timeout_spec(context, context.connect.attach_timeout_ms))
    }

    pub(crate) fn attach_to(&self, address: &str, args: &ConnectorArguments) -> Result<Session> {
        let timeout = timeout_ms(args)?;
        tracing::debug!(
            target: "nova.jdi",
            transport = self.transport.name(),
            address,
            timeout_ms = timeout,
            "attaching"
        );
        let connection =
            self.transport
                .attach(address, timeout, self.context.connect.handshake_timeout_ms)?;
        Ok(self.context.builder.build(connection))
    }
}

impl Connector for GenericAttachingConnector {
    fn name(&self) -> String {
        format!("{}Attach", self.transport.name())
    }

    fn description(&self) -> String {
        self.context
            .string("connector.generic_attaching.description")
            .replace("{transport}", self.transport.name())
    }

    fn transport_name(&self) -> String {
        self.transport.name().to_string()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl AttachingConnector for GenericAttachingConnector {
    fn attach(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        self.attach_to(args.string(ARG_ADDRESS), args)
    }
}

/// Attaches over TCP to `hostname`:`port`.
pub struct SocketAttachingConnector {
    generic: GenericAttachingConnector,
    schema: ArgumentSchema,
}

impl SocketAttachingConnector {
    pub fn new(context: ConnectorContext) -> Self {
        Self::with_transport(Arc::new(SocketTransport::new()), context)
    }

    pub fn with_transport(transport: Arc<dyn TransportService>, context: ConnectorContext) -> Self {
        let schema = GenericAttachingConnector::pinned_schema(&context)
            .with(ArgumentSpec::string(
                ARG_HOSTNAME,
                context.resources.as_ref(),
                "localhost",
                false,
            ))
            .with(ArgumentSpec::integer(
                ARG_PORT,
                context.resources.as_ref(),
                "",
                true,
                0,
                i64::from(u16::MAX),
            ));
        Self {
            generic: GenericAttachingConnector::pinned(transport, context),
            schema,
        }
    }

    fn address(args: &ConnectorArguments) -> String {
        let host = args.string(ARG_HOSTNAME);
        let port = args.string(ARG_PORT);
        if host.is_empty() {
            port.to_string()
        } else {
            format!("{host}:{port}")
        }
    }
}

impl Connector for SocketAttachingConnector {
    fn name(&self) -> String {
        self.generic.name()
    }

    fn description(&self) -> String {
        self.generic
            .context
            .string("connector.socket_attaching.description")
    }

    fn transport_name(&self) -> String {
        self.generic.transport_name()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl AttachingConnector for SocketAttachingConnector {
    fn attach(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        self.generic.attach_to(&Self::address(args), args)
    }
}
