//! Launching connectors: start a target process that connects back to a
//! listener opened just for it.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use crate::connect::argument::{ArgumentSchema, ArgumentSpec, ConnectorArguments};
use crate::connect::attach::ARG_ADDRESS;
use crate::connect::socket::SocketTransport;
use crate::connect::transport::{default_transport, ListenGuard, ListenKey, TransportService};
use crate::connect::{Connector, ConnectorContext, LaunchingConnector};
use crate::error::{JdiError, Result};
use crate::session::Session;

const ARG_COMMAND: &str = "command";
const ARG_QUOTE: &str = "quote";
const ARG_HOME: &str = "home";
const ARG_OPTIONS: &str = "options";
const ARG_MAIN: &str = "main";
const ARG_SUSPEND: &str = "suspend";
const ARG_VMEXEC: &str = "vmexec";

/// Replaced by the listen address in raw launch commands.
pub const ADDRESS_MARKER: &str = "{address}";

/// A launched target process owned by a session.
pub trait TargetProcess: Send {
    fn id(&self) -> u32;

    /// Terminates the process and reaps it.
    fn kill(&mut self) -> io::Result<()>;

    /// Exit code if the process has already exited.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;
}

impl TargetProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        match Child::kill(self) {
            Ok(()) => {}
            // Already exited.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err),
        }
        self.wait().map(|_| ())
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(Child::try_wait(self)?.map(|status| status.code().unwrap_or(-1)))
    }
}

/// Human-readable rendering of an argv, for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a>(pub &'a [String]);

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, "\"{}\"", arg.replace('"', "\\\""))?;
            } else {
                f.write_str(arg)?;
            }
        }
        Ok(())
    }
}

/// Starts processes from an argv.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, argv: &[String]) -> Result<Box<dyn TargetProcess>>;
}

/// Spawns real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessLauncher;

impl ProcessLauncher for SystemProcessLauncher {
    fn launch(&self, argv: &[String]) -> Result<Box<dyn TargetProcess>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| JdiError::argument(ARG_COMMAND, "command is empty"))?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| JdiError::Launch {
                command: CommandLine(argv).to_string(),
                source,
            })?;
        tracing::debug!(target: "nova.jdi", pid = child.id(), command = %CommandLine(argv), "launched target");
        Ok(Box::new(child))
    }
}

/// Splits `command` at whitespace. Text between two `quote` characters is
/// kept together, and a quoted section joins any adjacent unquoted text.
pub fn tokenize_command(command: &str, quote: Option<char>) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current: Option<String> = None;
    let mut quoted = false;
    for c in command.chars() {
        if Some(c) == quote {
            quoted = !quoted;
            current.get_or_insert_with(String::new);
        } else if c.is_whitespace() && !quoted {
            args.extend(current.take());
        } else {
            current.get_or_insert_with(String::new).push(c);
        }
    }
    if quoted {
        return Err(JdiError::argument(ARG_COMMAND, "unmatched quote"));
    }
    args.extend(current);
    Ok(args)
}

/// Puts `address` where the template names [`ADDRESS_MARKER`].
fn substitute_address(template: &str, address: &str, quote: Option<char>) -> String {
    let replacement = match quote {
        Some(q) if address.chars().any(char::is_whitespace) => format!("{q}{address}{q}"),
        _ => address.to_string(),
    };
    template.replace(ADDRESS_MARKER, &replacement)
}

fn parse_quote(args: &ConnectorArguments) -> Result<Option<char>> {
    let mut chars = args.get(ARG_QUOTE).unwrap_or_default().chars();
    match (chars.next(), chars.next()) {
        (quote, None) => Ok(quote),
        _ => Err(JdiError::argument(
            ARG_QUOTE,
            "quote must be a single character",
        )),
    }
}

/// Listens, starts the target, and waits for it to connect back.
///
/// The listener is released on every path; the process is killed when it
/// never connects.
fn launch_and_accept(
    transport: &dyn TransportService,
    context: &ConnectorContext,
    launcher: &dyn ProcessLauncher,
    address: Option<&str>,
    argv: impl FnOnce(&ListenKey) -> Result<Vec<String>>,
) -> Result<Session> {
    let key = transport.start_listening(address)?;
    let guard = ListenGuard::new(transport, key);
    let argv = argv(guard.key())?;
    let mut process = launcher.launch(&argv)?;

    let connection = match transport.accept(
        guard.key(),
        context.connect.accept_timeout_ms,
        context.connect.handshake_timeout_ms,
    ) {
        Ok(connection) => connection,
        Err(err) => {
            if let Err(kill_err) = process.kill() {
                tracing::warn!(
                    target: "nova.jdi",
                    pid = process.id(),
                    error = %kill_err,
                    "failed to kill target that never connected"
                );
            }
            return Err(err);
        }
    };
    drop(guard);
    Ok(context.builder.build_with_process(connection, process))
}

/// Launches a user-supplied command line.
///
/// The target must connect back to `address` on its own; a command containing
/// [`ADDRESS_MARKER`] gets the address filled in.
pub struct RawCommandLineLauncher {
    transport: Arc<dyn TransportService>,
    launcher: Arc<dyn ProcessLauncher>,
    context: ConnectorContext,
    schema: ArgumentSchema,
}

impl RawCommandLineLauncher {
    pub fn new(context: ConnectorContext) -> Self {
        let transport = default_transport(&context.transport.preferred);
        Self::with_parts(transport, Arc::new(SystemProcessLauncher), context)
    }

    pub fn with_parts(
        transport: Arc<dyn TransportService>,
        launcher: Arc<dyn ProcessLauncher>,
        context: ConnectorContext,
    ) -> Self {
        let resources = context.resources.as_ref();
        let schema = ArgumentSchema::new()
            .with(ArgumentSpec::string(ARG_COMMAND, resources, "", true))
            .with(ArgumentSpec::string(ARG_QUOTE, resources, "\"", true).verbatim())
            .with(ArgumentSpec::string(ARG_ADDRESS, resources, "", true));
        Self {
            transport,
            launcher,
            context,
            schema,
        }
    }
}

impl Connector for RawCommandLineLauncher {
    fn name(&self) -> String {
        "RawCommandLineLaunch".to_string()
    }

    fn description(&self) -> String {
        self.context.string("connector.raw_command_line.description")
    }

    fn transport_name(&self) -> String {
        self.transport.name().to_string()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl LaunchingConnector for RawCommandLineLauncher {
    fn launch(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        let quote = parse_quote(args)?;
        let address = args.string(ARG_ADDRESS);
        let command = substitute_address(args.string(ARG_COMMAND), address, quote);
        let argv = tokenize_command(&command, quote)?;
        if argv.is_empty() {
            return Err(JdiError::argument(ARG_COMMAND, "command is empty"));
        }

        launch_and_accept(
            self.transport.as_ref(),
            &self.context,
            self.launcher.as_ref(),
            Some(address),
            |_| Ok(argv),
        )
    }
}

/// Launches a Java VM with the JDWP agent pointed back at a fresh socket
/// listener.
pub struct JavaCommandLineLauncher {
    transport: Arc<dyn TransportService>,
    launcher: Arc<dyn ProcessLauncher>,
    context: ConnectorContext,
    schema: ArgumentSchema,
}

impl JavaCommandLineLauncher {
    pub fn new(context: ConnectorContext) -> Self {
        Self::with_parts(
            Arc::new(SocketTransport::new()),
            Arc::new(SystemProcessLauncher),
            context,
        )
    }

    pub fn with_parts(
        transport: Arc<dyn TransportService>,
        launcher: Arc<dyn ProcessLauncher>,
        context: ConnectorContext,
    ) -> Self {
        let home = std::env::var("JAVA_HOME").unwrap_or_default();
        let resources = context.resources.as_ref();
        let schema = ArgumentSchema::new()
            .with(ArgumentSpec::string(ARG_HOME, resources, &home, false))
            .with(ArgumentSpec::string(ARG_OPTIONS, resources, "", false))
            .with(ArgumentSpec::string(ARG_MAIN, resources, "", true))
            .with(ArgumentSpec::boolean(ARG_SUSPEND, resources, true, false))
            .with(ArgumentSpec::string(ARG_QUOTE, resources, "\"", true).verbatim())
            .with(ArgumentSpec::string(ARG_VMEXEC, resources, "java", true));
        Self {
            transport,
            launcher,
            context,
            schema,
        }
    }

    fn command(args: &ConnectorArguments, quote: Option<char>, address: &str) -> Result<String> {
        let vmexec = args.string(ARG_VMEXEC);
        let exe = match args.string(ARG_HOME) {
            "" => vmexec.to_string(),
            home => Path::new(home).join("bin").join(vmexec).display().to_string(),
        };
        let exe = match quote {
            Some(q) if exe.chars().any(char::is_whitespace) => format!("{q}{exe}{q}"),
            _ => exe,
        };
        let suspend = if args.boolean(ARG_SUSPEND)?.unwrap_or(true) {
            'y'
        } else {
            'n'
        };
        Ok(format!(
            "{exe} {} -agentlib:jdwp=transport=dt_socket,address={address},suspend={suspend} {}",
            args.string(ARG_OPTIONS),
            args.string(ARG_MAIN),
        ))
    }
}

impl Connector for JavaCommandLineLauncher {
    fn name(&self) -> String {
        "CommandLineLaunch".to_string()
    }

    fn description(&self) -> String {
        self.context.string("connector.command_line.description")
    }

    fn transport_name(&self) -> String {
        self.transport.name().to_string()
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }
}

impl LaunchingConnector for JavaCommandLineLauncher {
    fn launch(&self, args: &ConnectorArguments) -> Result<Session> {
        args.validate(&self.schema)?;
        let quote = parse_quote(args)?;
        // Fail on bad quoting before a listener exists.
        tokenize_command(&Self::command(args, quote, "")?, quote)?;

        launch_and_accept(
            self.transport.as_ref(),
            &self.context,
            self.launcher.as_ref(),
            None,
            |key| tokenize_command(&Self::command(args, quote, key.address())?, quote),
        )
    }
}
