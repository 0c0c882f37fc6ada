//! Human-readable strings for connectors and their arguments.

use std::collections::HashMap;

/// Source of connector descriptions and argument labels, keyed by
/// `connector.<name>.description`, `argument.<name>.label` and
/// `argument.<name>.description`.
pub trait StringResources: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// English strings shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResources;

const BUILTIN: &[(&str, &str)] = &[
    (
        "connector.generic_attaching.description",
        "Attaches by {transport} to other VMs",
    ),
    (
        "connector.generic_listening.description",
        "Accepts {transport} connections initiated by other VMs",
    ),
    (
        "connector.socket_attaching.description",
        "Attaches by socket to other VMs",
    ),
    (
        "connector.socket_listening.description",
        "Accepts socket connections initiated by other VMs",
    ),
    (
        "connector.raw_command_line.description",
        "Launches target using user-specified command line and attaches to it",
    ),
    (
        "connector.command_line.description",
        "Launches target using the Java VM launcher and attaches to it",
    ),
    ("argument.address.label", "Address"),
    ("argument.address.description", "Address to which to attach or listen for VM connections"),
    ("argument.timeout.label", "Timeout"),
    ("argument.timeout.description", "Timeout while waiting to attach, in milliseconds"),
    ("argument.hostname.label", "Host"),
    ("argument.hostname.description", "Machine name to which to attach for VM connections"),
    ("argument.port.label", "Port"),
    ("argument.port.description", "Port number to use for the connection"),
    ("argument.localAddress.label", "Local address"),
    ("argument.localAddress.description", "Local address that the listener binds to"),
    ("argument.command.label", "Command"),
    ("argument.command.description", "Raw command to start the debugged application VM"),
    ("argument.quote.label", "Quote"),
    ("argument.quote.description", "Character used to combine space-delimited text into a single command line argument"),
    ("argument.home.label", "Home"),
    ("argument.home.description", "Home directory of the SDK or runtime environment used to launch the application"),
    ("argument.options.label", "Options"),
    ("argument.options.description", "Launched VM options"),
    ("argument.main.label", "Main"),
    ("argument.main.description", "Main class and arguments, or if -jar is an option, the main jar file and arguments"),
    ("argument.suspend.label", "Suspend"),
    ("argument.suspend.description", "All threads will be suspended before execution of main"),
    ("argument.vmexec.label", "Launcher"),
    ("argument.vmexec.description", "Name of the Java VM launcher"),
];

impl StringResources for BuiltinResources {
    fn get(&self, key: &str) -> Option<String> {
        BUILTIN
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
    }
}

/// Overrides layered on top of another source (typically [`BuiltinResources`]).
#[derive(Debug, Clone, Default)]
pub struct OverrideResources<R> {
    base: R,
    overrides: HashMap<String, String>,
}

impl<R: StringResources> OverrideResources<R> {
    pub fn new(base: R) -> Self {
        Self {
            base,
            overrides: HashMap::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

impl<R: StringResources> StringResources for OverrideResources<R> {
    fn get(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| self.base.get(key))
    }
}

/// Looks up `key`, falling back to the key itself.
pub fn lookup(resources: &dyn StringResources, key: &str) -> String {
    resources.get(key).unwrap_or_else(|| {
        tracing::debug!(target: "nova.jdi", key, "missing connector string resource");
        key.to_string()
    })
}
