//! Connector argument schemas and argument maps.
//!
//! Every argument value is a string, whatever its declared kind; integer and
//! boolean arguments hold their canonical string form.

use std::collections::BTreeMap;
use std::fmt;

use crate::connect::resources::{lookup, StringResources};
use crate::error::{JdiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    String,
    Integer { min: i64, max: i64 },
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    name: String,
    label: String,
    description: String,
    default: String,
    must_specify: bool,
    kind: ArgumentKind,
    verbatim: bool,
}

impl ArgumentSpec {
    fn new(
        name: &str,
        resources: &dyn StringResources,
        default: String,
        must_specify: bool,
        kind: ArgumentKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            label: lookup(resources, &format!("argument.{name}.label")),
            description: lookup(resources, &format!("argument.{name}.description")),
            default,
            must_specify,
            kind,
            verbatim: false,
        }
    }

    pub fn string(
        name: &str,
        resources: &dyn StringResources,
        default: &str,
        must_specify: bool,
    ) -> Self {
        Self::new(name, resources, default.to_string(), must_specify, ArgumentKind::String)
    }

    pub fn integer(
        name: &str,
        resources: &dyn StringResources,
        default: &str,
        must_specify: bool,
        min: i64,
        max: i64,
    ) -> Self {
        Self::new(
            name,
            resources,
            default.to_string(),
            must_specify,
            ArgumentKind::Integer { min, max },
        )
    }

    pub fn boolean(
        name: &str,
        resources: &dyn StringResources,
        default: bool,
        must_specify: bool,
    ) -> Self {
        Self::new(name, resources, default.to_string(), must_specify, ArgumentKind::Boolean)
    }

    /// Keeps surrounding whitespace, so a blank value such as a tab counts
    /// as given.
    pub fn verbatim(mut self) -> Self {
        self.verbatim = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn must_specify(&self) -> bool {
        self.must_specify
    }

    pub fn kind(&self) -> &ArgumentKind {
        &self.kind
    }

    /// Checks `value` against this argument: required-ness first, then kind.
    pub fn check(&self, value: Option<&str>) -> Result<()> {
        let value = value.unwrap_or_default();
        let value = if self.verbatim { value } else { value.trim() };
        if value.is_empty() {
            if self.must_specify {
                return Err(JdiError::argument(&self.name, "argument must be specified"));
            }
            return Ok(());
        }
        match self.kind {
            ArgumentKind::String => Ok(()),
            ArgumentKind::Integer { min, max } => {
                let parsed: i64 = value.parse().map_err(|_| {
                    JdiError::argument(&self.name, format!("`{value}` is not an integer"))
                })?;
                if !(min..=max).contains(&parsed) {
                    return Err(JdiError::argument(
                        &self.name,
                        format!("{parsed} is outside the range {min}..={max}"),
                    ));
                }
                Ok(())
            }
            ArgumentKind::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(JdiError::argument(
                    &self.name,
                    format!("`{value}` is not `true` or `false`"),
                )),
            },
        }
    }
}

/// The arguments a connector understands, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSchema {
    specs: Vec<ArgumentSpec>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, spec: ArgumentSpec) -> Self {
        self.specs.retain(|existing| existing.name != spec.name);
        self.specs.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.specs.iter()
    }

    pub fn default_arguments(&self) -> ConnectorArguments {
        self.specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect()
    }
}

/// Concrete argument values, name → string value.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectorArguments {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for ConnectorArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectorArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConnectorArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value of `name`, or `""` when unset.
    pub fn string(&self, name: &str) -> &str {
        self.get(name).map(str::trim).unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parsed integer value; `None` when empty.
    pub fn integer(&self, name: &str) -> Result<Option<i64>> {
        let value = self.string(name);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse()
            .map(Some)
            .map_err(|_| JdiError::argument(name, format!("`{value}` is not an integer")))
    }

    /// Parsed boolean value; `None` when empty.
    pub fn boolean(&self, name: &str) -> Result<Option<bool>> {
        match self.string(name) {
            "" => Ok(None),
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(JdiError::argument(
                name,
                format!("`{other}` is not `true` or `false`"),
            )),
        }
    }

    /// Checks every argument against `schema`, in schema order.
    ///
    /// Unknown argument names are rejected too, so a typo cannot silently fall
    /// back to a default.
    pub fn validate(&self, schema: &ArgumentSchema) -> Result<()> {
        if let Some(unknown) = self.values.keys().find(|name| !schema.contains(name)) {
            return Err(JdiError::argument(unknown.as_str(), "unknown argument"));
        }
        schema
            .iter()
            .try_for_each(|spec| spec.check(self.get(spec.name())))
    }
}
