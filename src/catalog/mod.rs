//! Command catalog
//!
//! An immutable registry of [`CommandDescriptor`]s keyed by identifier.
//! A catalog is built once and handed to the protocol handler; there is no
//! way to add or remove commands afterwards.

mod builtin;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CbError, Result};

pub use builtin::BUILTIN_COMMANDS;

/// A single named command exposed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Unique key, e.g. `/cb:build`
    pub identifier: String,
    /// Human-readable description (may be localized)
    pub description: String,
    /// Argument names the command understands, flags included
    #[serde(default)]
    pub accepted_arguments: Vec<String>,
    /// Example invocations, for help output only
    #[serde(default)]
    pub examples: Vec<String>,
}

impl CommandDescriptor {
    pub fn new(identifier: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: description.into(),
            accepted_arguments: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }
}

/// Read-only command registry preserving insertion order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    commands: Vec<CommandDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting repeated identifiers
    pub fn new(commands: Vec<CommandDescriptor>) -> Result<Self> {
        let (index, duplicate) = index_commands(&commands);
        if let Some(identifier) = duplicate {
            return Err(CbError::DuplicateCommand(identifier.to_string()));
        }
        Ok(Self { commands, index })
    }

    /// A catalog with no commands
    pub fn empty() -> Self {
        Self::default()
    }

    /// The bundled CulturaBuilder `/cb:` commands
    pub fn builtin() -> Self {
        let commands: Vec<CommandDescriptor> = BUILTIN_COMMANDS
            .iter()
            .map(|(identifier, description, arguments, examples)| {
                CommandDescriptor::new(*identifier, *description)
                    .with_arguments(arguments.iter().copied())
                    .with_examples(examples.iter().copied())
            })
            .collect();

        let (index, duplicate) = index_commands(&commands);
        debug_assert!(
            duplicate.is_none(),
            "bundled command table repeats {:?}",
            duplicate
        );
        if let Some(identifier) = duplicate {
            tracing::error!("Bundled command table repeats {}, keeping the first", identifier);
        }

        Self { commands, index }
    }

    /// Every descriptor, in insertion order
    pub fn list_all(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Exact-match lookup
    pub fn get(&self, identifier: &str) -> Option<&CommandDescriptor> {
        self.index
            .get(identifier)
            .and_then(|&position| self.commands.get(position))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.identifier.as_str())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Position of each identifier, keeping the first occurrence, plus the first
/// identifier that appears more than once
fn index_commands(commands: &[CommandDescriptor]) -> (HashMap<String, usize>, Option<&str>) {
    let mut index = HashMap::with_capacity(commands.len());
    let mut duplicate = None;
    for (position, command) in commands.iter().enumerate() {
        if index.contains_key(&command.identifier) {
            duplicate.get_or_insert(command.identifier.as_str());
        } else {
            index.insert(command.identifier.clone(), position);
        }
    }
    (index, duplicate)
}
