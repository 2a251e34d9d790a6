// Vendor command envelopes
//
// Request body for `POST {base}/{device_id}/commands`:
// `{"commands":[{"component","capability","command","arguments":[...]}]}`

use serde::Serialize;
use serde_json::Value;

/// Component every command in this bridge targets.
pub const MAIN_COMPONENT: &str = "main";

/// One vendor-shaped instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub component: String,
    pub capability: String,
    pub command: String,
    pub arguments: Vec<Value>,
}

impl Command {
    /// A command on the `main` component with no arguments.
    pub fn new(capability: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            component: MAIN_COMPONENT.into(),
            capability: capability.into(),
            command: command.into(),
            arguments: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// `refresh/refresh`, asks the device to report fresh state.
    pub fn refresh() -> Self {
        Self::new("refresh", "refresh")
    }

    fn is_refresh(&self) -> bool {
        self.capability == "refresh" && self.command == "refresh"
    }
}

/// A batch of commands sent in one request.
///
/// Always ends with a [`Command::refresh`] so the post-command state is
/// picked up by the next status read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    pub fn new(mut commands: Vec<Command>) -> Self {
        if !commands.last().is_some_and(Command::is_refresh) {
            commands.push(Command::refresh());
        }
        Self { commands }
    }

    pub fn single(command: Command) -> Self {
        Self::new(vec![command])
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
