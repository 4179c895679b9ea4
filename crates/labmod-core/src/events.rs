//! Command audit events.
//!
//! Every mutating module operation is bracketed by a `before` and an `after`
//! [`CommandEvent`] carrying the command name and its resolved (validated)
//! arguments. Emission is fire-and-forget: sinks return nothing and the
//! module layer keeps no history of its own.
//!
//! ```rust,ignore
//! let scope = envelope.begin(Command::new("command.TEMPDECK_DEACTIVATE", text, json!({})));
//! let result = driver.deactivate().await.map_err(ModuleError::from);
//! scope.finish(result)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ModuleResult;

/// Which side of the command body an event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPhase {
    Before,
    After,
}

/// One half of a before/after command event pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Shared by the before and after events of one command
    pub id: Uuid,
    pub name: String,
    pub phase: CommandPhase,
    /// Id of the module the command targeted
    pub source: String,
    /// Human-readable description for the run log
    pub text: String,
    /// Resolved arguments, after validation and defaulting
    pub arguments: Value,
    pub timestamp: DateTime<Utc>,
    /// Set on the after event when the command body failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Destination for command events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CommandEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: CommandEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<CommandEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CommandEvent> {
        self.events.lock().clone()
    }

    /// `(name, phase)` pairs, convenient for assertions.
    pub fn timeline(&self) -> Vec<(String, CommandPhase)> {
        self.events
            .lock()
            .iter()
            .map(|e| (e.name.clone(), e.phase))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CommandEvent) {
        self.events.lock().push(event);
    }
}

/// Fans events out to any number of subscribers over a tokio broadcast channel.
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<CommandEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: CommandEvent) {
        let _ = self.sender.send(event);
    }
}

/// A command about to be executed: name, description and resolved arguments.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub text: String,
    pub arguments: Value,
}

impl Command {
    pub fn new(name: &'static str, text: impl Into<String>, arguments: Value) -> Self {
        Self {
            name,
            text: text.into(),
            arguments,
        }
    }
}

/// Emits before/after events for the commands of one module.
#[derive(Clone)]
pub struct CommandEnvelope {
    sink: Arc<dyn EventSink>,
    source: String,
}

impl std::fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("source", &self.source)
            .finish()
    }
}

impl CommandEnvelope {
    pub fn new(sink: Arc<dyn EventSink>, source: impl Into<String>) -> Self {
        Self {
            sink,
            source: source.into(),
        }
    }

    /// Emit the before event and return the scope that will emit the after event.
    pub fn begin(&self, command: Command) -> CommandScope {
        let id = Uuid::new_v4();
        self.sink.emit(CommandEvent {
            id,
            name: command.name.to_string(),
            phase: CommandPhase::Before,
            source: self.source.clone(),
            text: command.text.clone(),
            arguments: command.arguments.clone(),
            timestamp: Utc::now(),
            error: None,
        });
        CommandScope {
            id,
            command,
            sink: Arc::clone(&self.sink),
            source: self.source.clone(),
        }
    }
}

/// An in-flight command whose before event has been emitted.
#[must_use = "dropping a CommandScope loses the after event"]
pub struct CommandScope {
    id: Uuid,
    command: Command,
    sink: Arc<dyn EventSink>,
    source: String,
}

impl CommandScope {
    /// Emit the after event (with the error text on failure) and pass the result through.
    pub fn finish<T>(self, result: ModuleResult<T>) -> ModuleResult<T> {
        self.sink.emit(CommandEvent {
            id: self.id,
            name: self.command.name.to_string(),
            phase: CommandPhase::After,
            source: self.source,
            text: self.command.text,
            arguments: self.command.arguments,
            timestamp: Utc::now(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use serde_json::json;

    fn envelope(sink: &RecordingSink) -> CommandEnvelope {
        CommandEnvelope::new(Arc::new(sink.clone()), "tempdeck-1")
    }

    #[test]
    fn brackets_success_with_matching_ids() {
        let sink = RecordingSink::new();
        let scope = envelope(&sink).begin(Command::new(
            "command.TEMPDECK_SET_TEMP",
            "Setting Temperature Module temperature to 40 °C",
            json!({ "celsius": 40.0 }),
        ));
        let out = scope.finish(Ok(7));
        assert_eq!(out.unwrap(), 7);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, CommandPhase::Before);
        assert_eq!(events[1].phase, CommandPhase::After);
        assert_eq!(events[0].id, events[1].id);
        assert_eq!(events[1].arguments, json!({ "celsius": 40.0 }));
        assert!(events[1].error.is_none());
    }

    #[test]
    fn after_event_carries_error_text() {
        let sink = RecordingSink::new();
        let scope = envelope(&sink).begin(Command::new("command.X", "x", json!({})));
        let out: ModuleResult<()> =
            scope.finish(Err(ModuleError::InterlockViolation("plate is shaking".into())));
        assert!(out.is_err());
        let after = &sink.events()[1];
        assert!(after.error.as_deref().unwrap().contains("plate is shaking"));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let envelope = CommandEnvelope::new(Arc::new(sink.clone()), "hs-1");
        envelope
            .begin(Command::new("command.HEATER_SHAKER_DEACTIVATE_HEATER", "Deactivating heater", json!({})))
            .finish(Ok(()))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().phase, CommandPhase::Before);
        assert_eq!(rx.recv().await.unwrap().phase, CommandPhase::After);
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(1);
        sink.emit(CommandEvent {
            id: Uuid::new_v4(),
            name: "command.X".into(),
            phase: CommandPhase::Before,
            source: "m".into(),
            text: String::new(),
            arguments: Value::Null,
            timestamp: Utc::now(),
            error: None,
        });
    }
}
