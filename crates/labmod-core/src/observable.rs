//! Observable values
//!
//! Watch-backed values with change notifications, used for module target
//! state and thermocycler profile progress. Readers call [`Observable::get`];
//! anything that wants to follow changes (a run monitor, a UI) subscribes.
//!
//! # Example
//!
//! ```rust,ignore
//! let target = Observable::new("target_temperature", None::<f64>).with_units("°C");
//! let mut rx = target.subscribe();
//! target.set(Some(40.0));
//! rx.changed().await?;
//! assert_eq!(*rx.borrow(), Some(40.0));
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Metadata for an observable value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Name (unique within module)
    pub name: String,
    /// Physical units (e.g., "°C", "rpm")
    pub units: Option<String>,
}

/// A thread-safe value with change notifications.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    metadata: ObservableMetadata,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            metadata: ObservableMetadata {
                name: name.into(),
                units: None,
            },
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.metadata.units = Some(units.into());
        self
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ObservableMetadata {
        &self.metadata
    }

    /// Replace the value, notifying all subscribers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Update the value in place, notifying all subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.sender.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}
