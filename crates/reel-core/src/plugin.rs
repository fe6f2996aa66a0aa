//! Plugin registry
//!
//! The registry is an explicit object handed to each [`crate::Player`]; there
//! is no process-wide plugin list. Capability is expressed through
//! [`PluginKind`], never through runtime type inspection.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::EventHub;
use crate::error::Result;
use crate::playback::Playback;

/// Where a plugin lives, and therefore how long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// Created with the player, bound to every playback it loads
    Core,
    /// Created with the player, bound to every playback it loads, after core plugins
    Container,
    /// Created for one playback, destroyed with it
    Playback,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginKind::Core => write!(f, "core"),
            PluginKind::Container => write!(f, "container"),
            PluginKind::Playback => write!(f, "playback"),
        }
    }
}

pub trait Plugin {
    fn name(&self) -> &str;

    fn kind(&self) -> PluginKind;

    /// Attach to a freshly loaded playback
    fn bind(&mut self, playback: &Rc<Playback>) -> Result<()>;

    /// Drop every registration and resource; called once
    fn destroy(&mut self) {}

    /// Plugin specific state for inspection (CLI, diagnostics)
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Builds a plugin instance for a player's hub
pub type PluginFactory = Rc<dyn Fn(&EventHub) -> Box<dyn Plugin>>;

#[derive(Clone)]
struct Entry {
    name: String,
    kind: PluginKind,
    factory: PluginFactory,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<Entry>,
    initialized: bool,
}

impl PluginRegistry {
    /// An empty registry; call [`PluginRegistry::init`] for the built-ins
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in plugins. Idempotent.
    pub fn init(&mut self) -> &mut Self {
        if self.initialized {
            return self;
        }
        self.initialized = true;

        #[cfg(feature = "analytics")]
        self.register(
            crate::analytics::PLUGIN_NAME,
            PluginKind::Container,
            |hub: &EventHub| -> Box<dyn Plugin> {
                Box::new(crate::analytics::AnalyticsPlugin::new(hub))
            },
        );

        debug!(plugins = self.entries.len(), "plugin registry initialized");
        self
    }

    /// Forget every registration, built-ins included
    pub fn reset(&mut self) {
        self.entries.clear();
        self.initialized = false;
    }

    /// Register a plugin. A registration under an existing name replaces it
    /// in place.
    pub fn register<F>(&mut self, name: impl Into<String>, kind: PluginKind, factory: F) -> &mut Self
    where
        F: Fn(&EventHub) -> Box<dyn Plugin> + 'static,
    {
        let entry = Entry {
            name: name.into(),
            kind,
            factory: Rc::new(factory),
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => {
                debug!(plugin = %entry.name, "plugin replaced");
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
        self
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        before != self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<PluginKind> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New instances of every plugin of `kind`, in registration order
    pub fn instantiate(&self, kind: PluginKind, hub: &EventHub) -> Vec<Box<dyn Plugin>> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (e.factory)(hub))
            .collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .field("initialized", &self.initialized)
            .finish()
    }
}
