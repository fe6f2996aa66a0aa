//! Player - source loading and component lifecycle
//!
//! Coordinates:
//! - engine selection for a source
//! - playback replacement on every load
//! - plugin instantiation and binding
//! - teardown of everything it created

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info, instrument, warn};

use crate::bus::{EventBus, EventHub, EventSource};
use crate::engine::MediaEngine;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::options::Options;
use crate::playback::Playback;
use crate::plugin::{Plugin, PluginKind, PluginRegistry};
use crate::types::SessionId;

/// Creates engines for the sources it supports
pub trait EngineFactory {
    fn name(&self) -> &str;

    fn can_play(&self, options: &Options) -> bool;

    fn create(&self, options: &Options) -> Result<Box<dyn MediaEngine>>;
}

/// Owns the hub, the active playback and the plugins bound to it
pub struct Player {
    id: SessionId,
    hub: EventHub,
    bus: EventBus,
    options: RefCell<Options>,
    factories: Vec<Box<dyn EngineFactory>>,
    registry: PluginRegistry,
    /// Core and container plugins, alive as long as the player
    plugins: RefCell<Vec<Box<dyn Plugin>>>,
    /// Plugins of the current playback
    playback_plugins: RefCell<Vec<Box<dyn Plugin>>>,
    playback: RefCell<Option<Rc<Playback>>>,
    destroyed: Cell<bool>,
}

impl Player {
    /// Create a player; core and container plugins are instantiated now
    pub fn new(options: Options, registry: &PluginRegistry) -> Self {
        let hub = EventHub::new();
        let mut plugins = registry.instantiate(PluginKind::Core, &hub);
        plugins.extend(registry.instantiate(PluginKind::Container, &hub));

        let player = Self {
            id: SessionId::new(),
            bus: EventBus::new(&hub, "player"),
            hub,
            options: RefCell::new(options),
            factories: Vec::new(),
            registry: registry.clone(),
            plugins: RefCell::new(plugins),
            playback_plugins: RefCell::new(Vec::new()),
            playback: RefCell::new(None),
            destroyed: Cell::new(false),
        };
        info!(session_id = %player.id, plugins = player.plugins.borrow().len(), "player created");
        player
    }

    /// Add an engine factory; factories are tried in the order added
    pub fn with_engine_factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn options(&self) -> Options {
        self.options.borrow().clone()
    }

    /// Replace the options used by the next load
    pub fn set_options(&self, options: Options) {
        *self.options.borrow_mut() = options;
        self.bus.trigger(Event::DidUpdateOptions);
    }

    /// The active playback
    pub fn playback(&self) -> Option<Rc<Playback>> {
        self.playback.borrow().clone()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        let plugins = self.plugins.borrow();
        let playback_plugins = self.playback_plugins.borrow();
        plugins
            .iter()
            .chain(playback_plugins.iter())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Inspect a plugin by name
    pub fn plugin_snapshot(&self, name: &str) -> Option<serde_json::Value> {
        let plugins = self.plugins.borrow();
        let playback_plugins = self.playback_plugins.borrow();
        plugins
            .iter()
            .chain(playback_plugins.iter())
            .find(|p| p.name() == name)
            .map(|p| p.snapshot())
    }

    /// Load a source, replacing the active playback
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn load(&self, source: &str, mime_type: Option<&str>) -> Result<Rc<Playback>> {
        if self.destroyed.get() {
            return Err(Error::PlaybackDestroyed);
        }
        self.bus.trigger(Event::WillLoadSource);

        let engine = self.resolve_engine(source, mime_type);
        let (options, engine) = match engine {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(source, error = %e, "source not loaded");
                self.bus.trigger(Event::DidNotLoadSource);
                return Err(e);
            }
        };

        self.bus.trigger(Event::WillChangePlayback);
        self.teardown_playback();

        let playback = Playback::new(&self.hub, options.clone(), engine);
        *self.options.borrow_mut() = options;
        *self.playback.borrow_mut() = Some(Rc::clone(&playback));
        self.bind_plugins(&playback);

        self.bus.trigger(Event::DidChangePlayback);
        self.bus.trigger(Event::DidLoadSource);
        info!(playback = %playback.name(), "source loaded");
        Ok(playback)
    }

    fn resolve_engine(
        &self,
        source: &str,
        mime_type: Option<&str>,
    ) -> Result<(Options, Box<dyn MediaEngine>)> {
        let mut options = self.options.borrow().clone();
        options.source = Options::for_source(source)?.source;
        options.mime_type = mime_type.map(String::from);

        let factory = self
            .factories
            .iter()
            .find(|f| f.can_play(&options))
            .ok_or_else(|| Error::UnsupportedSource {
                source_url: source.to_string(),
            })?;
        debug!(factory = factory.name(), "engine selected");
        let engine = factory.create(&options)?;
        Ok((options, engine))
    }

    fn bind_plugins(&self, playback: &Rc<Playback>) {
        let fresh = self.registry.instantiate(PluginKind::Playback, &self.hub);
        *self.playback_plugins.borrow_mut() = fresh;

        let mut plugins = self.plugins.borrow_mut();
        let mut playback_plugins = self.playback_plugins.borrow_mut();
        for plugin in plugins.iter_mut().chain(playback_plugins.iter_mut()) {
            if let Err(e) = plugin.bind(playback) {
                warn!(plugin = plugin.name(), kind = %plugin.kind(), error = %e, "plugin failed to bind");
            }
        }
    }

    fn teardown_playback(&self) {
        let previous = self.playback.borrow_mut().take();
        let plugins = std::mem::take(&mut *self.playback_plugins.borrow_mut());
        for mut plugin in plugins {
            plugin.destroy();
        }
        if let Some(playback) = previous {
            playback.destroy();
        }
    }

    /// Tear down playback and plugins. Idempotent.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.bus.trigger(Event::WillDestroy);
        self.teardown_playback();
        let plugins = std::mem::take(&mut *self.plugins.borrow_mut());
        for mut plugin in plugins {
            plugin.destroy();
        }
        self.bus.trigger(Event::DidDestroy);
        self.bus.stop_listening();
        info!("player destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl EventSource for Player {
    fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}
