//! The host analysis context.
//!
//! A `Host` owns everything platform support registers into: the
//! architectures it can hand out, the image-format loaders, and the platform
//! registry. There are no globals. A `Host` is built and extended through
//! `&mut` during startup, after which it may be shared (for example behind
//! an `Arc`) and used to open images from many threads at once. Dropping the
//! `Host` tears everything down.

use crate::architecture::ArchitectureRegistry;
use crate::loader::pe::{self, Pe};
use crate::loader::{BinaryView, BinaryViewType, BinaryViewTypeRegistry};
use crate::platform::PlatformRegistry;
use crate::plugin::Plugin;
use crate::Error;
use log::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Host {
    architectures: ArchitectureRegistry,
    view_types: BinaryViewTypeRegistry,
    platforms: PlatformRegistry,
    plugins: Vec<String>,
}

impl Host {
    /// Create a `Host` with no architectures, view types or platforms.
    pub fn new() -> Host {
        Host::default()
    }

    /// Create a `Host` with the builtin architectures and a `PE` view type.
    pub fn with_defaults() -> Host {
        let mut host = Host::new();
        host.architectures = ArchitectureRegistry::builtin();
        host.view_types.register(BinaryViewType::new(pe::VIEW_TYPE));
        host
    }

    pub fn architectures(&self) -> &ArchitectureRegistry {
        &self.architectures
    }

    pub fn architectures_mut(&mut self) -> &mut ArchitectureRegistry {
        &mut self.architectures
    }

    pub fn view_types(&self) -> &BinaryViewTypeRegistry {
        &self.view_types
    }

    pub fn view_types_mut(&mut self) -> &mut BinaryViewTypeRegistry {
        &mut self.view_types
    }

    pub fn platforms(&self) -> &PlatformRegistry {
        &self.platforms
    }

    pub fn platforms_mut(&mut self) -> &mut PlatformRegistry {
        &mut self.platforms
    }

    /// Names of the plugins which initialized successfully.
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Check a plugin's dependencies and initialize it.
    ///
    /// Missing optional dependencies are skipped. A missing required
    /// dependency, or a failed `init`, returns `false`.
    pub fn load_plugin(&mut self, plugin: &dyn Plugin) -> bool {
        for dependency in plugin.dependencies() {
            if dependency.requirement().is_satisfied(self) {
                continue;
            }
            if dependency.is_optional() {
                debug!(
                    "Plugin {}: optional {} not available",
                    plugin.name(),
                    dependency.requirement()
                );
            } else {
                warn!(
                    "Plugin {}: required {} not available",
                    plugin.name(),
                    dependency.requirement()
                );
                return false;
            }
        }

        if !plugin.init(self) {
            warn!("Plugin {} failed to initialize", plugin.name());
            return false;
        }

        if !self.plugins.iter().any(|name| name == plugin.name()) {
            self.plugins.push(plugin.name().to_string());
        }
        info!("Loaded plugin {}", plugin.name());
        true
    }

    /// Recognize a view's platform with the view type that loads it, and
    /// attach it.
    pub fn open_view(&self, view: BinaryView) -> Result<BinaryView, Error> {
        let view_type = self.view_types.get(view.view_type())?;
        Ok(view_type.open(view))
    }

    /// Parse a PE image and recognize its platform.
    pub fn open_pe<S: Into<String>>(&self, name: S, bytes: Vec<u8>) -> Result<BinaryView, Error> {
        let view = Pe::new(bytes)?.binary_view(name)?;
        self.open_view(view)
    }
}
