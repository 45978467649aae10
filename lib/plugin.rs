//! Plugins which extend a `Host` at startup.

use crate::architecture::ArchitectureProvider;
use crate::host::Host;
use std::fmt;

/// Something a plugin wants present before it initializes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Requirement {
    Architecture(String),
    ViewType(String),
}

impl Requirement {
    /// Whether the host can satisfy this requirement.
    pub fn is_satisfied(&self, host: &Host) -> bool {
        match self {
            Requirement::Architecture(name) => host.architectures().architecture(name).is_ok(),
            Requirement::ViewType(name) => host.view_types().get(name).is_ok(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Requirement::Architecture(name) => write!(f, "architecture {}", name),
            Requirement::ViewType(name) => write!(f, "view type {}", name),
        }
    }
}

/// A plugin dependency. Optional dependencies are used if present, and
/// their absence is not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dependency {
    requirement: Requirement,
    optional: bool,
}

impl Dependency {
    pub fn optional(requirement: Requirement) -> Dependency {
        Dependency {
            requirement,
            optional: true,
        }
    }

    pub fn required(requirement: Requirement) -> Dependency {
        Dependency {
            requirement,
            optional: false,
        }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// A unit of startup work run against a `Host`.
pub trait Plugin {
    /// The name of this plugin.
    fn name(&self) -> &str;

    /// What this plugin wants present before `init` runs.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Register whatever this plugin provides. Returns `false` on failure.
    fn init(&self, host: &mut Host) -> bool;
}
