//! Information and types for supported architectures.
//!
//! An `Architecture` is owned by whatever provides it. Platforms hold an
//! `Arc` to their architecture and look calling conventions up on it by
//! name. The `ArchitectureRegistry` is the provider used by a `Host`.

use crate::calling_convention::{CallingConvention, CallingConventionType};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An architecture's endanness.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Big,
    Little,
}

/// An architecture and the calling conventions it exposes.
#[derive(Clone, Debug, PartialEq)]
pub struct Architecture {
    name: String,
    endian: Endian,
    word_size: usize,
    calling_conventions: Vec<Arc<CallingConvention>>,
}

impl Architecture {
    /// Create a new `Architecture` which exposes no calling conventions.
    pub fn new<S: Into<String>>(name: S, endian: Endian, word_size: usize) -> Architecture {
        Architecture {
            name: name.into(),
            endian,
            word_size,
            calling_conventions: Vec::new(),
        }
    }

    /// Expose a calling convention on this architecture. A convention with
    /// the same name replaces the previous one, keeping its position.
    pub fn add_calling_convention(&mut self, calling_convention: CallingConvention) {
        let calling_convention = Arc::new(calling_convention);
        match self
            .calling_conventions
            .iter_mut()
            .find(|cc| cc.name() == calling_convention.name())
        {
            Some(slot) => *slot = calling_convention,
            None => self.calling_conventions.push(calling_convention),
        }
    }

    /// Builder-style `add_calling_convention`.
    pub fn with_calling_convention(mut self, calling_convention: CallingConvention) -> Architecture {
        self.add_calling_convention(calling_convention);
        self
    }

    /// The 32-bit X86 Architecture.
    pub fn x86() -> Architecture {
        Architecture::new("x86", Endian::Little, 32)
            .with_calling_convention(CallingConvention::new(CallingConventionType::Cdecl))
            .with_calling_convention(CallingConvention::new(CallingConventionType::Stdcall))
            .with_calling_convention(CallingConvention::new(CallingConventionType::Fastcall))
            .with_calling_convention(CallingConvention::new(CallingConventionType::Thiscall))
            .with_calling_convention(CallingConvention::new(CallingConventionType::Regparm))
    }

    /// The 64-bit X86 Architecture.
    pub fn amd64() -> Architecture {
        Architecture::new("x86_64", Endian::Little, 64)
            .with_calling_convention(CallingConvention::new(CallingConventionType::Amd64SystemV))
            .with_calling_convention(CallingConvention::new(CallingConventionType::Win64))
    }

    /// The 32-bit ARM Architecture, in ARM mode.
    pub fn armv7() -> Architecture {
        Architecture::new("armv7", Endian::Little, 32)
            .with_calling_convention(CallingConvention::new(CallingConventionType::Aapcs))
    }

    /// The 32-bit ARM Architecture, in Thumb-2 mode.
    pub fn thumb2() -> Architecture {
        Architecture::new("thumb2", Endian::Little, 32)
            .with_calling_convention(CallingConvention::new(CallingConventionType::Aapcs))
    }

    /// The 64-bit ARM Architecture.
    pub fn aarch64() -> Architecture {
        Architecture::new("aarch64", Endian::Little, 64)
            .with_calling_convention(CallingConvention::new(CallingConventionType::Aapcs64))
    }

    /// Get the name of this architecture.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the endianness of this architecture.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Get the size of a natural word for this architecture in bits.
    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Every calling convention this architecture exposes, in order.
    pub fn calling_conventions(&self) -> &[Arc<CallingConvention>] {
        &self.calling_conventions
    }

    /// Look up a calling convention by name.
    pub fn calling_convention_by_name(&self, name: &str) -> Option<Arc<CallingConvention>> {
        self.calling_conventions
            .iter()
            .find(|cc| cc.name() == name)
            .cloned()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Anything which can hand out architectures by name.
pub trait ArchitectureProvider {
    /// Get an architecture by name, or `Error::NotAvailable`.
    fn architecture(&self, name: &str) -> Result<Arc<Architecture>, Error>;
}

/// Architectures known to a `Host`, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ArchitectureRegistry {
    architectures: BTreeMap<String, Arc<Architecture>>,
}

impl ArchitectureRegistry {
    /// Create an empty `ArchitectureRegistry`.
    pub fn new() -> ArchitectureRegistry {
        ArchitectureRegistry::default()
    }

    /// Create an `ArchitectureRegistry` holding x86, x86_64, armv7, thumb2
    /// and aarch64.
    pub fn builtin() -> ArchitectureRegistry {
        let mut registry = ArchitectureRegistry::new();
        registry.register(Architecture::x86());
        registry.register(Architecture::amd64());
        registry.register(Architecture::armv7());
        registry.register(Architecture::thumb2());
        registry.register(Architecture::aarch64());
        registry
    }

    /// Register an architecture, replacing any architecture of the same name.
    pub fn register(&mut self, architecture: Architecture) -> Arc<Architecture> {
        let architecture = Arc::new(architecture);
        self.architectures
            .insert(architecture.name().to_string(), architecture.clone());
        architecture
    }

    /// Remove an architecture by name.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Architecture>> {
        self.architectures.remove(name)
    }

    /// Names of every registered architecture.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.architectures.keys().map(|name| name.as_str())
    }
}

impl ArchitectureProvider for ArchitectureRegistry {
    fn architecture(&self, name: &str) -> Result<Arc<Architecture>, Error> {
        self.architectures
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotAvailable {
                kind: "architecture",
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_architectures() {
        let registry = ArchitectureRegistry::builtin();
        let names = registry.names().collect::<Vec<&str>>();
        assert_eq!(names, vec!["aarch64", "armv7", "thumb2", "x86", "x86_64"]);

        let x86_64 = registry.architecture("x86_64").unwrap();
        assert_eq!(x86_64.endian(), Endian::Little);
        assert_eq!(x86_64.word_size(), 64);
        assert!(x86_64.calling_convention_by_name("win64").is_some());
        assert!(x86_64.calling_convention_by_name("sysv").is_some());
        assert!(x86_64.calling_convention_by_name("cdecl").is_none());
    }

    #[test]
    fn missing_architecture() {
        let registry = ArchitectureRegistry::builtin();
        match registry.architecture("mips") {
            Err(Error::NotAvailable { kind, name }) => {
                assert_eq!(kind, "architecture");
                assert_eq!(name, "mips");
            }
            other => panic!("unexpected lookup result {:?}", other),
        }
    }

    #[test]
    fn replace_calling_convention() {
        let mut x86 = Architecture::x86();
        let count = x86.calling_conventions().len();
        x86.add_calling_convention(CallingConvention::with_name(
            "cdecl",
            CallingConventionType::Stdcall,
        ));
        assert_eq!(x86.calling_conventions().len(), count);
        assert_eq!(x86.calling_conventions()[0].typ(), CallingConventionType::Stdcall);
    }
}
