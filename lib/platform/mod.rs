//! Platforms: an architecture bound to a set of calling conventions.
//!
//! A `Platform` is built mutably, then frozen behind an `Arc` and registered
//! in a `PlatformRegistry` under a brand. Calling conventions are registered
//! on a platform under zero or more `Roles`. A convention registered under
//! several roles appears once in `calling_conventions`.
//!
//! Platforms which differ only in instruction mode, such as ARM and Thumb-2,
//! are linked to each other with `Platform::link_related`, keyed by the
//! other platform's architecture name.

pub mod efi;
mod registry;

pub use self::registry::PlatformRegistry;

use crate::architecture::Architecture;
use crate::calling_convention::CallingConvention;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

bitflags! {
    /// The roles a calling convention fills on a platform.
    #[derive(Deserialize, Serialize)]
    pub struct Roles: u8 {
        const NONE     = 0b0000;
        const DEFAULT  = 0b0001;
        const CDECL    = 0b0010;
        const FASTCALL = 0b0100;
        const STDCALL  = 0b1000;
    }
}

/// An architecture bound to a named, prioritized set of calling conventions.
#[derive(Debug)]
pub struct Platform {
    name: String,
    architecture: Arc<Architecture>,
    calling_conventions: Vec<Arc<CallingConvention>>,
    default_calling_convention: Option<Arc<CallingConvention>>,
    cdecl_calling_convention: Option<Arc<CallingConvention>>,
    fastcall_calling_convention: Option<Arc<CallingConvention>>,
    stdcall_calling_convention: Option<Arc<CallingConvention>>,
    related_platforms: RwLock<BTreeMap<String, Weak<Platform>>>,
}

impl Platform {
    /// Create a new `Platform` with no calling conventions.
    pub fn new<S: Into<String>>(architecture: Arc<Architecture>, name: S) -> Platform {
        Platform {
            name: name.into(),
            architecture,
            calling_conventions: Vec::new(),
            default_calling_convention: None,
            cdecl_calling_convention: None,
            fastcall_calling_convention: None,
            stdcall_calling_convention: None,
            related_platforms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the name of this platform.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the architecture this platform is for.
    pub fn architecture(&self) -> &Arc<Architecture> {
        &self.architecture
    }

    /// Every registered calling convention, in registration order.
    pub fn calling_conventions(&self) -> &[Arc<CallingConvention>] {
        &self.calling_conventions
    }

    /// Look up a registered calling convention by name.
    pub fn calling_convention_by_name(&self, name: &str) -> Option<&Arc<CallingConvention>> {
        self.calling_conventions.iter().find(|cc| cc.name() == name)
    }

    pub fn default_calling_convention(&self) -> Option<&Arc<CallingConvention>> {
        self.default_calling_convention.as_ref()
    }

    pub fn cdecl_calling_convention(&self) -> Option<&Arc<CallingConvention>> {
        self.cdecl_calling_convention.as_ref()
    }

    pub fn fastcall_calling_convention(&self) -> Option<&Arc<CallingConvention>> {
        self.fastcall_calling_convention.as_ref()
    }

    pub fn stdcall_calling_convention(&self) -> Option<&Arc<CallingConvention>> {
        self.stdcall_calling_convention.as_ref()
    }

    /// The roles the given calling convention fills on this platform.
    pub fn roles(&self, calling_convention: &CallingConvention) -> Roles {
        let is = |slot: &Option<Arc<CallingConvention>>| {
            slot.as_ref()
                .map(|cc| cc.name() == calling_convention.name())
                .unwrap_or(false)
        };

        let mut roles = Roles::NONE;
        if is(&self.default_calling_convention) {
            roles |= Roles::DEFAULT;
        }
        if is(&self.cdecl_calling_convention) {
            roles |= Roles::CDECL;
        }
        if is(&self.fastcall_calling_convention) {
            roles |= Roles::FASTCALL;
        }
        if is(&self.stdcall_calling_convention) {
            roles |= Roles::STDCALL;
        }
        roles
    }

    /// Register a calling convention without any role. Registering a
    /// convention which is already registered under the same name replaces
    /// it in place.
    pub fn register_calling_convention(&mut self, calling_convention: Arc<CallingConvention>) {
        match self
            .calling_conventions
            .iter_mut()
            .find(|cc| cc.name() == calling_convention.name())
        {
            Some(slot) => *slot = calling_convention,
            None => self.calling_conventions.push(calling_convention),
        }
    }

    /// Register a calling convention, and assign it every role in `roles`.
    pub fn register_calling_convention_with_roles(
        &mut self,
        calling_convention: Arc<CallingConvention>,
        roles: Roles,
    ) {
        self.register_calling_convention(calling_convention.clone());
        if roles.contains(Roles::DEFAULT) {
            self.default_calling_convention = Some(calling_convention.clone());
        }
        if roles.contains(Roles::CDECL) {
            self.cdecl_calling_convention = Some(calling_convention.clone());
        }
        if roles.contains(Roles::FASTCALL) {
            self.fastcall_calling_convention = Some(calling_convention.clone());
        }
        if roles.contains(Roles::STDCALL) {
            self.stdcall_calling_convention = Some(calling_convention);
        }
    }

    pub fn register_default_calling_convention(&mut self, calling_convention: Arc<CallingConvention>) {
        self.register_calling_convention_with_roles(calling_convention, Roles::DEFAULT);
    }

    pub fn register_cdecl_calling_convention(&mut self, calling_convention: Arc<CallingConvention>) {
        self.register_calling_convention_with_roles(calling_convention, Roles::CDECL);
    }

    pub fn register_fastcall_calling_convention(&mut self, calling_convention: Arc<CallingConvention>) {
        self.register_calling_convention_with_roles(calling_convention, Roles::FASTCALL);
    }

    pub fn register_stdcall_calling_convention(&mut self, calling_convention: Arc<CallingConvention>) {
        self.register_calling_convention_with_roles(calling_convention, Roles::STDCALL);
    }

    /// Record `platform` as the platform to use when analysis switches to
    /// `architecture`. This is one direction of a link, see `link_related`.
    pub fn add_related_platform(&self, architecture: &Architecture, platform: &Arc<Platform>) {
        self.related_platforms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(architecture.name().to_string(), Arc::downgrade(platform));
    }

    /// Link two platforms to each other, each keyed by the other's
    /// architecture.
    pub fn link_related(first: &Arc<Platform>, second: &Arc<Platform>) {
        first.add_related_platform(second.architecture(), second);
        second.add_related_platform(first.architecture(), first);
    }

    /// Get the platform to use when analysis switches to `architecture`.
    ///
    /// A platform is its own related platform for its own architecture.
    pub fn related_platform(self: &Arc<Self>, architecture: &Architecture) -> Option<Arc<Platform>> {
        if architecture.name() == self.architecture.name() {
            return Some(self.clone());
        }
        self.related_platforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(architecture.name())
            .and_then(Weak::upgrade)
    }

    /// Names of the architectures this platform has related platforms for.
    pub fn related_architectures(&self) -> Vec<String> {
        self.related_platforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.architecture.name())?;
        for cc in &self.calling_conventions {
            let roles = self.roles(cc);
            if roles.is_empty() {
                write!(f, "\n  {}", cc.name())?;
            } else {
                write!(f, "\n  {} {:?}", cc.name(), roles)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling_convention::CallingConventionType;

    fn x86_64_platform() -> Platform {
        Platform::new(Arc::new(Architecture::amd64()), "test-x86_64")
    }

    #[test]
    fn roles_overlap_default() {
        let mut platform = x86_64_platform();
        let win64 = Arc::new(CallingConvention::new(CallingConventionType::Win64));
        platform.register_calling_convention_with_roles(
            win64.clone(),
            Roles::DEFAULT | Roles::CDECL | Roles::STDCALL,
        );
        platform.register_fastcall_calling_convention(win64.clone());

        assert_eq!(platform.calling_conventions().len(), 1);
        assert_eq!(platform.default_calling_convention().unwrap().name(), "win64");
        assert_eq!(platform.roles(&win64), Roles::all());
    }

    #[test]
    fn single_role_registration() {
        let mut platform = Platform::new(Arc::new(Architecture::x86()), "test-x86");
        let cdecl = Arc::new(CallingConvention::new(CallingConventionType::Cdecl));
        let stdcall = Arc::new(CallingConvention::new(CallingConventionType::Stdcall));
        let fastcall = Arc::new(CallingConvention::new(CallingConventionType::Fastcall));

        platform.register_default_calling_convention(cdecl.clone());
        platform.register_cdecl_calling_convention(cdecl.clone());
        platform.register_stdcall_calling_convention(stdcall.clone());
        platform.register_fastcall_calling_convention(fastcall.clone());

        assert_eq!(platform.calling_conventions().len(), 3);
        assert_eq!(platform.roles(&cdecl), Roles::DEFAULT | Roles::CDECL);
        assert_eq!(platform.roles(&stdcall), Roles::STDCALL);
        assert_eq!(platform.roles(&fastcall), Roles::FASTCALL);
        assert_eq!(platform.cdecl_calling_convention().unwrap().name(), "cdecl");
        assert_eq!(platform.stdcall_calling_convention().unwrap().name(), "stdcall");
    }

    #[test]
    fn untagged_convention() {
        let mut platform = x86_64_platform();
        let sysv = Arc::new(CallingConvention::new(CallingConventionType::Amd64SystemV));
        platform.register_calling_convention(sysv.clone());

        assert!(platform.default_calling_convention().is_none());
        assert!(platform.calling_convention_by_name("sysv").is_some());
        assert!(platform.roles(&sysv).is_empty());
    }

    #[test]
    fn related_platforms() {
        let armv7 = Arc::new(Architecture::armv7());
        let thumb2 = Arc::new(Architecture::thumb2());
        let arm = Arc::new(Platform::new(armv7.clone(), "test-armv7"));
        let thumb = Arc::new(Platform::new(thumb2.clone(), "test-thumb2"));

        Platform::link_related(&arm, &thumb);

        assert_eq!(arm.related_platform(&thumb2).unwrap().name(), "test-thumb2");
        assert_eq!(thumb.related_platform(&armv7).unwrap().name(), "test-armv7");
        assert_eq!(arm.related_platform(&armv7).unwrap().name(), "test-armv7");
        assert!(arm.related_platform(&Architecture::aarch64()).is_none());
        assert_eq!(arm.related_architectures(), vec!["thumb2".to_string()]);
    }

    #[test]
    fn related_platform_does_not_keep_alive() {
        let armv7 = Arc::new(Architecture::armv7());
        let thumb2 = Arc::new(Architecture::thumb2());
        let arm = Arc::new(Platform::new(armv7, "test-armv7"));
        let thumb = Arc::new(Platform::new(thumb2.clone(), "test-thumb2"));

        Platform::link_related(&arm, &thumb);
        drop(thumb);

        assert!(arm.related_platform(&thumb2).is_none());
    }
}
