use crate::platform::Platform;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every registered platform, grouped by brand.
///
/// Several platforms may share one brand, one per architecture variant.
/// Platform names are unique across the whole registry.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    brands: BTreeMap<String, Vec<Arc<Platform>>>,
}

impl PlatformRegistry {
    /// Create an empty `PlatformRegistry`.
    pub fn new() -> PlatformRegistry {
        PlatformRegistry::default()
    }

    /// Register a platform under `brand`.
    ///
    /// Returns `false`, and registers nothing, if a platform of the same
    /// name is already registered.
    pub fn register<S: Into<String>>(&mut self, brand: S, platform: Arc<Platform>) -> bool {
        let brand = brand.into();
        if self.by_name(platform.name()).is_some() {
            debug!(
                "Platform {} already registered, not registering under {}",
                platform.name(),
                brand
            );
            return false;
        }
        self.brands.entry(brand).or_insert_with(Vec::new).push(platform);
        true
    }

    /// Every platform registered under `brand`, in registration order.
    pub fn platforms(&self, brand: &str) -> &[Arc<Platform>] {
        self.brands
            .get(brand)
            .map(|platforms| platforms.as_slice())
            .unwrap_or(&[])
    }

    /// Find a platform by its name.
    pub fn by_name(&self, name: &str) -> Option<Arc<Platform>> {
        self.iter()
            .find(|platform| platform.name() == name)
            .cloned()
    }

    /// Find the platform registered under `brand` for the given architecture.
    pub fn by_architecture(&self, brand: &str, architecture: &str) -> Option<Arc<Platform>> {
        self.platforms(brand)
            .iter()
            .find(|platform| platform.architecture().name() == architecture)
            .cloned()
    }

    /// Names of every brand with at least one platform.
    pub fn brands(&self) -> impl Iterator<Item = &str> {
        self.brands.keys().map(|brand| brand.as_str())
    }

    /// Every registered platform.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Platform>> {
        self.brands.values().flat_map(|platforms| platforms.iter())
    }

    pub fn len(&self) -> usize {
        self.brands.values().map(|platforms| platforms.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
