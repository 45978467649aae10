//! Loading executable images and recognizing their platform.
//!
//! A `BinaryViewType` is an image-format loader, such as `PE`. Platform
//! support registers `PlatformRecognizer`s against the view type, keyed by a
//! `RecognitionSignature` of machine type and byte order. When a
//! `BinaryView` is opened, every recognizer registered for the view's
//! signature is asked in registration order, and the first platform returned
//! is attached to the view.

pub mod json;
pub mod pe;

use crate::architecture::Endian;
use crate::metadata::Metadata;
use crate::platform::Platform;
use crate::Error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The machine type and byte order an image-format loader routes on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RecognitionSignature {
    machine: u32,
    endian: Endian,
}

impl RecognitionSignature {
    pub fn new(machine: u32, endian: Endian) -> RecognitionSignature {
        RecognitionSignature { machine, endian }
    }

    pub fn machine(&self) -> u32 {
        self.machine
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

impl fmt::Display for RecognitionSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}/{:?}", self.machine, self.endian)
    }
}

/// Decides whether a loaded image belongs to a platform.
///
/// Returning `None` means no opinion, and the loader moves on to the next
/// recognizer.
pub trait PlatformRecognizer: Send + Sync {
    fn recognize(&self, view: &BinaryView, metadata: &Metadata) -> Option<Arc<Platform>>;
}

impl<F> PlatformRecognizer for F
where
    F: Fn(&BinaryView, &Metadata) -> Option<Arc<Platform>> + Send + Sync,
{
    fn recognize(&self, view: &BinaryView, metadata: &Metadata) -> Option<Arc<Platform>> {
        self(view, metadata)
    }
}

/// An image which has been loaded, and what was learned from its headers.
#[derive(Clone, Debug)]
pub struct BinaryView {
    name: String,
    view_type: String,
    machine: u32,
    endian: Endian,
    entry_point: u64,
    image_base: u64,
    metadata: Metadata,
    platform: Option<Arc<Platform>>,
}

impl BinaryView {
    /// Create a new `BinaryView` without a platform.
    pub fn new<S: Into<String>, T: Into<String>>(
        name: S,
        view_type: T,
        machine: u32,
        endian: Endian,
        metadata: Metadata,
    ) -> BinaryView {
        BinaryView {
            name: name.into(),
            view_type: view_type.into(),
            machine,
            endian,
            entry_point: 0,
            image_base: 0,
            metadata,
            platform: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the `BinaryViewType` which loads this view.
    pub fn view_type(&self) -> &str {
        &self.view_type
    }

    pub fn machine(&self) -> u32 {
        self.machine
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn signature(&self) -> RecognitionSignature {
        RecognitionSignature::new(self.machine, self.endian)
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    pub fn set_entry_point(&mut self, entry_point: u64) {
        self.entry_point = entry_point;
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn set_image_base(&mut self, image_base: u64) {
        self.image_base = image_base;
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The platform attached when this view was opened, if any.
    pub fn platform(&self) -> Option<&Arc<Platform>> {
        self.platform.as_ref()
    }

    pub fn set_platform(&mut self, platform: Option<Arc<Platform>>) {
        self.platform = platform;
    }
}

/// An image-format loader, and the recognizers registered against it.
pub struct BinaryViewType {
    name: String,
    recognizers: FxHashMap<RecognitionSignature, Vec<Arc<dyn PlatformRecognizer>>>,
    default_platforms: BTreeMap<RecognitionSignature, Arc<Platform>>,
}

impl BinaryViewType {
    /// Create a new `BinaryViewType` without recognizers.
    pub fn new<S: Into<String>>(name: S) -> BinaryViewType {
        BinaryViewType {
            name: name.into(),
            recognizers: FxHashMap::default(),
            default_platforms: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route images with the given machine type and byte order to
    /// `recognizer`, after any recognizers already registered for them.
    pub fn register_platform_recognizer(
        &mut self,
        machine: u32,
        endian: Endian,
        recognizer: Arc<dyn PlatformRecognizer>,
    ) {
        self.recognizers
            .entry(RecognitionSignature::new(machine, endian))
            .or_insert_with(Vec::new)
            .push(recognizer);
    }

    /// The number of recognizers registered for a signature.
    pub fn recognizer_count(&self, signature: RecognitionSignature) -> usize {
        self.recognizers
            .get(&signature)
            .map(|recognizers| recognizers.len())
            .unwrap_or(0)
    }

    /// Every signature with at least one recognizer, sorted.
    pub fn signatures(&self) -> Vec<RecognitionSignature> {
        let mut signatures = self.recognizers.keys().copied().collect::<Vec<_>>();
        signatures.sort();
        signatures
    }

    /// Set the platform to use for a signature when no recognizer has an
    /// opinion.
    pub fn register_default_platform(&mut self, signature: RecognitionSignature, platform: Arc<Platform>) {
        self.default_platforms.insert(signature, platform);
    }

    /// Ask the recognizers for this view's signature, in order. The first
    /// platform returned wins. If none has an opinion, fall back to the
    /// default platform for the signature.
    pub fn recognize_platform(&self, view: &BinaryView) -> Option<Arc<Platform>> {
        let signature = view.signature();
        self.recognizers
            .get(&signature)
            .into_iter()
            .flatten()
            .find_map(|recognizer| recognizer.recognize(view, view.metadata()))
            .or_else(|| self.default_platforms.get(&signature).cloned())
    }

    /// Attach the recognized platform to a view.
    pub fn open(&self, mut view: BinaryView) -> BinaryView {
        let platform = self.recognize_platform(&view);
        view.set_platform(platform);
        view
    }
}

impl fmt::Debug for BinaryViewType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BinaryViewType")
            .field("name", &self.name)
            .field("signatures", &self.signatures())
            .field("default_platforms", &self.default_platforms.len())
            .finish()
    }
}

/// Every image-format loader known to a `Host`, keyed by name.
#[derive(Debug, Default)]
pub struct BinaryViewTypeRegistry {
    view_types: BTreeMap<String, BinaryViewType>,
}

impl BinaryViewTypeRegistry {
    pub fn new() -> BinaryViewTypeRegistry {
        BinaryViewTypeRegistry::default()
    }

    /// Register a view type, replacing any view type of the same name.
    pub fn register(&mut self, view_type: BinaryViewType) {
        self.view_types.insert(view_type.name().to_string(), view_type);
    }

    pub fn get(&self, name: &str) -> Result<&BinaryViewType, Error> {
        self.view_types.get(name).ok_or_else(|| Error::NotAvailable {
            kind: "view type",
            name: name.to_string(),
        })
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut BinaryViewType, Error> {
        self.view_types.get_mut(name).ok_or_else(|| Error::NotAvailable {
            kind: "view type",
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.view_types.keys().map(|name| name.as_str())
    }
}
