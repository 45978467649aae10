//! EFI platform support for binary analysis.
//!
//! Given an image whose headers have been parsed, this crate decides which
//! EFI platform, if any, the image runs on, and supplies that platform's
//! calling conventions.
//!
//! # Overview
//!
//! * A `Host` owns the architectures, image-format loaders
//! (`BinaryViewType`) and platforms known to an analysis session.
//! * `EfiPlugin` registers an `efi-<architecture>` `Platform` for each
//! supported architecture family under the `efi` brand, and registers an
//! `EfiRecognizer` against the PE machine types of that family.
//! * Opening an image asks the recognizers for its machine type and byte
//! order. EFI recognizers claim images whose `Subsystem` metadata is one of
//! the EFI subsystem codes, 10 through 13.
//!
//! ```
//! use efi_platform::{EfiPlugin, Host, Metadata};
//! use efi_platform::architecture::Endian;
//! use efi_platform::loader::BinaryView;
//!
//! let mut host = Host::with_defaults();
//! host.load_plugin(&EfiPlugin::new());
//!
//! let metadata = Metadata::store().with("Subsystem", 10u64);
//! let view = BinaryView::new("app.efi", "PE", 0x8664, Endian::Little, metadata);
//! let view = host.open_view(view).unwrap();
//!
//! let platform = view.platform().unwrap();
//! assert_eq!(platform.name(), "efi-x86_64");
//! assert_eq!(platform.default_calling_convention().unwrap().name(), "win64");
//! ```

pub mod architecture;
pub mod calling_convention;
pub mod host;
pub mod loader;
pub mod metadata;
pub mod options;
pub mod platform;
pub mod plugin;
#[cfg(test)]
mod tests;

pub use crate::host::Host;
pub use crate::metadata::Metadata;
pub use crate::options::{Options, OptionsBuilder};
pub use crate::platform::efi::{EfiFamily, EfiPlugin, EfiRecognizer};
pub use crate::platform::{Platform, PlatformRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {name} is not available")]
    NotAvailable { kind: &'static str, name: String },
    #[error("Goblin error: `{0}`")]
    Goblin(#[from] goblin::error::Error),
    #[error("An I/O error occurred: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("Json error: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
