//! Images described in JSON.
//!
//! Useful when headers have already been parsed somewhere else, and only the
//! facts platform recognition needs are available:
//!
//! ```json
//! {
//!     "name": "app.efi",
//!     "view_type": "PE",
//!     "machine": 34404,
//!     "endian": "little",
//!     "metadata": { "Subsystem": 10 }
//! }
//! ```

use crate::architecture::Endian;
use crate::loader::{pe, BinaryView};
use crate::metadata::Metadata;
use crate::Error;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct JsonImage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_view_type")]
    view_type: String,
    machine: u32,
    #[serde(default = "default_endian")]
    endian: Endian,
    #[serde(default)]
    entry_point: u64,
    #[serde(default)]
    image_base: u64,
    #[serde(default)]
    metadata: Option<Value>,
}

fn default_view_type() -> String {
    pe::VIEW_TYPE.to_string()
}

fn default_endian() -> Endian {
    Endian::Little
}

/// Create a `BinaryView` from a JSON image description.
pub fn from_str(json: &str) -> Result<BinaryView, Error> {
    let image: JsonImage = serde_json::from_str(json)?;

    let metadata = match image.metadata {
        Some(value) => Metadata::from(value),
        None => Metadata::store(),
    };
    if !metadata.is_key_value_store() {
        return Err(Error::UnsupportedImage(
            "metadata must be a JSON object".to_string(),
        ));
    }

    let mut view = BinaryView::new(
        image.name.unwrap_or_else(|| "json".to_string()),
        image.view_type,
        image.machine,
        image.endian,
        metadata,
    );
    view.set_entry_point(image.entry_point);
    view.set_image_base(image.image_base);
    Ok(view)
}

/// Create a `BinaryView` from a file holding a JSON image description. The
/// view is named after the file unless the description names it.
pub fn from_file(filename: &Path) -> Result<BinaryView, Error> {
    let mut file = File::open(filename)?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;

    let view = from_str(&buf)?;
    if view.name() != "json" {
        return Ok(view);
    }

    let mut renamed = BinaryView::new(
        filename.display().to_string(),
        view.view_type(),
        view.machine(),
        view.endian(),
        view.metadata().clone(),
    );
    renamed.set_entry_point(view.entry_point());
    renamed.set_image_base(view.image_base());
    Ok(renamed)
}
