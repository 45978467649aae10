use crate::platform::efi::EfiFamily;
use std::default;

/// Options which change how EFI platforms are registered.
#[derive(Clone, Debug)]
pub struct Options {
    brand: String,
    families: Vec<EfiFamily>,
    view_type: String,
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// The brand platforms are registered under, and the prefix of their
    /// names. `efi` by default.
    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn set_brand<S: Into<String>>(&mut self, brand: S) {
        self.brand = brand.into();
    }

    /// The families registration is attempted for. Every family by default.
    pub fn families(&self) -> &[EfiFamily] {
        &self.families
    }

    pub fn set_families(&mut self, families: Vec<EfiFamily>) {
        self.families = families;
    }

    /// The image-format loader recognizers are registered against. `PE` by
    /// default.
    pub fn view_type(&self) -> &str {
        &self.view_type
    }

    pub fn set_view_type<S: Into<String>>(&mut self, view_type: S) {
        self.view_type = view_type.into();
    }
}

impl default::Default for Options {
    fn default() -> Options {
        Options {
            brand: "efi".to_string(),
            families: EfiFamily::all().to_vec(),
            view_type: crate::loader::pe::VIEW_TYPE.to_string(),
        }
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `Options`
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for EFI options.
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    pub fn brand<S: Into<String>>(mut self, brand: S) -> OptionsBuilder {
        self.options.set_brand(brand);
        self
    }

    pub fn families(mut self, families: Vec<EfiFamily>) -> OptionsBuilder {
        self.options.set_families(families);
        self
    }

    pub fn view_type<S: Into<String>>(mut self, view_type: S) -> OptionsBuilder {
        self.options.set_view_type(view_type);
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

impl default::Default for OptionsBuilder {
    fn default() -> OptionsBuilder {
        OptionsBuilder::new()
    }
}
