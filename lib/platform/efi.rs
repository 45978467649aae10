//! EFI platforms.
//!
//! EFI images are PE images whose subsystem is one of the four EFI subsystem
//! codes. Each supported architecture family gets an `efi-<architecture>`
//! platform registered under the `efi` brand, and a recognizer routed from
//! the PE machine types of that family.
//!
//! EFI uses the Microsoft x64 ABI on x86_64 and the standard C ABI
//! everywhere else, and does not distinguish cdecl, fastcall and stdcall the
//! way native Windows images do. One convention therefore fills several
//! roles on most EFI platforms.

use crate::architecture::{Architecture, ArchitectureProvider, Endian};
use crate::calling_convention::{CallingConvention, CallingConventionType};
use crate::host::Host;
use crate::loader::{BinaryView, PlatformRecognizer};
use crate::metadata::Metadata;
use crate::options::Options;
use crate::platform::{Platform, Roles};
use crate::plugin::{Dependency, Plugin, Requirement};
use crate::Error;
use goblin::pe::header::{
    COFF_MACHINE_ARM, COFF_MACHINE_ARM64, COFF_MACHINE_ARMNT, COFF_MACHINE_THUMB,
    COFF_MACHINE_X86, COFF_MACHINE_X86_64,
};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

/// The metadata key recognition reads.
pub const SUBSYSTEM_KEY: &str = "Subsystem";

/// Every EFI subsystem code.
pub const EFI_SUBSYSTEMS: RangeInclusive<u64> = 10..=13;

/// The EFI values of a PE image's subsystem field.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum EfiSubsystem {
    Application,
    BootServiceDriver,
    RuntimeDriver,
    Rom,
}

impl EfiSubsystem {
    pub fn from_u64(subsystem: u64) -> Option<EfiSubsystem> {
        match subsystem {
            10 => Some(EfiSubsystem::Application),
            11 => Some(EfiSubsystem::BootServiceDriver),
            12 => Some(EfiSubsystem::RuntimeDriver),
            13 => Some(EfiSubsystem::Rom),
            _ => None,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            EfiSubsystem::Application => 10,
            EfiSubsystem::BootServiceDriver => 11,
            EfiSubsystem::RuntimeDriver => 12,
            EfiSubsystem::Rom => 13,
        }
    }

    /// Read the EFI subsystem out of an image's metadata.
    ///
    /// `None` if the subsystem is missing, is not an unsigned integer, or is
    /// not an EFI subsystem.
    pub fn from_metadata(metadata: &Metadata) -> Option<EfiSubsystem> {
        metadata
            .get(SUBSYSTEM_KEY)?
            .as_unsigned_integer()
            .and_then(EfiSubsystem::from_u64)
    }
}

/// Whether a convention is looked up before it is registered.
#[derive(Clone, Copy, Debug)]
enum Presence {
    /// Skipped if the architecture does not expose it.
    Checked,
    /// Always registered. If the architecture does not expose it, the given
    /// behavior is registered under the expected name.
    Unconditional(CallingConventionType),
}

/// One row of a family's convention table.
#[derive(Clone, Copy, Debug)]
struct ConventionEntry {
    name: &'static str,
    roles: Roles,
    presence: Presence,
}

const fn checked(name: &'static str, roles: Roles) -> ConventionEntry {
    ConventionEntry {
        name,
        roles,
        presence: Presence::Checked,
    }
}

const fn unconditional(
    name: &'static str,
    roles: Roles,
    typ: CallingConventionType,
) -> ConventionEntry {
    ConventionEntry {
        name,
        roles,
        presence: Presence::Unconditional(typ),
    }
}

const X86_CONVENTIONS: &[ConventionEntry] = &[
    checked("cdecl", Roles::DEFAULT.union(Roles::CDECL)),
    checked("fastcall", Roles::FASTCALL),
    checked("stdcall", Roles::STDCALL),
    checked("thiscall", Roles::NONE),
    // Borland compilers commonly use the Linux-style register convention.
    checked("regparm", Roles::NONE),
];

const AMD64_CONVENTIONS: &[ConventionEntry] = &[
    checked(
        "win64",
        Roles::DEFAULT
            .union(Roles::CDECL)
            .union(Roles::FASTCALL)
            .union(Roles::STDCALL),
    ),
    // EFI applications sometimes use sysv internally.
    unconditional("sysv", Roles::NONE, CallingConventionType::Amd64SystemV),
];

const ARM_CONVENTIONS: &[ConventionEntry] = &[checked("cdecl", Roles::all())];

/// An architecture family with EFI support.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EfiFamily {
    X86,
    Amd64,
    /// 32-bit ARM, with a platform for each of ARM and Thumb-2 mode.
    Armv7,
    Aarch64,
}

const ALL_FAMILIES: &[EfiFamily] = &[
    EfiFamily::X86,
    EfiFamily::Amd64,
    EfiFamily::Armv7,
    EfiFamily::Aarch64,
];

impl EfiFamily {
    /// Every family, in registration order.
    pub fn all() -> &'static [EfiFamily] {
        ALL_FAMILIES
    }

    /// The architectures this family needs, primary first. A platform is
    /// created for each.
    pub fn architecture_names(&self) -> &'static [&'static str] {
        match self {
            EfiFamily::X86 => &["x86"],
            EfiFamily::Amd64 => &["x86_64"],
            EfiFamily::Armv7 => &["armv7", "thumb2"],
            EfiFamily::Aarch64 => &["aarch64"],
        }
    }

    /// The PE machine types routed to this family's recognizer.
    ///
    /// The machine type cannot tell ARM and Thumb-2 apart, so all three
    /// 32-bit ARM machine types are routed to the ARM platform.
    pub fn machines(&self) -> &'static [u32] {
        const X86: &[u32] = &[COFF_MACHINE_X86 as u32];
        const AMD64: &[u32] = &[COFF_MACHINE_X86_64 as u32];
        const ARMV7: &[u32] = &[
            COFF_MACHINE_ARM as u32,
            COFF_MACHINE_THUMB as u32,
            COFF_MACHINE_ARMNT as u32,
        ];
        const AARCH64: &[u32] = &[COFF_MACHINE_ARM64 as u32];

        match self {
            EfiFamily::X86 => X86,
            EfiFamily::Amd64 => AMD64,
            EfiFamily::Armv7 => ARMV7,
            EfiFamily::Aarch64 => AARCH64,
        }
    }

    fn conventions(&self) -> &'static [ConventionEntry] {
        match self {
            EfiFamily::X86 => X86_CONVENTIONS,
            EfiFamily::Amd64 => AMD64_CONVENTIONS,
            EfiFamily::Armv7 | EfiFamily::Aarch64 => ARM_CONVENTIONS,
        }
    }

    /// The name of the convention registered as default, when the
    /// architecture exposes it.
    pub fn primary_convention(&self) -> &'static str {
        self.conventions()[0].name
    }
}

impl fmt::Display for EfiFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EfiFamily::X86 => "x86",
            EfiFamily::Amd64 => "x86_64",
            EfiFamily::Armv7 => "armv7",
            EfiFamily::Aarch64 => "aarch64",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for EfiFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<EfiFamily, Error> {
        match s {
            "x86" => Ok(EfiFamily::X86),
            "x86_64" | "amd64" => Ok(EfiFamily::Amd64),
            "armv7" | "arm" | "thumb2" => Ok(EfiFamily::Armv7),
            "aarch64" | "arm64" => Ok(EfiFamily::Aarch64),
            _ => Err(Error::Custom(format!("unknown EFI family {}", s))),
        }
    }
}

/// The name of the platform for an architecture under a brand.
pub fn platform_name(brand: &str, architecture: &Architecture) -> String {
    format!("{}-{}", brand, architecture.name())
}

/// Register the family's calling conventions on a platform under
/// construction.
///
/// Conventions the architecture does not expose are skipped, leaving the
/// platform with whatever subset is available.
pub fn compose(platform: &mut Platform, family: EfiFamily) {
    let architecture = platform.architecture().clone();

    for entry in family.conventions() {
        let calling_convention = match architecture.calling_convention_by_name(entry.name) {
            Some(calling_convention) => calling_convention,
            None => match entry.presence {
                Presence::Checked => {
                    trace!(
                        "{}: {} does not expose {}",
                        platform.name(),
                        architecture.name(),
                        entry.name
                    );
                    continue;
                }
                Presence::Unconditional(typ) => {
                    Arc::new(CallingConvention::with_name(entry.name, typ))
                }
            },
        };

        trace!(
            "{}: registering {} {:?}",
            platform.name(),
            calling_convention.name(),
            entry.roles
        );
        platform.register_calling_convention_with_roles(calling_convention, entry.roles);
    }
}

/// Recognizes images with an EFI subsystem as one platform.
#[derive(Clone, Debug)]
pub struct EfiRecognizer {
    family: EfiFamily,
    platform: Arc<Platform>,
}

impl EfiRecognizer {
    pub fn new(family: EfiFamily, platform: Arc<Platform>) -> EfiRecognizer {
        EfiRecognizer { family, platform }
    }

    pub fn family(&self) -> EfiFamily {
        self.family
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.platform
    }
}

impl PlatformRecognizer for EfiRecognizer {
    fn recognize(&self, _view: &BinaryView, metadata: &Metadata) -> Option<Arc<Platform>> {
        EfiSubsystem::from_metadata(metadata).map(|_| self.platform.clone())
    }
}

/// Register every family in `options` which the host can support.
///
/// Families whose architectures are missing, and everything when the view
/// type is missing, are skipped. Families whose platforms are already
/// registered are skipped, so registering twice changes nothing. Returns the
/// number of families registered by this call.
pub fn register(host: &mut Host, options: &Options) -> usize {
    if let Err(e) = host.view_types().get(options.view_type()) {
        debug!("{}, no EFI platforms registered", e);
        return 0;
    }

    let mut registered = 0;
    for family in options.families() {
        match register_family(host, options, *family) {
            Ok(true) => registered += 1,
            Ok(false) => {}
            Err(e) => debug!("Skipping EFI {}: {}", family, e),
        }
    }
    registered
}

/// Register one family. `Ok(false)` if it was already registered.
fn register_family(host: &mut Host, options: &Options, family: EfiFamily) -> Result<bool, Error> {
    let architectures = family
        .architecture_names()
        .iter()
        .map(|name| host.architectures().architecture(name))
        .collect::<Result<Vec<Arc<Architecture>>, Error>>()?;

    if let Some(existing) = architectures
        .iter()
        .map(|architecture| platform_name(options.brand(), architecture))
        .find(|name| host.platforms().by_name(name).is_some())
    {
        debug!("{} already registered", existing);
        return Ok(false);
    }

    let platforms = architectures
        .into_iter()
        .map(|architecture| {
            let name = platform_name(options.brand(), &architecture);
            let mut platform = Platform::new(architecture, name);
            compose(&mut platform, family);
            Arc::new(platform)
        })
        .collect::<Vec<Arc<Platform>>>();

    for (i, first) in platforms.iter().enumerate() {
        for second in &platforms[i + 1..] {
            Platform::link_related(first, second);
        }
    }

    let primary = match platforms.first() {
        Some(primary) => primary.clone(),
        None => return Ok(false),
    };

    let view_type = host.view_types_mut().get_mut(options.view_type())?;
    let recognizer: Arc<dyn PlatformRecognizer> = Arc::new(EfiRecognizer::new(family, primary));
    for machine in family.machines() {
        view_type.register_platform_recognizer(*machine, Endian::Little, recognizer.clone());
    }

    for platform in platforms {
        info!(
            "Registered platform {} under {}",
            platform.name(),
            options.brand()
        );
        host.platforms_mut().register(options.brand(), platform);
    }

    Ok(true)
}

/// Registers EFI platforms when loaded into a `Host`.
#[derive(Clone, Debug, Default)]
pub struct EfiPlugin {
    options: Options,
}

impl EfiPlugin {
    pub fn new() -> EfiPlugin {
        EfiPlugin::default()
    }

    pub fn with_options(options: Options) -> EfiPlugin {
        EfiPlugin { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Plugin for EfiPlugin {
    fn name(&self) -> &str {
        "platform_efi"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies = self
            .options
            .families()
            .iter()
            .flat_map(|family| family.architecture_names().iter())
            .map(|name| Dependency::optional(Requirement::Architecture(name.to_string())))
            .collect::<Vec<Dependency>>();
        dependencies.push(Dependency::optional(Requirement::ViewType(
            self.options.view_type().to_string(),
        )));
        dependencies
    }

    /// Always succeeds, even if no platform could be registered.
    fn init(&self, host: &mut Host) -> bool {
        let registered = register(host, &self.options);
        debug!("Registered {} EFI families", registered);
        true
    }
}
