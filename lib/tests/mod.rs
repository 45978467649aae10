use crate::architecture::{Architecture, ArchitectureProvider, Endian};
use crate::loader::pe::tests::pe_header;
use crate::loader::{json, BinaryView, RecognitionSignature};
use crate::platform::efi::EfiFamily;
use crate::{EfiPlugin, Host, Metadata, OptionsBuilder};
use std::sync::Arc;

fn efi_host() -> Host {
    let mut host = Host::with_defaults();
    assert!(host.load_plugin(&EfiPlugin::new()));
    host
}

fn pe_view(machine: u32, metadata: Metadata) -> BinaryView {
    BinaryView::new("image", "PE", machine, Endian::Little, metadata)
}

fn subsystem(value: u64) -> Metadata {
    Metadata::store().with("Subsystem", value)
}

fn platform_name(host: &Host, view: BinaryView) -> Option<String> {
    host.open_view(view)
        .unwrap()
        .platform()
        .map(|platform| platform.name().to_string())
}

#[test]
fn amd64_boot_service_driver() {
    let host = efi_host();
    let view = host.open_view(pe_view(0x8664, subsystem(11))).unwrap();

    let platform = view.platform().unwrap();
    assert_eq!(platform.name(), "efi-x86_64");
    assert_eq!(platform.architecture().name(), "x86_64");
    assert_eq!(
        platform.default_calling_convention().unwrap().name(),
        "win64"
    );

    let sysv = platform.calling_convention_by_name("sysv").unwrap();
    assert!(platform.roles(sysv).is_empty());
}

#[test]
fn non_efi_subsystem() {
    let host = efi_host();
    // 2 is the Windows GUI subsystem.
    assert_eq!(platform_name(&host, pe_view(0x8664, subsystem(2))), None);
}

#[test]
fn missing_subsystem() {
    let host = efi_host();
    let metadata = Metadata::store().with("Machine", 0x8664u64);
    assert_eq!(platform_name(&host, pe_view(0x8664, metadata)), None);
}

#[test]
fn every_family_every_subsystem() {
    let host = efi_host();
    let expected = [
        (0x14c, "efi-x86"),
        (0x8664, "efi-x86_64"),
        (0x1c0, "efi-armv7"),
        (0x1c2, "efi-armv7"),
        (0x1c4, "efi-armv7"),
        (0xaa64, "efi-aarch64"),
    ];

    for (machine, name) in expected {
        for value in 10..=13 {
            assert_eq!(
                platform_name(&host, pe_view(machine, subsystem(value))),
                Some(name.to_string())
            );
        }
        assert_eq!(platform_name(&host, pe_view(machine, subsystem(14))), None);
        assert_eq!(platform_name(&host, pe_view(machine, subsystem(9))), None);
    }
}

#[test]
fn unknown_machine() {
    let host = efi_host();
    // MIPS R4000
    assert_eq!(platform_name(&host, pe_view(0x166, subsystem(10))), None);
}

#[test]
fn big_endian_not_routed() {
    let host = efi_host();
    let view = BinaryView::new("image", "PE", 0x8664, Endian::Big, subsystem(10));
    assert_eq!(platform_name(&host, view), None);
}

#[test]
fn registered_platforms() {
    let host = efi_host();
    let names = host
        .platforms()
        .platforms("efi")
        .iter()
        .map(|platform| platform.name())
        .collect::<Vec<&str>>();

    assert_eq!(
        names,
        vec!["efi-x86", "efi-x86_64", "efi-armv7", "efi-thumb2", "efi-aarch64"]
    );
}

#[test]
fn arm_and_thumb_related() {
    let host = efi_host();
    let armv7 = host.architectures().architecture("armv7").unwrap();
    let thumb2 = host.architectures().architecture("thumb2").unwrap();

    let arm = host.platforms().by_name("efi-armv7").unwrap();
    let thumb = host.platforms().by_name("efi-thumb2").unwrap();

    assert!(Arc::ptr_eq(&arm.related_platform(&thumb2).unwrap(), &thumb));
    assert!(Arc::ptr_eq(&thumb.related_platform(&armv7).unwrap(), &arm));

    assert_eq!(
        thumb.default_calling_convention().unwrap().name(),
        "cdecl"
    );
    assert!(arm.related_platform(&Architecture::aarch64()).is_none());

    let aarch64 = host.platforms().by_name("efi-aarch64").unwrap();
    assert!(aarch64.related_architectures().is_empty());
}

#[test]
fn register_twice() {
    let mut host = efi_host();
    assert!(host.load_plugin(&EfiPlugin::new()));

    assert_eq!(host.platforms().len(), 5);
    assert_eq!(host.plugins(), &["platform_efi".to_string()]);

    let view_type = host.view_types().get("PE").unwrap();
    for family in EfiFamily::all() {
        for machine in family.machines() {
            let signature = RecognitionSignature::new(*machine, Endian::Little);
            assert_eq!(view_type.recognizer_count(signature), 1);
        }
    }

    assert_eq!(
        platform_name(&host, pe_view(0x14c, subsystem(12))),
        Some("efi-x86".to_string())
    );
}

#[test]
fn amd64_without_win64() {
    let mut host = Host::with_defaults();
    host.architectures_mut()
        .register(Architecture::new("x86_64", Endian::Little, 64));
    assert!(host.load_plugin(&EfiPlugin::new()));

    let platform = host.platforms().by_name("efi-x86_64").unwrap();
    assert!(platform.default_calling_convention().is_none());
    assert_eq!(platform.calling_conventions().len(), 1);
    assert_eq!(platform.calling_conventions()[0].name(), "sysv");
}

#[test]
fn custom_brand_and_families() {
    let mut host = Host::with_defaults();
    let options = OptionsBuilder::new()
        .brand("uefi")
        .families(vec![EfiFamily::Aarch64])
        .build();
    assert!(host.load_plugin(&EfiPlugin::with_options(options)));

    assert!(host.platforms().platforms("efi").is_empty());
    assert_eq!(
        host.platforms()
            .by_architecture("uefi", "aarch64")
            .unwrap()
            .name(),
        "uefi-aarch64"
    );
    assert_eq!(platform_name(&host, pe_view(0x8664, subsystem(10))), None);
    assert_eq!(
        platform_name(&host, pe_view(0xaa64, subsystem(10))),
        Some("uefi-aarch64".to_string())
    );
}

#[test]
fn pe_images() {
    let host = efi_host();

    let view = host.open_pe("app.efi", pe_header(0x8664, true, 10)).unwrap();
    assert_eq!(view.platform().unwrap().name(), "efi-x86_64");

    let view = host.open_pe("driver.efi", pe_header(0x14c, false, 11)).unwrap();
    assert_eq!(view.platform().unwrap().name(), "efi-x86");

    // 3 is the Windows console subsystem.
    let view = host.open_pe("console.exe", pe_header(0x8664, true, 3)).unwrap();
    assert!(view.platform().is_none());
}

#[test]
fn json_images() {
    let host = efi_host();

    let view = json::from_str(r#"{ "machine": 43620, "metadata": { "Subsystem": 13 } }"#).unwrap();
    assert_eq!(platform_name(&host, view), Some("efi-aarch64".to_string()));

    let view = json::from_str(r#"{ "machine": 43620, "metadata": { "Subsystem": -13 } }"#).unwrap();
    assert_eq!(platform_name(&host, view), None);
}

#[test]
fn concurrent_recognition() {
    let host = Arc::new(efi_host());

    std::thread::scope(|scope| {
        for value in 0..16u64 {
            let host = host.clone();
            scope.spawn(move || {
                let expected = if (10..=13).contains(&value) {
                    Some("efi-x86_64".to_string())
                } else {
                    None
                };
                for _ in 0..100 {
                    assert_eq!(platform_name(&host, pe_view(0x8664, subsystem(value))), expected);
                }
            });
        }
    });
}
