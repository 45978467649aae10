//! PE images, parsed with goblin.

use crate::architecture::Endian;
use crate::loader::BinaryView;
use crate::metadata::Metadata;
use crate::Error;
use log::trace;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// The name of the PE view type.
pub const VIEW_TYPE: &str = "PE";

/// A single PE file.
#[derive(Clone, Debug)]
pub struct Pe {
    bytes: Vec<u8>,
}

impl Pe {
    /// Create a new PE from the given bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Pe, Error> {
        goblin::pe::PE::parse(&bytes)?;
        Ok(Pe { bytes })
    }

    /// Load a PE from a file.
    pub fn from_file(filename: &Path) -> Result<Pe, Error> {
        let mut file = File::open(filename).map_err(|e| {
            Error::Custom(format!("Error opening {}: {}", filename.display(), e))
        })?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Pe::new(buf)
    }

    /// Return the goblin::pe::PE for this PE.
    fn pe(&self) -> Result<goblin::pe::PE<'_>, Error> {
        Ok(goblin::pe::PE::parse(&self.bytes)?)
    }

    /// The metadata a PE exposes to platform recognizers.
    ///
    /// `Subsystem`, `DllCharacteristics` and the header versions are only
    /// present when the image has an optional header.
    pub fn metadata(&self) -> Result<Metadata, Error> {
        let pe = self.pe()?;
        let coff_header = &pe.header.coff_header;

        let mut metadata = Metadata::store()
            .with("Machine", coff_header.machine)
            .with("Characteristics", coff_header.characteristics)
            .with("ImageBase", pe.image_base as u64)
            .with("EntryPoint", pe.entry as u64)
            .with("Is64", pe.is_64);

        if let Some(optional_header) = pe.header.optional_header {
            let windows_fields = &optional_header.windows_fields;
            metadata.set("Subsystem", windows_fields.subsystem);
            metadata.set("DllCharacteristics", windows_fields.dll_characteristics);
            metadata.set(
                "MajorSubsystemVersion",
                windows_fields.major_subsystem_version,
            );
            metadata.set(
                "MinorSubsystemVersion",
                windows_fields.minor_subsystem_version,
            );
        }

        trace!("PE metadata {}", metadata);

        Ok(metadata)
    }

    /// Create a `BinaryView` for this PE, without a platform.
    pub fn binary_view<S: Into<String>>(&self, name: S) -> Result<BinaryView, Error> {
        let pe = self.pe()?;
        let entry_point = (pe.image_base as u64)
            .checked_add(pe.entry as u64)
            .ok_or_else(|| {
                Error::UnsupportedImage(format!(
                    "entry point 0x{:x} overflows image base 0x{:x}",
                    pe.entry, pe.image_base
                ))
            })?;
        let mut view = BinaryView::new(
            name,
            VIEW_TYPE,
            pe.header.coff_header.machine as u32,
            Endian::Little,
            self.metadata()?,
        );
        view.set_image_base(pe.image_base as u64);
        view.set_entry_point(entry_point);
        Ok(view)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A PE header with no sections and no data directories.
    pub(crate) fn pe_header(machine: u16, pe32_plus: bool, subsystem: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x40];
        bytes[0] = b'M';
        bytes[1] = b'Z';
        bytes[0x3c..0x40].copy_from_slice(&0x40u32.to_le_bytes());

        let optional_header_size: u16 = if pe32_plus { 112 } else { 96 };

        bytes.extend_from_slice(b"PE\0\0");
        bytes.extend_from_slice(&machine.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // number_of_sections
        bytes.extend_from_slice(&0u32.to_le_bytes()); // time_date_stamp
        bytes.extend_from_slice(&0u32.to_le_bytes()); // pointer_to_symbol_table
        bytes.extend_from_slice(&0u32.to_le_bytes()); // number_of_symbol_table
        bytes.extend_from_slice(&optional_header_size.to_le_bytes());
        bytes.extend_from_slice(&0x0022u16.to_le_bytes()); // characteristics

        let mut optional_header = Vec::new();
        // standard fields
        optional_header.extend_from_slice(&(if pe32_plus { 0x20bu16 } else { 0x10bu16 }).to_le_bytes());
        optional_header.extend_from_slice(&[14, 0]); // linker version
        optional_header.extend_from_slice(&0x1000u32.to_le_bytes()); // size_of_code
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // size_of_initialized_data
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // size_of_uninitialized_data
        optional_header.extend_from_slice(&0x1000u32.to_le_bytes()); // address_of_entry_point
        optional_header.extend_from_slice(&0x1000u32.to_le_bytes()); // base_of_code
        if !pe32_plus {
            optional_header.extend_from_slice(&0u32.to_le_bytes()); // base_of_data
        }

        // windows fields
        if pe32_plus {
            optional_header.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        } else {
            optional_header.extend_from_slice(&0x40_0000u32.to_le_bytes());
        }
        optional_header.extend_from_slice(&0x1000u32.to_le_bytes()); // section_alignment
        optional_header.extend_from_slice(&0x200u32.to_le_bytes()); // file_alignment
        optional_header.extend_from_slice(&[0; 8]); // os and image versions
        optional_header.extend_from_slice(&1u16.to_le_bytes()); // major_subsystem_version
        optional_header.extend_from_slice(&0u16.to_le_bytes()); // minor_subsystem_version
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // win32_version_value
        optional_header.extend_from_slice(&0x2000u32.to_le_bytes()); // size_of_image
        optional_header.extend_from_slice(&0x200u32.to_le_bytes()); // size_of_headers
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // check_sum
        optional_header.extend_from_slice(&subsystem.to_le_bytes());
        optional_header.extend_from_slice(&0u16.to_le_bytes()); // dll_characteristics
        let stack_and_heap = if pe32_plus { 32 } else { 16 };
        optional_header.extend_from_slice(&vec![0; stack_and_heap]);
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // loader_flags
        optional_header.extend_from_slice(&0u32.to_le_bytes()); // number_of_rva_and_sizes

        assert_eq!(optional_header.len(), optional_header_size as usize);
        bytes.extend_from_slice(&optional_header);
        bytes.resize(0x200, 0);
        bytes
    }

    #[test]
    fn pe32_plus_metadata() {
        let pe = Pe::new(pe_header(0x8664, true, 10)).unwrap();
        let metadata = pe.metadata().unwrap();

        assert_eq!(
            metadata.get("Subsystem").and_then(|m| m.as_unsigned_integer()),
            Some(10)
        );
        assert_eq!(
            metadata.get("Machine").and_then(|m| m.as_unsigned_integer()),
            Some(0x8664)
        );
        assert_eq!(metadata.get("Is64"), Some(&Metadata::Boolean(true)));

        let view = pe.binary_view("app.efi").unwrap();
        assert_eq!(view.machine(), 0x8664);
        assert_eq!(view.endian(), Endian::Little);
        assert_eq!(view.image_base(), 0x1_0000_0000);
        assert_eq!(view.entry_point(), 0x1_0000_1000);
        assert!(view.platform().is_none());
    }

    #[test]
    fn pe32_metadata() {
        let pe = Pe::new(pe_header(0x14c, false, 12)).unwrap();
        let view = pe.binary_view("driver.efi").unwrap();

        assert_eq!(view.machine(), 0x14c);
        assert_eq!(
            view.metadata().get("Subsystem").and_then(|m| m.as_unsigned_integer()),
            Some(12)
        );
        assert_eq!(view.image_base(), 0x40_0000);
    }

    #[test]
    fn entry_point_overflow() {
        let mut bytes = pe_header(0x8664, true, 10);
        // PE32+ ImageBase, after the signature, COFF header and standard fields
        bytes[0x70..0x78].copy_from_slice(&0xffff_ffff_ffff_f000u64.to_le_bytes());

        let pe = Pe::new(bytes).unwrap();
        assert_eq!(
            pe.metadata().unwrap().get("ImageBase").and_then(|m| m.as_unsigned_integer()),
            Some(0xffff_ffff_ffff_f000)
        );
        assert!(matches!(
            pe.binary_view("x"),
            Err(Error::UnsupportedImage(_))
        ));
    }

    #[test]
    fn not_a_pe() {
        assert!(Pe::new(vec![0x7f, b'E', b'L', b'F', 0, 0, 0, 0]).is_err());
    }
}
