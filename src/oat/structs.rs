use byteorder::{ByteOrder, NativeEndian};

use crate::error::OatError;
use crate::oat::header::OatHeader;
use crate::oat_err;
use crate::sink::OatSink;
use crate::Result;

pub(crate) fn write_bytes<S: OatSink>(
    sink: &mut S,
    bytes: &[u8],
    what: &'static str,
) -> Result<()> {
    match sink.write_all(bytes) {
        Ok(()) => Ok(()),
        Err(source) => oat_err!(SinkWrite {
            what,
            sink: sink.name().to_string(),
            source,
        }),
    }
}

pub(crate) fn write_u32<S: OatSink>(sink: &mut S, value: u32, what: &'static str) -> Result<()> {
    let mut buf = [0u8; 4];
    NativeEndian::write_u32(&mut buf, value);
    write_bytes(sink, &buf, what)
}

/// Directory entry for one input dex file: location string, the dex
/// file's own checksum, and the offset of its class table.
#[derive(Debug)]
pub struct OatDexEntry {
    location: Vec<u8>,
    dex_checksum: u32,
    pub class_table_offset: u32,
}

impl OatDexEntry {
    pub fn new(location: &str, dex_checksum: u32) -> Self {
        Self {
            location: location.as_bytes().to_vec(),
            dex_checksum,
            class_table_offset: 0,
        }
    }

    pub fn location(&self) -> &[u8] {
        &self.location
    }

    pub fn dex_checksum(&self) -> u32 {
        self.dex_checksum
    }

    pub fn size_on_disk(&self) -> u32 {
        (std::mem::size_of::<u32>() * 3 + self.location.len()) as u32
    }

    pub fn update_checksum(&self, header: &mut OatHeader) {
        header.update_checksum_u32(self.location.len() as u32);
        header.update_checksum(&self.location);
        header.update_checksum_u32(self.dex_checksum);
        header.update_checksum_u32(self.class_table_offset);
    }

    pub fn write<S: OatSink>(&self, sink: &mut S) -> Result<()> {
        write_u32(sink, self.location.len() as u32, "dex file location length")?;
        write_bytes(sink, &self.location, "dex file location data")?;
        write_u32(sink, self.dex_checksum, "dex file checksum")?;
        write_u32(sink, self.class_table_offset, "classes offset")
    }
}

/// Per-dex-file array of method-table offsets, one per class def.
#[derive(Debug)]
pub struct OatClassTable {
    pub method_table_offsets: Vec<u32>,
}

impl OatClassTable {
    pub fn new(num_class_defs: u32) -> Self {
        Self {
            method_table_offsets: vec![0; num_class_defs as usize],
        }
    }

    pub fn size_on_disk(&self) -> u32 {
        (self.method_table_offsets.len() * std::mem::size_of::<u32>()) as u32
    }

    pub fn update_checksum(&self, header: &mut OatHeader) {
        header.update_checksum(unsafe { plain::as_bytes(self.method_table_offsets.as_slice()) });
    }

    pub fn write<S: OatSink>(&self, sink: &mut S) -> Result<()> {
        write_bytes(
            sink,
            unsafe { plain::as_bytes(self.method_table_offsets.as_slice()) },
            "methods offsets",
        )
    }
}

/// Per-class array of method records, declaration order, direct methods
/// first.
#[derive(Debug)]
pub struct OatMethodTable {
    pub records: Vec<OatMethodOffsets>,
}

impl OatMethodTable {
    pub fn new(num_methods: usize) -> Self {
        Self {
            records: vec![OatMethodOffsets::default(); num_methods],
        }
    }

    pub fn size_on_disk(&self) -> u32 {
        (self.records.len() as u32) * OatMethodOffsets::SIZE
    }

    pub fn update_checksum(&self, header: &mut OatHeader) {
        header.update_checksum(unsafe { plain::as_bytes(self.records.as_slice()) });
    }

    pub fn write<S: OatSink>(&self, sink: &mut S) -> Result<()> {
        write_bytes(sink, unsafe { plain::as_bytes(self.records.as_slice()) }, "method offsets")
    }
}

/// Fixed-size record describing where one method's artifacts landed.
/// Offsets of 0 mean "absent"; `code_offset` carries the Thumb low-bit
/// tag when the target is Thumb code.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct OatMethodOffsets {
    pub code_offset: u32,
    pub frame_size_in_bytes: u32,
    pub core_spill_mask: u32,
    pub fp_spill_mask: u32,
    pub mapping_table_offset: u32,
    pub vmap_table_offset: u32,
    pub invoke_stub_offset: u32,
}

unsafe impl plain::Plain for OatMethodOffsets {}

impl OatMethodOffsets {
    pub const SIZE: u32 = std::mem::size_of::<OatMethodOffsets>() as u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_offsets_size() {
        assert_eq!(OatMethodOffsets::SIZE, 28);
    }

    #[test]
    fn test_dex_entry_size_on_disk() {
        let entry = OatDexEntry::new("classes.dex", 0xcafe);
        assert_eq!(entry.size_on_disk(), 4 + 11 + 4 + 4);
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(OatClassTable::new(3).size_on_disk(), 12);
        assert_eq!(OatMethodTable::new(2).size_on_disk(), 56);
        assert_eq!(OatMethodTable::new(0).size_on_disk(), 0);
    }

    #[test]
    fn test_dex_entry_checksum_feeds_emitted_form() {
        use crate::compiler::InstructionSet;

        let mut entry = OatDexEntry::new("a.dex", 7);
        entry.class_table_offset = 64;

        let mut header = OatHeader::new(InstructionSet::Arm, 1);
        entry.update_checksum(&mut header);

        let mut sink = crate::sink::MemorySink::new("[in-memory]");
        entry.write(&mut sink).unwrap();
        assert_eq!(
            header.checksum(),
            adler32::adler32(sink.bytes()).unwrap()
        );
    }
}
