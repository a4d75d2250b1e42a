use adler32::RollingAdler32;
use byteorder::{ByteOrder, NativeEndian};

use crate::compiler::InstructionSet;
use crate::oat::PAGE_SIZE;

pub const OAT_MAGIC: &[u8; 4] = b"oat\n";
pub const OAT_VERSION: &[u8; 4] = b"004\0";

/// Fixed-size header at offset 0 of the output.
///
/// The checksum is an Adler-32 rolled over every logically-in-file byte
/// except the header itself and inter-region padding, in stream order. It
/// accumulates during the layout pass and is final before emission
/// starts.
pub struct OatHeader {
    magic: [u8; 4],
    version: [u8; 4],
    checksum: RollingAdler32,
    instruction_set: InstructionSet,
    dex_file_count: u32,
    executable_offset: u32,
}

impl std::fmt::Debug for OatHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OatHeader")
            .field("magic", &self.magic)
            .field("version", &self.version)
            .field("checksum", &self.checksum.hash())
            .field("instruction_set", &self.instruction_set)
            .field("dex_file_count", &self.dex_file_count)
            .field("executable_offset", &self.executable_offset)
            .finish()
    }
}

impl OatHeader {
    /// Size of the serialized header: magic, version, checksum,
    /// instruction set, dex file count, executable offset.
    pub const SERIALIZED_SIZE: usize = 24;

    pub fn new(instruction_set: InstructionSet, dex_file_count: u32) -> Self {
        Self {
            magic: *OAT_MAGIC,
            version: *OAT_VERSION,
            checksum: RollingAdler32::new(),
            instruction_set,
            dex_file_count,
            executable_offset: 0,
        }
    }

    pub fn update_checksum(&mut self, bytes: &[u8]) {
        self.checksum.update_buffer(bytes);
    }

    pub fn update_checksum_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        NativeEndian::write_u32(&mut buf, value);
        self.checksum.update_buffer(&buf);
    }

    #[inline(always)]
    pub fn checksum(&self) -> u32 {
        self.checksum.hash()
    }

    #[inline(always)]
    pub fn instruction_set(&self) -> InstructionSet {
        self.instruction_set
    }

    #[inline(always)]
    pub fn dex_file_count(&self) -> u32 {
        self.dex_file_count
    }

    #[inline(always)]
    pub fn executable_offset(&self) -> u32 {
        self.executable_offset
    }

    pub fn set_executable_offset(&mut self, offset: u32) {
        debug_assert_eq!(offset % PAGE_SIZE, 0);
        self.executable_offset = offset;
    }

    /// Serialized form, host endianness, packed.
    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut buf = [0u8; Self::SERIALIZED_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version);
        NativeEndian::write_u32(&mut buf[8..12], self.checksum.hash());
        NativeEndian::write_u32(&mut buf[12..16], self.instruction_set as u32);
        NativeEndian::write_u32(&mut buf[16..20], self.dex_file_count);
        NativeEndian::write_u32(&mut buf[20..24], self.executable_offset);
        buf
    }
}

#[cfg(test)]
mod tests {
    use byteorder::ReadBytesExt;

    use super::*;

    #[test]
    fn test_serialized_layout() {
        let mut header = OatHeader::new(InstructionSet::Thumb2, 3);
        header.set_executable_offset(PAGE_SIZE);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), OatHeader::SERIALIZED_SIZE);
        assert_eq!(&bytes[0..4], OAT_MAGIC);
        assert_eq!(&bytes[4..8], OAT_VERSION);

        let mut rest = &bytes[8..];
        assert_eq!(rest.read_u32::<NativeEndian>().unwrap(), header.checksum());
        assert_eq!(
            rest.read_u32::<NativeEndian>().unwrap(),
            InstructionSet::Thumb2 as u32
        );
        assert_eq!(rest.read_u32::<NativeEndian>().unwrap(), 3);
        assert_eq!(rest.read_u32::<NativeEndian>().unwrap(), PAGE_SIZE);
    }

    #[test]
    fn test_rolling_checksum_matches_one_shot() {
        let mut header = OatHeader::new(InstructionSet::Arm, 1);
        header.update_checksum(b"hello ");
        header.update_checksum(b"world");
        assert_eq!(header.checksum(), adler32::adler32(&b"hello world"[..]).unwrap());
    }

    #[test]
    fn test_checksum_excludes_header_bytes() {
        let header = OatHeader::new(InstructionSet::Arm, 1);
        // freshly constructed header has the Adler-32 seed value
        assert_eq!(header.checksum(), 1);
    }
}
