use log::error;

pub mod dedup;
pub mod emit;
pub mod header;
pub mod layout;
pub mod structs;

pub use dedup::DedupIndex;
pub use header::{OatHeader, OAT_MAGIC, OAT_VERSION};
pub use structs::{OatClassTable, OatDexEntry, OatMethodOffsets, OatMethodTable};

use crate::compiler::Compiler;
use crate::dex::DexSource;
use crate::sink::OatSink;
use crate::Result;

/// Alignment of the executable region.
pub const PAGE_SIZE: u32 = 4096;

/// Frame size recorded for methods with no compiled body.
pub const STACK_ALIGNMENT: u32 = 16;

/// Receiver for per-method offset metadata in image mode. Implementations
/// resolve the runtime method (via their class linker) and store the
/// offsets on it; failing to resolve is a contract violation and should
/// be reported as [`crate::error::OatError::LayoutAssertion`].
pub trait MethodMetadataSink {
    fn backfill(
        &mut self,
        dex_index: usize,
        method_idx: u32,
        is_direct: bool,
        offsets: &OatMethodOffsets,
    ) -> Result<()>;
}

/// Two-pass serializer for the compiled-method container.
///
/// [`OatWriter::new`] runs the layout pass: it walks every method of
/// every class of every dex file, computes all file offsets, builds the
/// directory/class/method tables and the dedup index, and rolls the
/// header checksum. [`OatWriter::write`] then streams the identical bytes
/// to a sink, verifying the running position against the layout at every
/// step. The artifacts are immutable between the two passes.
pub struct OatWriter<'a, D: DexSource, C: Compiler> {
    pub(crate) dex_files: &'a [D],
    pub(crate) compiler: &'a C,
    pub(crate) image_sink: Option<&'a mut dyn MethodMetadataSink>,

    pub(crate) header: OatHeader,
    pub(crate) dex_entries: Vec<OatDexEntry>,
    pub(crate) class_tables: Vec<OatClassTable>,
    pub(crate) method_tables: Vec<OatMethodTable>,
    pub(crate) dedup: DedupIndex,
    pub(crate) executable_offset_padding: u32,
    pub(crate) size: u32,
}

impl<'a, D: DexSource, C: Compiler> std::fmt::Debug for OatWriter<'a, D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OatWriter")
            .field("header", &self.header)
            .field("dex_entries", &self.dex_entries)
            .field("class_tables", &self.class_tables)
            .field("method_tables", &self.method_tables)
            .field("dedup", &self.dedup)
            .field("executable_offset_padding", &self.executable_offset_padding)
            .field("size", &self.size)
            .finish()
    }
}

impl<'a, D: DexSource, C: Compiler> OatWriter<'a, D, C> {
    /// Lays out and writes the whole container in one call. Image-mode
    /// compilers need [`OatWriter::new`] with a metadata sink instead.
    pub fn create<S: OatSink>(sink: &mut S, dex_files: &'a [D], compiler: &'a C) -> Result<()> {
        let writer = Self::new(dex_files, compiler, None).map_err(|err| {
            error!("Failed to lay out oat file: {}", err);
            err
        })?;
        writer.write(sink).map_err(|err| {
            error!("Failed to write oat file to {}: {}", sink.name(), err);
            err
        })
    }

    #[inline(always)]
    pub fn header(&self) -> &OatHeader {
        &self.header
    }

    #[inline(always)]
    pub fn dex_entries(&self) -> &[OatDexEntry] {
        &self.dex_entries
    }

    #[inline(always)]
    pub fn class_tables(&self) -> &[OatClassTable] {
        &self.class_tables
    }

    /// Method tables in layout order: dex-file major, class-def minor.
    #[inline(always)]
    pub fn method_tables(&self) -> &[OatMethodTable] {
        &self.method_tables
    }

    #[inline(always)]
    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    /// Total logical size of the laid-out file in bytes.
    #[inline(always)]
    pub fn size(&self) -> u32 {
        self.size
    }
}
