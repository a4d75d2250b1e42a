use std::collections::hash_map::Entry;

use log::debug;

use crate::compiler::{round_up, Compiler, MethodRef};
use crate::dex::DexSource;
use crate::error::OatError;
use crate::oat::{
    DedupIndex, MethodMetadataSink, OatClassTable, OatDexEntry, OatHeader, OatMethodOffsets,
    OatMethodTable, OatWriter, PAGE_SIZE, STACK_ALIGNMENT,
};
use crate::oat_err;
use crate::Result;

impl<'a, D: DexSource, C: Compiler> OatWriter<'a, D, C> {
    /// Runs the layout pass over `dex_files`. On return every table is
    /// populated, the header checksum is final, and [`OatWriter::size`]
    /// is the size of the file the emit pass will produce.
    ///
    /// `image_sink` is required whenever `compiler.is_image()` holds; the
    /// per-method offsets are pushed through it as they are computed.
    pub fn new(
        dex_files: &'a [D],
        compiler: &'a C,
        image_sink: Option<&'a mut dyn MethodMetadataSink>,
    ) -> Result<Self> {
        let mut writer = Self {
            dex_files,
            compiler,
            image_sink,
            header: OatHeader::new(compiler.instruction_set(), dex_files.len() as u32),
            dex_entries: Vec::with_capacity(dex_files.len()),
            class_tables: Vec::with_capacity(dex_files.len()),
            method_tables: Vec::new(),
            dedup: DedupIndex::new(),
            executable_offset_padding: 0,
            size: 0,
        };

        let mut offset = writer.init_header();
        offset = writer.init_dex_entries(offset);
        offset = writer.init_class_tables(offset);
        offset = writer.init_method_tables(offset);
        offset = writer.init_executable_offset(offset);
        offset = writer.init_code(offset)?;
        writer.size = offset;

        debug_assert_eq!(writer.dex_files.len(), writer.dex_entries.len());
        debug_assert_eq!(writer.dex_files.len(), writer.class_tables.len());
        debug!(
            "oat layout complete: {} dex files, {} classes, {} deduplicated blobs, {} bytes",
            writer.dex_files.len(),
            writer.method_tables.len(),
            writer.dedup.len(),
            writer.size,
        );
        Ok(writer)
    }

    fn init_header(&self) -> u32 {
        // reserved, not checksummed
        OatHeader::SERIALIZED_SIZE as u32
    }

    fn init_dex_entries(&mut self, mut offset: u32) -> u32 {
        for dex in self.dex_files {
            let entry = OatDexEntry::new(dex.location(), dex.header_checksum());
            offset += entry.size_on_disk();
            self.dex_entries.push(entry);
        }
        offset
    }

    fn init_class_tables(&mut self, mut offset: u32) -> u32 {
        for (dex_index, dex) in self.dex_files.iter().enumerate() {
            self.dex_entries[dex_index].class_table_offset = offset;
            self.dex_entries[dex_index].update_checksum(&mut self.header);

            let table = OatClassTable::new(dex.num_class_defs());
            offset += table.size_on_disk();
            self.class_tables.push(table);
        }
        offset
    }

    fn init_method_tables(&mut self, mut offset: u32) -> u32 {
        for (dex_index, dex) in self.dex_files.iter().enumerate() {
            for class_def_index in 0..dex.num_class_defs() {
                self.class_tables[dex_index].method_table_offsets[class_def_index as usize] =
                    offset;

                // an empty class, such as a marker interface, has no methods
                let num_methods = dex
                    .class_data(class_def_index)
                    .map_or(0, |class_data| class_data.num_methods());
                let table = OatMethodTable::new(num_methods);
                offset += table.size_on_disk();
                self.method_tables.push(table);
            }
            self.class_tables[dex_index].update_checksum(&mut self.header);
        }
        offset
    }

    fn init_executable_offset(&mut self, offset: u32) -> u32 {
        // the code region starts on a fresh page
        let aligned = round_up(offset, PAGE_SIZE);
        self.executable_offset_padding = aligned - offset;
        self.header.set_executable_offset(aligned);
        aligned
    }

    fn init_code(&mut self, mut offset: u32) -> Result<u32> {
        let mut table_index = 0;
        for dex_index in 0..self.dex_files.len() {
            let num_class_defs = self.dex_files[dex_index].num_class_defs();
            for class_def_index in 0..num_class_defs {
                offset = self.init_code_class(offset, dex_index, class_def_index, table_index)?;
                self.method_tables[table_index].update_checksum(&mut self.header);
                table_index += 1;
            }
        }
        Ok(offset)
    }

    fn init_code_class(
        &mut self,
        mut offset: u32,
        dex_index: usize,
        class_def_index: u32,
        table_index: usize,
    ) -> Result<u32> {
        let dex = &self.dex_files[dex_index];
        let class_data = match dex.class_data(class_def_index) {
            Some(class_data) => class_data,
            None => return Ok(offset),
        };
        debug_assert_eq!(
            self.method_tables[table_index].records.len(),
            class_data.num_methods()
        );

        for (method_index, method) in class_data.methods().enumerate() {
            debug_assert!(method.is_direct || !method.member.is_static());
            offset = self.init_code_method(
                offset,
                dex_index,
                table_index,
                method_index,
                method.is_static(),
                method.is_direct,
                method.member.index,
            )?;
        }
        Ok(offset)
    }

    #[allow(clippy::too_many_arguments)]
    fn init_code_method(
        &mut self,
        mut offset: u32,
        dex_index: usize,
        table_index: usize,
        method_index: usize,
        is_static: bool,
        is_direct: bool,
        dex_method_index: u32,
    ) -> Result<u32> {
        let dex = &self.dex_files[dex_index];
        let compiler = self.compiler;

        let mut record = OatMethodOffsets {
            frame_size_in_bytes: STACK_ALIGNMENT,
            ..OatMethodOffsets::default()
        };

        let compiled = compiler.get_compiled_method(MethodRef {
            dex_location: dex.location(),
            dex_method_index,
        });

        if let Some(compiled) = compiled {
            offset = compiled.align_code(offset);
            debug_assert_eq!(offset % compiled.instruction_set.code_alignment(), 0);

            let code = &compiled.code;
            let thumb_delta = compiled.code_delta();
            record.code_offset = if code.is_empty() { 0 } else { offset + thumb_delta };

            match self.dedup.code.entry(code.id()) {
                Entry::Occupied(first) => record.code_offset = *first.get(),
                Entry::Vacant(slot) => {
                    slot.insert(record.code_offset);
                    offset += code.byte_len();
                    self.header.update_checksum(code.as_bytes());
                }
            }

            record.frame_size_in_bytes = compiled.frame_size_in_bytes;
            record.core_spill_mask = compiled.core_spill_mask;
            record.fp_spill_mask = compiled.fp_spill_mask;
        }

        // the three inline words follow the code for every method,
        // compiled or not
        offset += 4;
        self.header.update_checksum_u32(record.frame_size_in_bytes);
        offset += 4;
        self.header.update_checksum_u32(record.core_spill_mask);
        offset += 4;
        self.header.update_checksum_u32(record.fp_spill_mask);

        if let Some(compiled) = compiled {
            let mapping = &compiled.mapping_table;
            record.mapping_table_offset = if mapping.is_empty() { 0 } else { offset };
            match self.dedup.mapping.entry(mapping.id()) {
                Entry::Occupied(first) => record.mapping_table_offset = *first.get(),
                Entry::Vacant(slot) => {
                    slot.insert(record.mapping_table_offset);
                    offset += mapping.byte_len();
                    self.header.update_checksum(mapping.as_bytes());
                }
            }

            let vmap = &compiled.vmap_table;
            record.vmap_table_offset = if vmap.is_empty() { 0 } else { offset };
            match self.dedup.vmap.entry(vmap.id()) {
                Entry::Occupied(first) => record.vmap_table_offset = *first.get(),
                Entry::Vacant(slot) => {
                    slot.insert(record.vmap_table_offset);
                    offset += vmap.byte_len();
                    self.header.update_checksum(vmap.as_bytes());
                }
            }
        }

        let shorty = dex.method_shorty(dex_method_index);
        if let Some(stub) = compiler.find_invoke_stub(is_static, shorty) {
            offset = compiler.instruction_set().align_code(offset);
            debug_assert_eq!(offset % compiler.instruction_set().code_alignment(), 0);

            let stub_code = &stub.code;
            record.invoke_stub_offset = if stub_code.is_empty() { 0 } else { offset };

            // stubs share the code map with method code
            match self.dedup.code.entry(stub_code.id()) {
                Entry::Occupied(first) => record.invoke_stub_offset = *first.get(),
                Entry::Vacant(slot) => {
                    slot.insert(record.invoke_stub_offset);
                    offset += stub_code.byte_len();
                    self.header.update_checksum(stub_code.as_bytes());
                }
            }
        }

        self.method_tables[table_index].records[method_index] = record;

        if compiler.is_image() {
            match &mut self.image_sink {
                Some(sink) => sink.backfill(dex_index, dex_method_index, is_direct, &record)?,
                None => {
                    return oat_err!(
                        LayoutAssertion,
                        "Image mode requires a method metadata sink to back-fill {}",
                        dex.pretty_method(dex_method_index)
                    );
                }
            }
        }
        Ok(offset)
    }
}
