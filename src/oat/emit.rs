use byteorder::{ByteOrder, NativeEndian};
use log::debug;

use crate::compiler::{Compiler, MethodRef};
use crate::dex::DexSource;
use crate::error::OatError;
use crate::oat::structs::write_bytes;
use crate::oat::{OatMethodOffsets, OatWriter};
use crate::oat_err;
use crate::sink::OatSink;
use crate::Result;

fn seek_relative<S: OatSink>(sink: &mut S, delta: i64) -> Result<u64> {
    match sink.seek_relative(delta) {
        Ok(pos) => Ok(pos),
        Err(source) => oat_err!(SinkSeekFailed {
            sink: sink.name().to_string(),
            source,
        }),
    }
}

fn write_method_bytes<S: OatSink, D: DexSource>(
    sink: &mut S,
    bytes: &[u8],
    what: &'static str,
    dex: &D,
    method_idx: u32,
) -> Result<()> {
    match sink.write_all(bytes) {
        Ok(()) => Ok(()),
        Err(source) => oat_err!(MethodSinkWrite {
            what,
            method: dex.pretty_method(method_idx),
            sink: sink.name().to_string(),
            source,
        }),
    }
}

fn write_method_u32<S: OatSink, D: DexSource>(
    sink: &mut S,
    value: u32,
    what: &'static str,
    dex: &D,
    method_idx: u32,
) -> Result<()> {
    let mut buf = [0u8; 4];
    NativeEndian::write_u32(&mut buf, value);
    write_method_bytes(sink, &buf, what, dex, method_idx)
}

impl<'a, D: DexSource, C: Compiler> OatWriter<'a, D, C> {
    /// Emit pass: streams the laid-out image to `sink`, which must be
    /// positioned at byte 0. Stops at the first failure; partial output
    /// is left behind for the caller to clean up.
    pub fn write<S: OatSink>(&self, sink: &mut S) -> Result<()> {
        write_bytes(sink, &self.header.to_bytes(), "oat header")?;
        self.write_tables(sink)?;

        let mut code_offset = self.write_code(sink)?;
        let mut table_index = 0;
        for (dex_index, dex) in self.dex_files.iter().enumerate() {
            for class_def_index in 0..dex.num_class_defs() {
                code_offset =
                    self.write_code_class(sink, code_offset, dex_index, class_def_index, table_index)?;
                table_index += 1;
            }
        }
        debug_assert_eq!(code_offset, self.size);

        debug!(
            "oat image written to {}: {} dex files, {} bytes laid out",
            sink.name(),
            self.dex_files.len(),
            self.size,
        );
        Ok(())
    }

    fn write_tables<S: OatSink>(&self, sink: &mut S) -> Result<()> {
        for entry in &self.dex_entries {
            entry.write(sink)?;
        }
        for table in &self.class_tables {
            table.write(sink)?;
        }
        for table in &self.method_tables {
            table.write(sink)?;
        }
        Ok(())
    }

    /// Skips over the executable-region padding without writing and
    /// verifies the sink landed on the page boundary layout chose.
    fn write_code<S: OatSink>(&self, sink: &mut S) -> Result<u32> {
        let code_offset = self.header.executable_offset();
        let new_pos = seek_relative(sink, i64::from(self.executable_offset_padding))?;
        if new_pos != u64::from(code_offset) {
            return oat_err!(SinkSeek {
                sink: sink.name().to_string(),
                expected: u64::from(code_offset),
                actual: new_pos,
            });
        }
        Ok(code_offset)
    }

    fn write_code_class<S: OatSink>(
        &self,
        sink: &mut S,
        mut code_offset: u32,
        dex_index: usize,
        class_def_index: u32,
        table_index: usize,
    ) -> Result<u32> {
        let dex = &self.dex_files[dex_index];
        let class_data = match dex.class_data(class_def_index) {
            Some(class_data) => class_data,
            None => return Ok(code_offset),
        };

        for (method_index, method) in class_data.methods().enumerate() {
            code_offset = self.write_code_method(
                sink,
                code_offset,
                dex,
                table_index,
                method_index,
                method.is_static(),
                method.member.index,
            )?;
        }
        Ok(code_offset)
    }

    /// Seek forward by `delta` so the next chunk starts at `aligned`.
    fn align_forward<S: OatSink>(&self, sink: &mut S, aligned: u32, delta: u32) -> Result<()> {
        let new_pos = seek_relative(sink, i64::from(delta))?;
        if new_pos != u64::from(aligned) {
            return oat_err!(SinkSeek {
                sink: sink.name().to_string(),
                expected: u64::from(aligned),
                actual: new_pos,
            });
        }
        Ok(())
    }

    /// The running cursor must agree with the sink's absolute position at
    /// every synchronization point of the emit pass.
    fn check_code_offset<S: OatSink>(&self, sink: &mut S, code_offset: u32) -> Result<()> {
        let pos = seek_relative(sink, 0)?;
        if pos != u64::from(code_offset) {
            return oat_err!(SinkSeek {
                sink: sink.name().to_string(),
                expected: u64::from(code_offset),
                actual: pos,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_code_method<S: OatSink>(
        &self,
        sink: &mut S,
        mut code_offset: u32,
        dex: &D,
        table_index: usize,
        method_index: usize,
        is_static: bool,
        dex_method_index: u32,
    ) -> Result<u32> {
        let record: &OatMethodOffsets = &self.method_tables[table_index].records[method_index];
        let compiled = self.compiler.get_compiled_method(MethodRef {
            dex_location: dex.location(),
            dex_method_index,
        });

        let mut frame_size_in_bytes = 0;
        let mut core_spill_mask = 0;
        let mut fp_spill_mask = 0;

        if let Some(compiled) = compiled {
            let aligned = compiled.align_code(code_offset);
            if aligned != code_offset {
                self.align_forward(sink, aligned, aligned - code_offset)?;
                code_offset = aligned;
            }
            debug_assert_eq!(code_offset % compiled.instruction_set.code_alignment(), 0);

            let code = &compiled.code;
            let expected = code_offset + compiled.code_delta();
            let absent = code.is_empty() && record.code_offset == 0;
            match self.dedup.code.get(&code.id()) {
                Some(&first_offset) if expected != record.code_offset => {
                    // dedup hit: the bytes live at their first placement,
                    // the cursor does not move
                    if !absent && first_offset != record.code_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Code offset for {} is {:#x}, layout placed the blob at {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.code_offset,
                            first_offset
                        );
                    }
                }
                _ => {
                    if !absent && expected != record.code_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Code offset for {} is {:#x}, emit cursor reached {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.code_offset,
                            expected
                        );
                    }
                    write_method_bytes(sink, code.as_bytes(), "method code", dex, dex_method_index)?;
                    code_offset += code.byte_len();
                }
            }
            self.check_code_offset(sink, code_offset)?;

            frame_size_in_bytes = compiled.frame_size_in_bytes;
            core_spill_mask = compiled.core_spill_mask;
            fp_spill_mask = compiled.fp_spill_mask;
        }

        write_method_u32(sink, frame_size_in_bytes, "method frame size", dex, dex_method_index)?;
        code_offset += 4;
        write_method_u32(sink, core_spill_mask, "method core spill mask", dex, dex_method_index)?;
        code_offset += 4;
        write_method_u32(sink, fp_spill_mask, "method fp spill mask", dex, dex_method_index)?;
        code_offset += 4;

        if let Some(compiled) = compiled {
            let mapping = &compiled.mapping_table;
            let absent = mapping.is_empty() && record.mapping_table_offset == 0;
            match self.dedup.mapping.get(&mapping.id()) {
                Some(&first_offset) if code_offset != record.mapping_table_offset => {
                    if !absent && first_offset != record.mapping_table_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Mapping table offset for {} is {:#x}, layout placed the blob at {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.mapping_table_offset,
                            first_offset
                        );
                    }
                }
                _ => {
                    if !absent && code_offset != record.mapping_table_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Mapping table offset for {} is {:#x}, emit cursor reached {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.mapping_table_offset,
                            code_offset
                        );
                    }
                    write_method_bytes(sink, mapping.as_bytes(), "mapping table", dex, dex_method_index)?;
                    code_offset += mapping.byte_len();
                }
            }
            self.check_code_offset(sink, code_offset)?;

            let vmap = &compiled.vmap_table;
            let absent = vmap.is_empty() && record.vmap_table_offset == 0;
            match self.dedup.vmap.get(&vmap.id()) {
                Some(&first_offset) if code_offset != record.vmap_table_offset => {
                    if !absent && first_offset != record.vmap_table_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Vmap table offset for {} is {:#x}, layout placed the blob at {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.vmap_table_offset,
                            first_offset
                        );
                    }
                }
                _ => {
                    if !absent && code_offset != record.vmap_table_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Vmap table offset for {} is {:#x}, emit cursor reached {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.vmap_table_offset,
                            code_offset
                        );
                    }
                    write_method_bytes(sink, vmap.as_bytes(), "vmap table", dex, dex_method_index)?;
                    code_offset += vmap.byte_len();
                }
            }
            self.check_code_offset(sink, code_offset)?;
        }

        let shorty = dex.method_shorty(dex_method_index);
        if let Some(stub) = self.compiler.find_invoke_stub(is_static, shorty) {
            let aligned = self.compiler.instruction_set().align_code(code_offset);
            if aligned != code_offset {
                self.align_forward(sink, aligned, aligned - code_offset)?;
                code_offset = aligned;
            }
            debug_assert_eq!(
                code_offset % self.compiler.instruction_set().code_alignment(),
                0
            );

            let stub_code = &stub.code;
            let absent = stub_code.is_empty() && record.invoke_stub_offset == 0;
            match self.dedup.code.get(&stub_code.id()) {
                Some(&first_offset) if code_offset != record.invoke_stub_offset => {
                    if !absent && first_offset != record.invoke_stub_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Invoke stub offset for {} is {:#x}, layout placed the blob at {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.invoke_stub_offset,
                            first_offset
                        );
                    }
                }
                _ => {
                    if !absent && code_offset != record.invoke_stub_offset {
                        return oat_err!(
                            LayoutAssertion,
                            "Invoke stub offset for {} is {:#x}, emit cursor reached {:#x}",
                            dex.pretty_method(dex_method_index),
                            record.invoke_stub_offset,
                            code_offset
                        );
                    }
                    write_method_bytes(
                        sink,
                        stub_code.as_bytes(),
                        "invoke stub code",
                        dex,
                        dex_method_index,
                    )?;
                    code_offset += stub_code.byte_len();
                }
            }
            self.check_code_offset(sink, code_offset)?;
        }
        Ok(code_offset)
    }
}
