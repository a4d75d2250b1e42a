use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};

use oatrs::compiler::{Blob, BlobId, Compiler, CompiledMethod, InstructionSet, InvokeStub, MethodRef};
use oatrs::dex::{AccessFlags, ClassData, ClassMember, DexSource};
use oatrs::oat::OatWriter;
use oatrs::sink::MemorySink;

struct BenchDex {
    location: String,
    classes: Vec<Option<ClassData>>,
}

impl DexSource for BenchDex {
    fn location(&self) -> &str {
        &self.location
    }

    fn header_checksum(&self) -> u32 {
        0x5a5a_5a5a
    }

    fn num_class_defs(&self) -> u32 {
        self.classes.len() as u32
    }

    fn class_data(&self, class_def_index: u32) -> Option<&ClassData> {
        self.classes[class_def_index as usize].as_ref()
    }

    fn method_shorty(&self, _method_idx: u32) -> &str {
        "V"
    }
}

struct BenchCompiler {
    methods: HashMap<(String, u32), CompiledMethod>,
    stub: InvokeStub,
}

impl Compiler for BenchCompiler {
    fn get_compiled_method(&self, method: MethodRef<'_>) -> Option<&CompiledMethod> {
        self.methods
            .get(&(method.dex_location.to_string(), method.dex_method_index))
    }

    fn find_invoke_stub(&self, is_static: bool, _shorty: &str) -> Option<&InvokeStub> {
        is_static.then_some(&self.stub)
    }

    fn instruction_set(&self) -> InstructionSet {
        InstructionSet::Thumb2
    }
}

fn build_input() -> (Vec<BenchDex>, BenchCompiler) {
    let mut methods = HashMap::new();
    let mut dex_files = Vec::new();
    let mut blob_id = 1u64;

    for dex_index in 0..4 {
        let location = format!("classes{}.dex", dex_index);
        let mut classes = Vec::new();
        for class_index in 0..16u32 {
            let mut class_data = ClassData::default();
            let mut prev_code: Option<(u64, Vec<u8>)> = None;
            for method_index in 0..4u32 {
                let method_idx = class_index * 4 + method_index;
                let is_static = method_index % 2 == 0;
                let mut flags = AccessFlags::PUBLIC;
                if is_static {
                    flags |= AccessFlags::STATIC;
                }
                class_data
                    .direct_methods
                    .push(ClassMember::new(flags, method_idx));

                // every fourth method reuses the previous code blob
                let (code_id, code_bytes) = match (&prev_code, method_index) {
                    (Some((id, bytes)), 3) => (*id, bytes.clone()),
                    _ => (
                        blob_id,
                        vec![(method_idx & 0xff) as u8; 64 + (method_idx as usize % 32)],
                    ),
                };
                prev_code = Some((code_id, code_bytes.clone()));
                methods.insert(
                    (location.clone(), method_idx),
                    CompiledMethod {
                        instruction_set: InstructionSet::Thumb2,
                        code: Blob::new(BlobId(code_id), code_bytes),
                        frame_size_in_bytes: 64,
                        core_spill_mask: 0x4ff0,
                        fp_spill_mask: 0,
                        mapping_table: Blob::new(BlobId(blob_id + 1_000), vec![method_idx; 8]),
                        vmap_table: Blob::new(BlobId(blob_id + 2_000), vec![method_idx as u16; 4]),
                    },
                );
                blob_id += 1;
            }
            classes.push(Some(class_data));
        }
        dex_files.push(BenchDex { location, classes });
    }

    let compiler = BenchCompiler {
        methods,
        stub: InvokeStub {
            code: Blob::new(BlobId(900_000), vec![0xB5u8; 32]),
        },
    };
    (dex_files, compiler)
}

fn layout_and_write(c: &mut Criterion) {
    let (dex_files, compiler) = build_input();
    c.bench_function("layout_and_write", |b| {
        b.iter(|| {
            let writer = OatWriter::new(&dex_files, &compiler, None).unwrap();
            let mut sink = MemorySink::new("[bench]");
            writer.write(&mut sink).unwrap();
            assert!(!sink.bytes().is_empty());
        })
    });
}

fn layout_only(c: &mut Criterion) {
    let (dex_files, compiler) = build_input();
    c.bench_function("layout_only", |b| {
        b.iter(|| {
            let writer = OatWriter::new(&dex_files, &compiler, None).unwrap();
            assert!(writer.size() > 0);
        })
    });
}

criterion_group!(benches, layout_and_write, layout_only);
criterion_main!(benches);
