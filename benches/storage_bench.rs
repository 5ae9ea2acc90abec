//! Benchmarks for lobstore object I/O

use std::io::{Read, Write};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lobstore::{BlockStore, Config, LargeObjectStore, MemoryBlockStore, ObjectStream};

const OBJECT_SIZE: usize = 1024 * 1024;

fn setup_store() -> Arc<LargeObjectStore> {
    let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
    let (store, _) = LargeObjectStore::create(blocks, &Config::default()).unwrap();
    Arc::new(store)
}

fn payload() -> Vec<u8> {
    (0..OBJECT_SIZE).map(|i| (i % 251) as u8).collect()
}

fn storage_benchmarks(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("object_io");
    group.throughput(Throughput::Bytes(OBJECT_SIZE as u64));

    for compressed in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("stream_write", compressed),
            &compressed,
            |b, &compressed| {
                let store = setup_store();
                b.iter(|| {
                    let object = store.create_object(OBJECT_SIZE as i64, compressed).unwrap();
                    let id = object.id();
                    let mut stream = ObjectStream::new(Arc::clone(&store), object);
                    stream.write_all(&data).unwrap();
                    stream.complete().unwrap();
                    store.establish_reference(id).unwrap();
                    store.release_reference(id).unwrap();
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("stream_read", compressed),
            &compressed,
            |b, &compressed| {
                let store = setup_store();
                let object = store.create_object(OBJECT_SIZE as i64, compressed).unwrap();
                let id = object.id();
                let mut stream = ObjectStream::new(Arc::clone(&store), object);
                stream.write_all(&data).unwrap();
                stream.complete().unwrap();

                let mut out = Vec::with_capacity(OBJECT_SIZE);
                b.iter(|| {
                    out.clear();
                    let mut reader = ObjectStream::new(Arc::clone(&store), store.get_object(id).unwrap());
                    reader.read_to_end(&mut out).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
