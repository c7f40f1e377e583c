use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use imgstream_core::{Frame, ImageAssembler, ImageMetadata};
use imgstream_files::FileChunker;

fn bench_chunk_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_frame_encode");

    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        let frame = Frame::Chunk(Bytes::from(vec![0xAA; size]));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame).encode())
        });
    }

    group.finish();
}

fn bench_chunk_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_frame_decode");

    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        let packet = Frame::Chunk(Bytes::from(vec![0xBB; size]))
            .encode()
            .unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packet, |b, packet| {
            b.iter(|| Frame::decode(black_box(packet.clone())))
        });
    }

    group.finish();
}

fn bench_listing_codec(c: &mut Criterion) {
    let images: Vec<_> = (0..100)
        .map(|i| ImageMetadata::new(format!("image-{i:03}.png")))
        .collect();
    let frame = Frame::Listing(images);
    let packet = frame.encode().unwrap();

    let mut group = c.benchmark_group("listing_codec");
    group.throughput(Throughput::Bytes(packet.len() as u64));

    group.bench_function("encode_100_entries", |b| {
        b.iter(|| black_box(&frame).encode())
    });
    group.bench_function("decode_100_entries", |b| {
        b.iter(|| Frame::decode(black_box(packet.clone())))
    });

    group.finish();
}

fn bench_chunk_and_assemble(c: &mut Criterion) {
    let data = vec![0x42u8; 4 * 1024 * 1024];
    let mut group = c.benchmark_group("chunk_and_assemble");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [1024usize, 64 * 1024] {
        let chunker = FileChunker::with_chunk_size(chunk_size);
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunker,
            |b, chunker| {
                b.iter(|| {
                    let mut assembler = ImageAssembler::unbounded();
                    assembler
                        .accept_info(ImageMetadata::new("bench.png"))
                        .unwrap();
                    for chunk in chunker.split(black_box(&data)) {
                        assembler.accept_chunk(chunk).unwrap();
                    }
                    assembler.finish().unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chunk_frame_encode,
    bench_chunk_frame_decode,
    bench_listing_codec,
    bench_chunk_and_assemble
);
criterion_main!(benches);
