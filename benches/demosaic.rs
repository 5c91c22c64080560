use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use raw_develop::image_pipeline::color::ColorMatrix;
use raw_develop::image_pipeline::common::{PixelBuffer, RgbaBufferF32, SparseColorBuffer};
use raw_develop::image_pipeline::{
    CancellationToken, CfaPattern, DemosaicAlgorithm, OutputConfig, StandardTiffWriter,
    TiffCompression, TiffWriter,
};

fn synthetic_mosaic(width: usize, height: usize, cfa: &CfaPattern) -> SparseColorBuffer {
    let mut buffer = SparseColorBuffer::new(width, height).unwrap();
    buffer.colors = 3;
    for row in 0..height {
        for col in 0..width {
            let c = cfa.color(row, col);
            let value = 4000 + ((row * 7 + col * 13) % 512) * 40 + c * 3000;
            buffer.pixels[(row, col)][c] = value as u16;
        }
    }
    buffer
}

fn bench_demosaic(c: &mut Criterion) {
    let cfa = CfaPattern::rggb().merge_greens();
    let (w, h) = (1024, 768);
    let input = synthetic_mosaic(w, h, &cfa);
    let cam_to_xyz = ColorMatrix::srgb_to_xyz();
    let cancel = CancellationToken::new();

    let mut group = c.benchmark_group("demosaic_1024x768");
    group.sample_size(10);
    for algorithm in [
        DemosaicAlgorithm::Linear,
        DemosaicAlgorithm::Lmmse,
        DemosaicAlgorithm::Ahd,
    ] {
        let demosaicer = algorithm.demosaicer();
        group.bench_function(demosaicer.name(), |b| {
            b.iter(|| {
                demosaicer
                    .demosaic(black_box(input.clone()), &cfa, &cam_to_xyz, &cancel)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_tiff_compression(c: &mut Criterion) {
    let (w, h) = (512, 512);
    let pixels = (0..w * h)
        .map(|i| {
            let v = (i % w) as f32 / w as f32;
            [v, 1.0 - v, 0.5, 1.0]
        })
        .collect();
    let image: RgbaBufferF32 = PixelBuffer::from_pixels(w, h, pixels).unwrap();

    let mut group = c.benchmark_group("tiff_compression");
    for (compression, label) in [
        (TiffCompression::None, "none"),
        (TiffCompression::Lzw, "lzw"),
        (TiffCompression::DeflateFast, "deflate_fast"),
    ] {
        let config = OutputConfig::builder()
            .compression(compression)
            .predictor(Some(2))
            .build();
        group.bench_with_input(BenchmarkId::from_parameter(label), &image, |b, image| {
            b.iter(|| {
                let mut output = Vec::new();
                StandardTiffWriter
                    .write_rgba(black_box(image), &mut output, &config)
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_demosaic, bench_tiff_compression);
criterion_main!(benches);
