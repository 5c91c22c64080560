use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use raw_develop::image_pipeline::cache::StageResult;
use raw_develop::image_pipeline::color::ColorMatrix;
use raw_develop::image_pipeline::common::RgbaBufferF32;
use raw_develop::image_pipeline::filter_graph::FilterGraph;
use raw_develop::image_pipeline::raw::BlackLevels;
use raw_develop::image_pipeline::{
    Adjustments, CacheConfig, CameraIdentity, CancellationToken, CfaPattern, DemosaicAlgorithm,
    ImageIdentity, IntermediateCache, PipelineConfig, PipelineJob, PipelineOutcome, ProgressCallback,
    RawDecoder, RawFrame, RawPipeline, RawSource, Result, Stage,
};

/// Decoder returning a synthetic gradient frame regardless of input.
struct GradientDecoder {
    width: usize,
    height: usize,
}

impl RawDecoder for GradientDecoder {
    fn decode(&self, _data: &[u8]) -> Result<RawFrame> {
        let (width, height) = (self.width, self.height);
        let data = (0..width * height)
            .map(|i| (300 + 7 * (i / width) + 11 * (i % width)) as u16)
            .collect();
        Ok(RawFrame {
            raw_width: width,
            raw_height: height,
            top_margin: 0,
            left_margin: 0,
            width,
            height,
            data,
            cfa: CfaPattern::rggb(),
            colors: 3,
            black: BlackLevels::uniform([64; 4]),
            cam_to_xyz: ColorMatrix::srgb_to_xyz(),
            wb_multipliers: [2.0, 1.0, 1.5, 1.0],
            white_samples: None,
            maximum: 4095,
            quarter_turns: 0,
            camera: CameraIdentity::default(),
        })
    }
}

struct Invert;

impl FilterGraph for Invert {
    fn apply(&self, mut image: RgbaBufferF32) -> Result<RgbaBufferF32> {
        for px in image.pixels_mut() {
            for v in &mut px[..3] {
                *v = 1.0 - *v;
            }
        }
        Ok(image)
    }
}

fn pipeline(algorithm: DemosaicAlgorithm) -> RawPipeline<GradientDecoder> {
    let config = PipelineConfig::builder()
        .algorithm(algorithm)
        .workers(Some(2))
        .build();
    RawPipeline::with_custom(GradientDecoder { width: 48, height: 32 }, config).unwrap()
}

fn job(identity: &str) -> PipelineJob {
    PipelineJob::new(identity, RawSource::Bytes(Arc::from(&[0u8; 16][..])))
}

fn open_cache(dir: &tempfile::TempDir) -> Arc<IntermediateCache> {
    Arc::new(IntermediateCache::open(CacheConfig::builder().root(dir.path()).build()).unwrap())
}

fn recording() -> (Arc<Mutex<Vec<Stage>>>, ProgressCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, Box::new(move |stage| sink.lock().unwrap().push(stage)))
}

#[test]
fn every_algorithm_develops_with_ordered_progress() {
    for algorithm in [
        DemosaicAlgorithm::Ahd,
        DemosaicAlgorithm::Lmmse,
        DemosaicAlgorithm::Linear,
    ] {
        let (seen, progress) = recording();
        let image = pipeline(algorithm)
            .process(&job("gradient"), CancellationToken::new(), Some(progress))
            .into_result()
            .unwrap();

        assert_eq!((image.image.width(), image.image.height()), (48, 32));
        assert!(
            image
                .image
                .pixels()
                .iter()
                .all(|px| px[3] == 1.0 && px[..3].iter().all(|v| (0.0..=1.0).contains(v)))
        );

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{algorithm:?}: {seen:?}");
        assert_eq!(seen.first(), Some(&Stage::Initializing));
        assert_eq!(seen.last(), Some(&Stage::FinalHistogram));
    }
}

#[test]
fn checkpoint_survives_reopen_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let identity = ImageIdentity::new("DSC_0001.NEF");

    let first = {
        let cache = open_cache(&dir);
        let pipeline = pipeline(DemosaicAlgorithm::Ahd).with_cache(Arc::clone(&cache));
        let image = pipeline
            .process(&job(identity.as_str()), CancellationToken::new(), None)
            .into_result()
            .unwrap();
        let stored: Arc<StageResult> = cache.cached_data(&identity).unwrap().unwrap();
        assert_eq!(stored.stage, Stage::ColorConvert);
        assert_eq!((stored.width, stored.height), (48, 32));
        image
    };

    let cache = open_cache(&dir);
    assert!(cache.has_data(&identity));
    assert!(!cache.is_resident(&identity));
    let pipeline = pipeline(DemosaicAlgorithm::Ahd).with_cache(Arc::clone(&cache));
    let resumed = pipeline
        .process(&job(identity.as_str()), CancellationToken::new(), None)
        .into_result()
        .unwrap();

    assert!(resumed.from_cache);
    assert_eq!(resumed.image, first.image);
    assert_eq!(resumed.histogram, first.histogram);
}

#[test]
fn late_adjustments_reuse_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(DemosaicAlgorithm::Lmmse).with_cache(open_cache(&dir));

    let plain = pipeline
        .process(&job("adj"), CancellationToken::new(), None)
        .into_result()
        .unwrap();
    let stretched = pipeline
        .process(
            &job("adj").adjustments(Adjustments {
                contrast: Some((0.0, 0.5)),
                ..Adjustments::default()
            }),
            CancellationToken::new(),
            None,
        )
        .into_result()
        .unwrap();

    assert!(stretched.from_cache);
    assert_ne!(stretched.image, plain.image);
}

#[test]
fn evicted_identity_is_recomputed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    let pipeline = pipeline(DemosaicAlgorithm::Linear).with_cache(Arc::clone(&cache));
    let identity = ImageIdentity::new("evict-me");

    pipeline.process(&job("evict-me"), CancellationToken::new(), None);
    assert!(cache.has_data(&identity));

    cache.evict_data(&identity).unwrap();
    assert!(!cache.has_data(&identity));
    assert!(cache.cached_data(&identity).unwrap().is_none());

    let again = pipeline
        .process(&job("evict-me"), CancellationToken::new(), None)
        .into_result()
        .unwrap();
    assert!(!again.from_cache);
}

#[test]
fn cancelled_run_reports_cancellation_and_caches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    let pipeline = pipeline(DemosaicAlgorithm::Ahd).with_cache(Arc::clone(&cache));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (seen, progress) = recording();
    let outcome = pipeline.process(&job("cancelled"), cancel, Some(progress));

    assert!(matches!(outcome, PipelineOutcome::Cancelled));
    assert!(seen.lock().unwrap().is_empty());
    assert!(!cache.has_data(&ImageIdentity::new("cancelled")));
}

#[test]
fn filter_graph_sees_final_image() {
    let plain = pipeline(DemosaicAlgorithm::Linear)
        .process(&job("fg"), CancellationToken::new(), None)
        .into_result()
        .unwrap();
    let inverted = pipeline(DemosaicAlgorithm::Linear)
        .with_filter_graph(Arc::new(Invert))
        .process(&job("fg"), CancellationToken::new(), None)
        .into_result()
        .unwrap();

    for (a, b) in plain.image.pixels().iter().zip(inverted.image.pixels()) {
        assert!((a[0] + b[0] - 1.0).abs() < 1e-6);
        assert_eq!(b[3], 1.0);
    }
}

#[test]
fn queued_jobs_each_complete_once() {
    let pipeline = pipeline(DemosaicAlgorithm::Linear);
    let (tx, rx) = mpsc::channel();
    for i in 0..4 {
        let tx = tx.clone();
        pipeline.queue(
            job(&format!("queued-{i}")),
            None,
            Box::new(move |outcome| {
                tx.send((i, outcome.is_completed())).unwrap();
            }),
        );
    }
    drop(tx);

    let mut done: Vec<_> = rx.iter().take(4).collect();
    done.sort();
    assert_eq!(done, vec![(0, true), (1, true), (2, true), (3, true)]);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}
