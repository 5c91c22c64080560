use std::path::Path;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, info_span, instrument, warn};

use crate::image_pipeline::cache::{ImageIdentity, IntermediateCache, StageResult};
use crate::image_pipeline::color::{
    CurveDirection, FULL_RANGE_WHITE, GammaCurve, Histogram, WhiteBalance, camera_to_working,
    convert_to_rgb, normalize_black,
};
use crate::image_pipeline::common::{CancellationToken, PipelineError, Result, RgbaBufferF32};
use crate::image_pipeline::conversions::types::{
    Adjustments, CompletionCallback, FinalImage, JobHandle, PipelineConfig, PipelineJob,
    PipelineOutcome, RawSource,
};
use crate::image_pipeline::debayer::{BayerExtractor, Extracted, merge_green_lattices};
use crate::image_pipeline::demosaic::{InterpolateOptions, interpolate};
use crate::image_pipeline::filter_graph::{FilterGraph, PassThrough, run_filter_graph};
use crate::image_pipeline::lens::{
    LensDatabase, NoLensDatabase, correct_distortion, correct_vignetting,
};
use crate::image_pipeline::pixel_format::{PixelFormatConverter, convolve3x3, morphology};
use crate::image_pipeline::raw::{RawDecoder, RawLoaderDecoder};
use crate::image_pipeline::state::{CACHE_CHECKPOINT, PipelineState, ProgressCallback, Stage};

/// Collaborators and settings one run needs; cheap to clone into a worker.
struct RunContext<D> {
    decoder: Arc<D>,
    lens_db: Arc<dyn LensDatabase>,
    filter_graph: Arc<dyn FilterGraph>,
    cache: Option<Arc<IntermediateCache>>,
    config: Arc<PipelineConfig>,
}

impl<D> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            decoder: Arc::clone(&self.decoder),
            lens_db: Arc::clone(&self.lens_db),
            filter_graph: Arc::clone(&self.filter_graph),
            cache: self.cache.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// RAW to RGBA pipeline.
///
/// [`queue`](Self::queue) runs jobs on a worker pool sized to the CPU count
/// and reports through callbacks; [`process`](Self::process) runs one job on
/// the calling thread.
pub struct RawPipeline<D: RawDecoder + 'static> {
    context: RunContext<D>,
    pool: ThreadPool,
}

impl RawPipeline<RawLoaderDecoder> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_custom(RawLoaderDecoder, config)
    }
}

impl<D: RawDecoder + 'static> RawPipeline<D> {
    pub fn with_custom(decoder: D, config: PipelineConfig) -> Result<Self> {
        let workers = config
            .workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("raw-pipeline-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPoolError(e.to_string()))?;
        info!("RAW pipeline ready with {} worker(s)", workers);

        Ok(Self {
            context: RunContext {
                decoder: Arc::new(decoder),
                lens_db: Arc::new(NoLensDatabase),
                filter_graph: Arc::new(PassThrough),
                cache: None,
                config: Arc::new(config),
            },
            pool,
        })
    }

    pub fn with_cache(mut self, cache: Arc<IntermediateCache>) -> Self {
        self.context.cache = Some(cache);
        self
    }

    pub fn with_lens_database(mut self, lens_db: Arc<dyn LensDatabase>) -> Self {
        self.context.lens_db = lens_db;
        self
    }

    pub fn with_filter_graph(mut self, filter_graph: Arc<dyn FilterGraph>) -> Self {
        self.context.filter_graph = filter_graph;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }

    pub fn cache(&self) -> Option<&Arc<IntermediateCache>> {
        self.context.cache.as_ref()
    }

    /// Starts `job` on the worker pool. `completion` receives exactly one
    /// outcome; `progress` sees every stage the run enters.
    pub fn queue(
        &self,
        job: PipelineJob,
        progress: Option<ProgressCallback>,
        completion: CompletionCallback,
    ) -> JobHandle {
        let cancel = CancellationToken::new();
        let handle = JobHandle {
            cancel: cancel.clone(),
        };
        let context = self.context.clone();
        debug!("Queueing {}", job.identity);
        self.pool.spawn(move || {
            let outcome = context.run(&job, cancel, progress);
            completion(outcome);
        });
        handle
    }

    /// Runs `job` on the calling thread.
    pub fn process(
        &self,
        job: &PipelineJob,
        cancel: CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> PipelineOutcome {
        self.context.run(job, cancel, progress)
    }

    /// Develops the RAW file at `input_path` without caching.
    #[instrument(skip(self, input_path))]
    pub fn process_file<P: AsRef<Path>>(&self, input_path: P) -> Result<FinalImage> {
        let input_path = input_path.as_ref();
        info!(input = %input_path.display(), "Developing file");
        let job = PipelineJob::new(
            ImageIdentity::new(input_path.display().to_string()),
            RawSource::File(input_path.to_path_buf()),
        )
        .use_cache(false);
        self.process(&job, CancellationToken::new(), None).into_result()
    }
}

impl<D: RawDecoder> RunContext<D> {
    fn run(
        &self,
        job: &PipelineJob,
        cancel: CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> PipelineOutcome {
        let use_cache = job.use_cache && self.cache.is_some();
        let mut state = PipelineState::new(cancel, progress, use_cache);
        let _span = info_span!("pipeline_run", identity = %job.identity).entered();

        match self.execute(job, &mut state) {
            Ok(mut image) => {
                image.timings = state.finish();
                image.timings.log_summary();
                info!(
                    width = image.image.width(),
                    height = image.image.height(),
                    from_cache = image.from_cache,
                    "Run complete"
                );
                PipelineOutcome::Completed(image)
            }
            Err(PipelineError::Cancelled) => {
                info!("Run cancelled");
                PipelineOutcome::Cancelled
            }
            Err(e) => {
                error!("Run failed: {}", e);
                PipelineOutcome::Failed(e)
            }
        }
    }

    fn execute(&self, job: &PipelineJob, state: &mut PipelineState) -> Result<FinalImage> {
        state.advance(Stage::Initializing)?;

        let resumed = if state.uses_cache() {
            self.load_checkpoint(&job.identity)?
        } else {
            None
        };
        let from_cache = resumed.is_some();

        let mut checkpoint = None;
        let (converter, quarter_turns) = match resumed {
            Some(pair) => pair,
            None => {
                let (converter, quarter_turns) = self.develop(&job.source, state)?;
                if state.should_cache(CACHE_CHECKPOINT) {
                    checkpoint = Self::checkpoint_of(&converter, quarter_turns);
                }
                (converter, quarter_turns)
            }
        };

        let (image, histogram) = self.finish(converter, quarter_turns, &job.adjustments, state)?;
        // Only completed runs reach the cache.
        if let Some(result) = checkpoint {
            self.store_checkpoint(&job.identity, result);
        }
        Ok(FinalImage {
            image,
            histogram,
            from_cache,
            timings: Default::default(),
        })
    }

    fn validate_dimensions(&self, width: usize, height: usize) -> Result<()> {
        if !self.config.validate_dimensions {
            return Ok(());
        }

        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions(width, height));
        }

        if let Some(max) = self.config.max_dimension {
            if width > max || height > max {
                warn!(
                    "Image dimensions {}x{} exceed maximum {}",
                    width, height, max
                );
                return Err(PipelineError::InvalidDimensions(width, height));
            }
        }

        Ok(())
    }

    /// Runs every stage up to the cache checkpoint.
    fn develop(&self, source: &RawSource, state: &mut PipelineState) -> Result<(PixelFormatConverter, u8)> {
        let data = {
            let _span = info_span!("read_input").entered();
            source.load()?
        };

        state.advance(Stage::Debayer)?;
        let frame = {
            let _span = info_span!("decode_raw", input_size = data.len()).entered();
            self.decoder.decode(&data)?
        };
        drop(data);
        frame.validate()?;
        {
            let _span = info_span!("validate_dimensions", width = frame.width, height = frame.height)
                .entered();
            self.validate_dimensions(frame.width, frame.height)?;
        }
        info!(
            make = %frame.camera.make,
            model = %frame.camera.model,
            width = frame.width,
            height = frame.height,
            "Decoded frame"
        );

        let black = normalize_black(&frame.black, &frame.cfa);
        let Extracted { mut buffer, max } = BayerExtractor::extract(&frame, &black)?;
        debug!("Black {} {:?}, extracted maximum {}", black.black, black.per_channel, max);

        state.advance(Stage::Demosaic)?;
        state.advance(Stage::WhiteBalance)?;
        let balance = WhiteBalance::compute(&frame, &black)?;
        debug!("White balance from {:?}: {:?}", balance.source, balance.pre_mul);
        balance.apply(&mut buffer);

        state.advance(Stage::Interpolate)?;
        let cfa = merge_green_lattices(&mut buffer, &frame.cfa);
        let options = InterpolateOptions {
            algorithm: self.config.algorithm,
            four_color: self.config.four_color,
            median_passes: self.config.median_passes,
        };
        let mut buffer = interpolate(buffer, &cfa, &frame.cam_to_xyz, &options, state.cancel_token())?;

        state.advance(Stage::LensCorrection)?;
        match self.lens_db.lookup(&frame.camera).filter(|p| !p.is_empty()) {
            Some(profile) => {
                if !profile.vignetting.is_empty() {
                    state.advance(Stage::Vignetting)?;
                    correct_vignetting(&mut buffer, &profile.vignetting);
                }
                if let Some(model) = profile.distortion.filter(|d| !d.is_identity()) {
                    state.advance(Stage::Distortion)?;
                    correct_distortion(&mut buffer, &model)?;
                }
            }
            None => debug!(
                "No lens profile for {} {} / {:?}, skipping correction",
                frame.camera.make, frame.camera.model, frame.camera.lens
            ),
        }

        state.advance(Stage::ColorConvert)?;
        let matrix = camera_to_working(&frame.cam_to_xyz, self.config.working_space);
        let (mut rgb, histogram) = convert_to_rgb(&buffer, &matrix)?;
        drop(buffer);
        let white = if self.config.adaptive_white {
            histogram.white_point(rgb.len())
        } else {
            FULL_RANGE_WHITE
        };
        debug!("Tone curve {:?}, white point {}", self.config.tone_curve, white);
        let curve = GammaCurve::build(self.config.tone_curve.params(), CurveDirection::Forward, white)?;
        curve.apply(&mut rgb);

        let mut converter = PixelFormatConverter::new(rgb);
        converter.rgb16_to_float(u16::MAX)?;
        converter.to_planar()?;
        Ok((converter, frame.quarter_turns))
    }

    /// Runs the stages after the checkpoint.
    fn finish(
        &self,
        mut converter: PixelFormatConverter,
        quarter_turns: u8,
        adjustments: &Adjustments,
        state: &mut PipelineState,
    ) -> Result<(RgbaBufferF32, Histogram)> {
        state.advance(Stage::RotateFlip)?;
        let turns = (quarter_turns % 4 + adjustments.rotation % 4) % 4;
        if turns != 0 {
            converter.rotate90(turns)?;
        }

        state.advance(Stage::Convolution)?;
        if let Some(kernel) = &adjustments.convolution {
            let convolved = convolve3x3(converter.planar()?, kernel)?;
            *converter.planar_mut()? = convolved;
        }

        state.advance(Stage::Morphological)?;
        if let Some((op, radius)) = adjustments.morphology {
            morphology(converter.planar_mut()?, op, radius)?;
        }

        state.advance(Stage::HistogramModification)?;
        if let Some((min, max)) = adjustments.contrast {
            converter.contrast_stretch(min, max)?;
        }

        state.advance(Stage::FormatConvert)?;
        converter.planar_to_rgbx()?;
        let image = converter.into_rgbx()?;

        state.advance(Stage::FilterGraph)?;
        let image = run_filter_graph(self.filter_graph.as_ref(), image)?;

        state.advance(Stage::FinalHistogram)?;
        let histogram = Histogram::of_rgba(&image);
        Ok((image, histogram))
    }

    /// Checkpoint of `identity`, if cached. Cache failures are logged and
    /// treated as a miss.
    fn load_checkpoint(&self, identity: &ImageIdentity) -> Result<Option<(PixelFormatConverter, u8)>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let result = match cache.cached_data(identity) {
            Ok(Some(result)) => result,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Cache read for {} failed, recomputing: {}", identity, e);
                return Ok(None);
            }
        };
        if result.stage != CACHE_CHECKPOINT {
            warn!("Cached {} stage for {} is not resumable", result.stage, identity);
            return Ok(None);
        }
        info!("Resuming {} from cached {} stage", identity, result.stage);
        let planar = result.to_planar()?;
        Ok(Some((PixelFormatConverter::from_planar(planar), result.quarter_turns)))
    }

    fn checkpoint_of(converter: &PixelFormatConverter, quarter_turns: u8) -> Option<StageResult> {
        match converter.planar() {
            Ok(planar) => Some(StageResult::from_planar(CACHE_CHECKPOINT, planar, quarter_turns)),
            Err(e) => {
                warn!("No planar buffer to cache: {}", e);
                None
            }
        }
    }

    fn store_checkpoint(&self, identity: &ImageIdentity, result: StageResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.set_data(identity, result) {
            warn!("Cache write for {} failed: {}", identity, e);
        }
    }
}
