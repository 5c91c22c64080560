use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, bail};
use raw_develop::image_pipeline::{
    DemosaicAlgorithm, OutputConfig, PipelineConfig, RawPipeline, StandardTiffWriter,
    TiffCompression, TiffWriter,
};
use raw_develop::logger;

use tracing::info;

const USAGE: &str = "usage: raw_develop <input.raw> <output.tiff> [--algorithm ahd|lmmse|linear]";

struct Args {
    input: String,
    output: String,
    algorithm: DemosaicAlgorithm,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut algorithm = DemosaicAlgorithm::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--algorithm" => {
                let name = args.next().context(USAGE)?;
                algorithm = name.parse()?;
            }
            "-h" | "--help" => bail!(USAGE),
            _ => positional.push(arg),
        }
    }
    let [input, output]: [String; 2] = positional.try_into().map_err(|_| anyhow::anyhow!(USAGE))?;
    Ok(Args {
        input,
        output,
        algorithm,
    })
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let args = parse_args()?;
    info!("Starting raw_develop...");

    let config = PipelineConfig::builder().algorithm(args.algorithm).build();
    let pipeline = RawPipeline::new(config)?;
    info!("Demosaic algorithm: {:?}", pipeline.config().algorithm);

    let developed = pipeline
        .process_file(&args.input)
        .with_context(|| format!("developing {}", args.input))?;

    let output_config = OutputConfig::builder()
        .compression(TiffCompression::DeflateBalanced)
        .predictor(Some(2))
        .build();
    let file = File::create(&args.output).with_context(|| format!("creating {}", args.output))?;
    let mut writer = BufWriter::new(file);
    StandardTiffWriter.write_rgba(&developed.image, &mut writer, &output_config)?;

    info!(
        "Wrote {}x{} image to {} in {:?}",
        developed.image.width(),
        developed.image.height(),
        args.output,
        developed.timings.total_duration()
    );
    Ok(())
}
