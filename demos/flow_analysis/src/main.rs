use argh::FromArgs;
use std::path::PathBuf;

use kornia_egomotion::{FitOutcome, FlowFieldAnalyzer, FlowFieldConfig, FlowVector, ImageSize};

#[derive(FromArgs)]
/// Estimate egomotion from recorded optical flow frames
struct Args {
    /// path to a json file with an array of frames, each an array of flow vectors
    #[argh(option)]
    input: PathBuf,

    /// image width in pixels
    #[argh(option, default = "320")]
    width: usize,

    /// image height in pixels
    #[argh(option, default = "240")]
    height: usize,

    /// optional path to a json flow field configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// heading-rate proxy used for the slope estimation
    #[argh(option, default = "0.0")]
    heading_rate: f64,

    /// pitch-rate proxy used for the slope estimation
    #[argh(option, default = "0.0")]
    pitch_rate: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str::<FlowFieldConfig>(&std::fs::read_to_string(path)?)?,
        None => FlowFieldConfig::default(),
    };
    log::info!("Using configuration: {:?}", config);

    let frames: Vec<Vec<FlowVector>> =
        serde_json::from_str(&std::fs::read_to_string(&args.input)?)?;
    log::info!("Loaded {} frames from {:?}", frames.len(), args.input);

    let image_size = ImageSize {
        width: args.width,
        height: args.height,
    };
    let mut analyzer = FlowFieldAnalyzer::new(config)?;

    let mut num_fits = 0;
    for (i, vectors) in frames.iter().enumerate() {
        let outcome =
            analyzer.process(vectors, image_size, [args.heading_rate, args.pitch_rate])?;
        if let FitOutcome::Fit(estimate) = &outcome {
            num_fits += 1;
            log::debug!(
                "frame {}: divergence {:.4}, inliers {}/{} of {}",
                i,
                estimate.divergence,
                estimate.fit.n_inliers_u,
                estimate.fit.n_inliers_v,
                vectors.len()
            );
        }
        println!("{}", serde_json::to_string(&outcome)?);
    }

    log::info!("Fitted {} of {} frames", num_fits, frames.len());

    Ok(())
}
