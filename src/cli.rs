use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// Report the time ranges in which something moves inside a region of a fixed-camera video.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Video file to analyze.
    pub video: PathBuf,
    /// TOML config file (defaults to ./roiwatch.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Region vertices as "x,y x,y x,y"; skips the interactive selector.
    #[arg(long)]
    pub roi: Option<String>,
    /// Frame size the region vertices refer to, as WIDTHxHEIGHT.
    #[arg(long)]
    pub roi_size: Option<String>,
    /// Motion ratio above which a sample counts as motion.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Seconds of video between scored samples.
    #[arg(long)]
    pub stride_secs: Option<f64>,
    /// Where to write the result of a complete run.
    #[arg(long)]
    pub output: Option<String>,
    /// Where to write results when the run is interrupted.
    #[arg(long)]
    pub partial_output: Option<String>,
    /// Also write a JSON copy of the results.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Overlays command line values on `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.analysis.threshold = threshold;
        }
        if let Some(stride_secs) = self.stride_secs {
            config.analysis.stride_secs = stride_secs;
        }
        if let Some(output) = &self.output {
            config.output.events_path = output.clone();
        }
        if let Some(partial) = &self.partial_output {
            config.output.partial_path = partial.clone();
        }
        if self.json {
            config.output.json = true;
        }
    }
}
