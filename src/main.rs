use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use opencv::core::{Point, Size};
use tracing_subscriber::EnvFilter;

mod analytics;
mod cli;
mod config;
mod roi;
mod storage;

use analytics::{
    spawn_analyzer, AnalysisError, FrameSource, MotionAnalyzer, SourceError, VideoFileSource,
};
use cli::Args;
use config::Config;
use roi::{Polygon, Roi, RoiError};
use storage::{format_timestamp, ReportWriter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roiwatch=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let analysis_size = config
        .analysis
        .analysis_size()
        .map(|(w, h)| Size::new(w, h));
    let source = VideoFileSource::open(&args.video, analysis_size).map_err(AnalysisError::from)?;

    let roi = acquire_roi(&args, &config, source.native_size())?;
    tracing::info!(
        points = roi.polygon().points().len(),
        reference_width = roi.reference().width,
        reference_height = roi.reference().height,
        "region of interest ready"
    );

    let analyzer = MotionAnalyzer::new(roi, &config.analysis)?;
    let writer = ReportWriter::new(&config.output);
    let shutdown = Arc::new(AtomicBool::new(false));

    tracing::info!("analyzing video, press Ctrl+C to stop and keep partial results");
    let mut handle = spawn_analyzer(analyzer, source, Arc::clone(&shutdown));

    let joined = tokio::select! {
        result = &mut handle => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping analysis");
            shutdown.store(true, Ordering::Relaxed);
            handle.await
        }
    };
    let outcome = joined??;

    let path = writer.write_outcome(&outcome)?;
    tracing::info!(
        path = %path.display(),
        events = outcome.events.len(),
        samples = outcome.samples,
        failures = outcome.failures,
        analyzed = %format_timestamp(outcome.last_timestamp),
        "{}",
        if outcome.cancelled {
            "analysis interrupted, partial results saved"
        } else {
            "analysis complete"
        }
    );

    Ok(())
}

fn acquire_roi(args: &Args, config: &Config, native_size: Size) -> Result<Roi, AnalysisError> {
    let points = region_points(args, config)?;
    if points.is_empty() {
        return select_interactively(args, config);
    }

    let reference = reference_size(args, config, native_size)?;
    Ok(Roi::new(Polygon::new(points), reference)?)
}

fn region_points(args: &Args, config: &Config) -> Result<Vec<Point>, RoiError> {
    match &args.roi {
        Some(arg) => roi::parse_points(arg),
        None => Ok(config
            .roi
            .points
            .iter()
            .map(|[x, y]| Point::new(*x, *y))
            .collect()),
    }
}

// Headless points are authored against the video as it is stored, not the analysis resolution.
fn reference_size(args: &Args, config: &Config, native_size: Size) -> Result<Size, RoiError> {
    match &args.roi_size {
        Some(size) => roi::parse_size(size),
        None => Ok(config
            .roi
            .reference_size()
            .map(|(w, h)| Size::new(w, h))
            .unwrap_or(native_size)),
    }
}

fn select_interactively(args: &Args, config: &Config) -> Result<Roi, AnalysisError> {
    let mut preview = VideoFileSource::open(&args.video, None)?;
    let frame = preview.next_frame()?.ok_or(SourceError::NoFrames)?;
    let size = Size::new(config.roi.selector_width, config.roi.selector_height);

    tracing::info!("select the area to watch in the video window");
    Ok(roi::select_roi(&frame, size)?)
}
