use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opencv::core::Mat;
use opencv::prelude::*;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::roi::{MaskCache, Roi, RoiError};
use crate::storage::format_timestamp;

use super::decoder::{FrameSource, SourceError};
use super::events::{EventAggregator, EventState, MotionEvent, Transition};
use super::motion::{FrameDiffer, MotionScore, ScoreError};

const PROGRESS_EVERY_SAMPLES: u64 = 100;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error("invalid region of interest: {0}")]
    InvalidRoi(#[from] RoiError),
    #[error("failed to set up motion scoring: {0}")]
    Setup(opencv::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub events: Vec<MotionEvent>,
    pub cancelled: bool,
    pub samples: u64,
    pub failures: u64,
    pub last_timestamp: f64,
}

pub fn stride_frames(fps: f64, stride_secs: f64) -> u64 {
    ((fps * stride_secs).floor() as u64).max(1)
}

pub struct MotionAnalyzer {
    differ: FrameDiffer,
    masks: MaskCache,
    stride_secs: f64,
}

impl MotionAnalyzer {
    pub fn new(roi: Roi, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            differ: FrameDiffer::new(config).map_err(AnalysisError::Setup)?,
            masks: MaskCache::new(roi),
            stride_secs: config.stride_secs,
        })
    }

    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        shutdown: &AtomicBool,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let fps = source.frame_rate();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SourceError::InvalidFrameRate(fps).into());
        }
        let stride = stride_frames(fps, self.stride_secs);

        tracing::info!(
            fps = format!("{:.2}", fps),
            stride_frames = stride,
            frames = ?source.frame_count(),
            "motion analysis started"
        );

        let mut aggregator = EventAggregator::new();
        let mut prev: Option<Mat> = None;
        let mut cancelled = false;
        let mut samples = 0u64;
        let mut failures = 0u64;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if prev.is_none() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        position = source.position(),
                        error = %e,
                        "decode failed, treating as end of stream"
                    );
                    break;
                }
            };

            let Some(previous) = prev.take() else {
                prev = Some(frame);
                continue;
            };

            let position = source.position();
            if position % stride == 0 {
                let timestamp = position as f64 / fps;
                samples += 1;

                let motion = match self.score_sample(&previous, &frame) {
                    Ok(score) => {
                        let motion = self.differ.is_motion(&score);
                        tracing::debug!(
                            position,
                            ratio = format!("{:.5}", score.ratio),
                            changed = score.changed_pixels,
                            roi = score.roi_pixels,
                            motion,
                            "sample scored"
                        );
                        motion
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(position, error = %e, "failed to score sample");
                        false
                    }
                };

                match aggregator.observe(timestamp, motion) {
                    Transition::Opened => {
                        tracing::info!(at = %format_timestamp(timestamp), "motion started");
                    }
                    Transition::Closed(event) => {
                        tracing::info!(
                            start = %format_timestamp(event.start),
                            end = %format_timestamp(event.end),
                            "motion ended"
                        );
                    }
                    Transition::Unchanged => {}
                }

                if samples % PROGRESS_EVERY_SAMPLES == 0 {
                    tracing::info!(
                        position,
                        frames = ?source.frame_count(),
                        events = aggregator.event_count(),
                        "analysis progress"
                    );
                }
            }

            prev = Some(frame);
        }

        if prev.is_none() && !cancelled {
            return Err(SourceError::NoFrames.into());
        }

        let last_timestamp = source.position() as f64 / fps;
        if let EventState::InEvent { start } = aggregator.state() {
            tracing::info!(
                start = %format_timestamp(start),
                end = %format_timestamp(last_timestamp),
                "closing motion still in progress"
            );
        }
        let events = aggregator.finish(last_timestamp);

        tracing::info!(
            events = events.len(),
            samples,
            failures,
            cancelled,
            "motion analysis finished"
        );

        Ok(AnalysisOutcome {
            events,
            cancelled,
            samples,
            failures,
            last_timestamp,
        })
    }

    fn score_sample(&mut self, prev: &Mat, curr: &Mat) -> Result<MotionScore, ScoreError> {
        let mask = self.masks.mask_for(curr.size()?)?;
        self.differ.score(prev, curr, mask)
    }
}

pub fn spawn_analyzer<S>(
    mut analyzer: MotionAnalyzer,
    mut source: S,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Result<AnalysisOutcome, AnalysisError>>
where
    S: FrameSource + Send + 'static,
{
    tokio::task::spawn_blocking(move || analyzer.run(&mut source, &shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Point, Rect, Scalar, Size};
    use opencv::imgproc;

    use crate::roi::Polygon;

    const WIDTH: i32 = 160;
    const HEIGHT: i32 = 120;

    // In-memory source; `changed(i)` decides whether frame `i` shows the moving block.
    struct SyntheticSource {
        fps: f64,
        total: u64,
        position: u64,
        changed: Box<dyn Fn(u64) -> bool + Send>,
        cancel_at: Option<(u64, Arc<AtomicBool>)>,
        fail_at: Option<u64>,
        shrink_odd: bool,
    }

    impl SyntheticSource {
        fn new(fps: f64, total: u64, changed: impl Fn(u64) -> bool + Send + 'static) -> Self {
            Self {
                fps,
                total,
                position: 0,
                changed: Box::new(changed),
                cancel_at: None,
                fail_at: None,
                shrink_odd: false,
            }
        }
    }

    impl FrameSource for SyntheticSource {
        fn next_frame(&mut self) -> Result<Option<Mat>, SourceError> {
            if self.position >= self.total {
                return Ok(None);
            }
            let index = self.position;
            if self.fail_at == Some(index) {
                return Err(SourceError::NoFrames);
            }
            self.position += 1;

            if let Some((at, flag)) = &self.cancel_at {
                if self.position >= *at {
                    flag.store(true, Ordering::Relaxed);
                }
            }

            let (width, height) = if self.shrink_odd && index % 2 == 1 {
                (WIDTH / 2, HEIGHT / 2)
            } else {
                (WIDTH, HEIGHT)
            };
            let mut frame =
                Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, Scalar::all(30.0))?;
            if (self.changed)(index) {
                imgproc::rectangle(
                    &mut frame,
                    Rect::new(40, 30, 60, 50),
                    Scalar::all(230.0),
                    -1,
                    imgproc::LINE_8,
                    0,
                )?;
            }
            Ok(Some(frame))
        }

        fn frame_rate(&self) -> f64 {
            self.fps
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn frame_count(&self) -> Option<u64> {
            Some(self.total)
        }

        fn frame_size(&self) -> Size {
            Size::new(WIDTH, HEIGHT)
        }
    }

    fn analyzer() -> MotionAnalyzer {
        let polygon = Polygon::new(vec![
            Point::new(20, 20),
            Point::new(140, 20),
            Point::new(140, 100),
            Point::new(20, 100),
        ]);
        let roi = Roi::new(polygon, Size::new(WIDTH, HEIGHT)).unwrap();
        MotionAnalyzer::new(roi, &AnalysisConfig::default()).unwrap()
    }

    fn run(source: &mut SyntheticSource) -> AnalysisOutcome {
        analyzer().run(source, &AtomicBool::new(false)).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_stride_frames() {
        assert_eq!(stride_frames(30.0, 5.0), 150);
        assert_eq!(stride_frames(29.97, 5.0), 149);
        assert_eq!(stride_frames(25.0, 2.0), 50);
        assert_eq!(stride_frames(0.1, 5.0), 1);
    }

    #[test]
    fn test_analyzer_accepts_configured_kernel() {
        let roi = Roi::new(
            Polygon::new(vec![Point::new(0, 0), Point::new(50, 0), Point::new(50, 50)]),
            Size::new(WIDTH, HEIGHT),
        )
        .unwrap();
        let config = AnalysisConfig {
            kernel_size: 3,
            ..AnalysisConfig::default()
        };
        let mut analyzer = MotionAnalyzer::new(roi, &config).unwrap();

        let mut source = SyntheticSource::new(1.0, 10, |i| i == 4);
        let outcome = analyzer.run(&mut source, &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.samples, 2);
        assert_eq!(
            outcome.events,
            vec![MotionEvent {
                start: 5.0,
                end: 10.0
            }]
        );
    }

    #[test]
    fn test_change_between_samples_is_missed() {
        // 5s clip at 30fps; the only sample lands on a static frame pair.
        let mut source = SyntheticSource::new(30.0, 150, |i| (60..90).contains(&i));
        let outcome = run(&mut source);

        assert_eq!(outcome.samples, 1);
        assert!(outcome.events.is_empty());
        assert!(!outcome.cancelled);
        assert_close(outcome.last_timestamp, 5.0);
    }

    #[test]
    fn test_motion_on_sample_opens_and_closes_event() {
        // 1 fps with a 5 frame stride: samples at positions 5, 10, 15, 20.
        // Frames flicker during [8, 12) so only the sample at position 10 sees change.
        let mut source = SyntheticSource::new(1.0, 20, |i| (8..12).contains(&i) && i % 2 == 1);
        let outcome = run(&mut source);

        assert_eq!(outcome.samples, 4);
        assert_eq!(
            outcome.events,
            vec![MotionEvent {
                start: 10.0,
                end: 15.0
            }]
        );
    }

    #[test]
    fn test_open_event_is_flushed_at_end_of_stream() {
        let mut source = SyntheticSource::new(10.0, 125, |i| i % 2 == 1);
        let outcome = run(&mut source);

        assert_eq!(outcome.events.len(), 1);
        assert_close(outcome.events[0].start, 5.0);
        assert_close(outcome.events[0].end, 12.5);
    }

    #[test]
    fn test_cancellation_keeps_partial_event() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut source = SyntheticSource::new(10.0, 1000, |i| i % 2 == 1);
        source.cancel_at = Some((123, Arc::clone(&shutdown)));

        let outcome = analyzer().run(&mut source, &shutdown).unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.events.len(), 1);
        assert_close(outcome.events[0].start, 5.0);
        assert_close(outcome.events[0].end, 12.3);
        assert_close(outcome.last_timestamp, 12.3);
    }

    #[test]
    fn test_cancelled_before_start_returns_empty() {
        let mut source = SyntheticSource::new(30.0, 300, |_| false);
        let outcome = analyzer()
            .run(&mut source, &AtomicBool::new(true))
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.events.is_empty());
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let pattern = |i: u64| (i / 40) % 3 == 1 && i % 2 == 0;
        let first = run(&mut SyntheticSource::new(10.0, 600, pattern));
        let second = run(&mut SyntheticSource::new(10.0, 600, pattern));

        assert!(!first.events.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_source_is_unavailable() {
        let mut source = SyntheticSource::new(30.0, 0, |_| false);
        let result = analyzer().run(&mut source, &AtomicBool::new(false));
        assert!(matches!(
            result,
            Err(AnalysisError::SourceUnavailable(SourceError::NoFrames))
        ));
    }

    #[test]
    fn test_invalid_frame_rate_is_unavailable() {
        let mut source = SyntheticSource::new(0.0, 10, |_| false);
        let result = analyzer().run(&mut source, &AtomicBool::new(false));
        assert!(matches!(
            result,
            Err(AnalysisError::SourceUnavailable(SourceError::InvalidFrameRate(_)))
        ));
    }

    #[test]
    fn test_decode_error_mid_stream_flushes_event() {
        let mut source = SyntheticSource::new(10.0, 1000, |i| i % 2 == 1);
        source.fail_at = Some(77);
        let outcome = run(&mut source);

        assert!(!outcome.cancelled);
        assert_eq!(outcome.events.len(), 1);
        assert_close(outcome.events[0].end, 7.7);
    }

    #[test]
    fn test_scoring_failure_counts_as_no_motion() {
        // Every other frame decodes at half size, so each scored pair mismatches.
        let mut source = SyntheticSource::new(10.0, 200, |i| i % 2 == 1);
        source.shrink_odd = true;
        let outcome = run(&mut source);

        assert_eq!(outcome.samples, 4);
        assert_eq!(outcome.failures, 4);
        assert!(outcome.events.is_empty());
    }
}
