use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open video {0}")]
    Open(PathBuf),
    #[error("invalid frame rate {0}")]
    InvalidFrameRate(f64),
    #[error("video has no readable frames")]
    NoFrames,
    #[error("opencv error: {0}")]
    Cv(#[from] opencv::Error),
}

pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Mat>, SourceError>;

    fn frame_rate(&self) -> f64;

    fn position(&self) -> u64;

    fn frame_count(&self) -> Option<u64>;

    fn frame_size(&self) -> Size;
}

pub struct VideoFileSource {
    capture: VideoCapture,
    fps: f64,
    frame_count: Option<u64>,
    native_size: Size,
    analysis_size: Option<Size>,
    position: u64,
}

impl VideoFileSource {
    pub fn open(path: &Path, analysis_size: Option<Size>) -> Result<Self, SourceError> {
        let capture = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(SourceError::Open(path.to_path_buf()));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SourceError::InvalidFrameRate(fps));
        }

        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let frame_count = (frame_count.is_finite() && frame_count > 0.0).then_some(frame_count as u64);

        let native_size = Size::new(
            capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
        );

        tracing::info!(
            path = %path.display(),
            fps = format!("{:.2}", fps),
            frames = ?frame_count,
            width = native_size.width,
            height = native_size.height,
            "opened video"
        );

        Ok(Self {
            capture,
            fps,
            frame_count,
            native_size,
            analysis_size: analysis_size.filter(|s| *s != native_size),
            position: 0,
        })
    }

    pub fn native_size(&self) -> Size {
        self.native_size
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Mat>, SourceError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        self.position += 1;

        let Some(size) = self.analysis_size else {
            return Ok(Some(frame));
        };

        let mut resized = Mat::default();
        imgproc::resize(&frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_AREA)?;
        Ok(Some(resized))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn frame_size(&self) -> Size {
        self.analysis_size.unwrap_or(self.native_size)
    }
}
