mod geometry;
mod selector;

use opencv::core::{Point, Size};
use thiserror::Error;

pub use geometry::{MaskCache, Polygon, Roi};
pub use selector::select_roi;

#[derive(Debug, Error)]
pub enum RoiError {
    #[error("a region needs at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("invalid frame size {0}x{1}")]
    InvalidSize(i32, i32),
    #[error("region selection cancelled")]
    Cancelled,
    #[error("region selector state is unavailable")]
    SessionUnavailable,
    #[error("malformed region argument: {0}")]
    Parse(String),
    #[error("opencv error: {0}")]
    Cv(#[from] opencv::Error),
}

pub fn parse_points(input: &str) -> Result<Vec<Point>, RoiError> {
    input
        .split(|c: char| c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| RoiError::Parse(format!("expected x,y but got '{pair}'")))?;
            let x = x
                .trim()
                .parse()
                .map_err(|_| RoiError::Parse(format!("bad x coordinate in '{pair}'")))?;
            let y = y
                .trim()
                .parse()
                .map_err(|_| RoiError::Parse(format!("bad y coordinate in '{pair}'")))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

pub fn parse_size(input: &str) -> Result<Size, RoiError> {
    let (w, h) = input
        .trim()
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| RoiError::Parse(format!("expected WIDTHxHEIGHT but got '{input}'")))?;
    let width: i32 = w
        .parse()
        .map_err(|_| RoiError::Parse(format!("bad width in '{input}'")))?;
    let height: i32 = h
        .parse()
        .map_err(|_| RoiError::Parse(format!("bad height in '{input}'")))?;
    if width <= 0 || height <= 0 {
        return Err(RoiError::InvalidSize(width, height));
    }
    Ok(Size::new(width, height))
}
