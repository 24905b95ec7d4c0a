use opencv::core::{self, Mat, Point, Scalar, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use super::RoiError;

pub const MIN_POLYGON_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    fn contours(&self) -> Vector<Vector<Point>> {
        let mut contours = Vector::<Vector<Point>>::new();
        contours.push(self.points.iter().copied().collect());
        contours
    }
}

pub fn build_mask(polygon: &Polygon, size: Size) -> Result<Mat, RoiError> {
    if polygon.points().len() < MIN_POLYGON_POINTS {
        return Err(RoiError::TooFewPoints(polygon.points().len()));
    }
    if size.width <= 0 || size.height <= 0 {
        return Err(RoiError::InvalidSize(size.width, size.height));
    }

    let mut mask = Mat::zeros(size.height, size.width, core::CV_8UC1)?.to_mat()?;
    imgproc::fill_poly(
        &mut mask,
        &polygon.contours(),
        Scalar::all(255.0),
        imgproc::LINE_8,
        0,
        Point::new(0, 0),
    )?;

    Ok(mask)
}

/// Scale every vertex by independent per-axis factors, truncating to whole pixels.
///
/// `reference` must have positive dimensions; `Roi::new` guarantees that.
pub fn rescale(polygon: &Polygon, reference: Size, target: Size) -> Polygon {
    if reference == target {
        return polygon.clone();
    }

    let scale_x = target.width as f64 / reference.width as f64;
    let scale_y = target.height as f64 / reference.height as f64;

    let points = polygon
        .points
        .iter()
        .map(|p| {
            Point::new(
                (p.x as f64 * scale_x) as i32,
                (p.y as f64 * scale_y) as i32,
            )
        })
        .collect();

    Polygon::new(points)
}

#[derive(Debug, Clone)]
pub struct Roi {
    polygon: Polygon,
    reference: Size,
}

impl Roi {
    pub fn new(polygon: Polygon, reference: Size) -> Result<Self, RoiError> {
        if polygon.points().len() < MIN_POLYGON_POINTS {
            return Err(RoiError::TooFewPoints(polygon.points().len()));
        }
        if reference.width <= 0 || reference.height <= 0 {
            return Err(RoiError::InvalidSize(reference.width, reference.height));
        }
        Ok(Self { polygon, reference })
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn reference(&self) -> Size {
        self.reference
    }

    pub fn mask_for(&self, target: Size) -> Result<Mat, RoiError> {
        let scaled = rescale(&self.polygon, self.reference, target);
        build_mask(&scaled, target)
    }
}

pub struct MaskCache {
    roi: Roi,
    cached: Option<(Size, Mat)>,
}

impl MaskCache {
    pub fn new(roi: Roi) -> Self {
        Self { roi, cached: None }
    }

    pub fn mask_for(&mut self, size: Size) -> Result<&Mat, RoiError> {
        let entry = match self.cached.take() {
            Some((cached_size, mask)) if cached_size == size => (cached_size, mask),
            _ => {
                let mask = self.roi.mask_for(size)?;
                tracing::debug!(
                    width = size.width,
                    height = size.height,
                    roi_pixels = core::count_non_zero(&mask)?,
                    "built ROI mask"
                );
                (size, mask)
            }
        };

        Ok(&self.cached.insert(entry).1)
    }
}
