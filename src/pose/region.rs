use anyhow::Result;
use opencv::{
    core::{Mat, Rect},
    prelude::*,
};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box. 0.0 when disjoint.
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    pub fn offset_x(&self, dx: f32) -> BBox {
        BBox {
            x: self.x + dx,
            ..*self
        }
    }
}

/// Horizontal band of the frame that inference runs on.
///
/// Operators pass through the middle of the camera's field of view; the
/// edges only ever show racks and doorways, so the monitor crops to the
/// central `fraction` of the frame width before running the model.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRegion {
    pub start_x: i32,
    pub end_x: i32,
    pub height: i32,
}

impl ProcessRegion {
    /// Region centered on the frame, covering `fraction` of its width.
    /// `fraction` is clamped to (0, 1]; 1.0 means the full frame.
    pub fn centered(frame_w: i32, frame_h: i32, fraction: f32) -> Self {
        let fraction = if fraction > 0.0 { fraction.min(1.0) } else { 1.0 };
        let margin = (frame_w as f32 * (1.0 - fraction) / 2.0) as i32;
        Self {
            start_x: margin,
            end_x: frame_w - margin,
            height: frame_h,
        }
    }

    pub fn width(&self) -> i32 {
        self.end_x - self.start_x
    }

    pub fn is_full_width(&self) -> bool {
        self.start_x == 0
    }

    /// Extract the region from a frame as an owned Mat.
    pub fn crop(&self, frame: &Mat) -> Result<Mat> {
        let roi = Rect::new(self.start_x, 0, self.width().max(1), self.height);
        let cropped = Mat::roi(frame, roi)?;
        Ok(cropped.try_clone()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_half_width() {
        let region = ProcessRegion::centered(640, 480, 0.5);
        assert_eq!(region.start_x, 160);
        assert_eq!(region.end_x, 480);
        assert_eq!(region.width(), 320);
        assert_eq!(region.height, 480);
    }

    #[test]
    fn test_centered_full_width() {
        let region = ProcessRegion::centered(640, 480, 1.0);
        assert_eq!(region.start_x, 0);
        assert_eq!(region.end_x, 640);
        assert!(region.is_full_width());
    }

    #[test]
    fn test_centered_clamps_bad_fraction() {
        // Non-positive fractions fall back to the full frame
        let region = ProcessRegion::centered(640, 480, 0.0);
        assert_eq!(region.width(), 640);
        let region = ProcessRegion::centered(640, 480, 2.0);
        assert_eq!(region.width(), 640);
    }

    #[test]
    fn test_iou_identical() {
        let a = BBox { x: 10.0, y: 10.0, width: 100.0, height: 50.0 };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = BBox { x: 100.0, y: 100.0, width: 10.0, height: 10.0 };
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = BBox { x: 5.0, y: 0.0, width: 10.0, height: 10.0 };
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_offset_x() {
        let a = BBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0 };
        let shifted = a.offset_x(160.0);
        assert_eq!(shifted.x, 170.0);
        assert_eq!(shifted.y, 20.0);
        assert_eq!(shifted.width, 30.0);
    }
}
