//! Frame annotations drawn directly onto the BGR capture Mat.

use anyhow::Result;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use crate::pose::{KeypointIndex, Pose, ProcessRegion};
use crate::posture::{PostureValidation, WristCheck};
use crate::render::skeleton::SKELETON_CONNECTIONS;

// Colors are BGR.
fn green() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn red() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn blue() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn yellow() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0)
}

fn white() -> Scalar {
    Scalar::new(255.0, 255.0, 255.0, 0.0)
}

fn put_label(
    frame: &mut Mat,
    text: &str,
    org: Point,
    scale: f64,
    color: Scalar,
    thickness: i32,
) -> Result<()> {
    imgproc::put_text(
        frame,
        text,
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        thickness,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Draws skeleton lines and keypoint dots for one detected person.
pub fn draw_pose(frame: &mut Mat, pose: &Pose) -> Result<()> {
    for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
        let start = pose.get(*start_idx);
        let end = pose.get(*end_idx);
        if start.is_present() && end.is_present() {
            let (x1, y1) = start.to_pixel();
            let (x2, y2) = end.to_pixel();
            imgproc::line(
                frame,
                Point::new(x1, y1),
                Point::new(x2, y2),
                blue(),
                2,
                imgproc::LINE_8,
                0,
            )?;
        }
    }

    for kp in pose.keypoints.iter().filter(|kp| kp.is_present()) {
        let (x, y) = kp.to_pixel();
        imgproc::circle(frame, Point::new(x, y), 4, green(), -1, imgproc::LINE_8, 0)?;
    }

    Ok(())
}

/// Circles each evaluated wrist, green when it passed and red when it failed.
pub fn draw_wrist_markers(frame: &mut Mat, pose: &Pose, validation: &PostureValidation) -> Result<()> {
    let wrists = [
        (KeypointIndex::LeftWrist, &validation.left),
        (KeypointIndex::RightWrist, &validation.right),
    ];

    for (index, check) in wrists {
        let kp = pose.get(index);
        // An empty message means the wrist was never evaluated.
        if !kp.is_present() || check.message.is_empty() {
            continue;
        }
        let color = if check.valid { green() } else { red() };
        let (x, y) = kp.to_pixel();
        imgproc::circle(frame, Point::new(x, y), 8, color, 1, imgproc::LINE_8, 0)?;
    }

    Ok(())
}

/// Per-person PASS/FAIL panel in the top-left corner.
///
/// Each person occupies a 120 px tall block so stacked results stay readable.
pub fn draw_status_block(
    frame: &mut Mat,
    person_idx: usize,
    validation: &PostureValidation,
) -> Result<()> {
    let base_y = 30 + person_idx as i32 * 120;

    let shoulders = &validation.shoulders;
    let shoulder_color = if shoulders.valid { green() } else { red() };
    let shoulder_text = format!(
        "Shoulders: {}",
        if shoulders.valid { "PASS" } else { "FAIL" }
    );
    put_label(frame, &shoulder_text, Point::new(10, base_y), 0.6, shoulder_color, 2)?;
    put_label(
        frame,
        &format!("Dist: {:.1}%", shoulders.width_percent),
        Point::new(10, base_y + 25),
        0.5,
        white(),
        1,
    )?;

    wrist_column(frame, 10, base_y, "Left Wrist", &validation.left)?;
    wrist_column(frame, 200, base_y, "Right Wrist", &validation.right)?;

    Ok(())
}

fn wrist_column(frame: &mut Mat, x: i32, base_y: i32, label: &str, check: &WristCheck) -> Result<()> {
    if check.message.is_empty() {
        return Ok(());
    }
    let color = if check.valid { green() } else { red() };
    let text = format!("{}: {}", label, if check.valid { "PASS" } else { "FAIL" });
    put_label(frame, &text, Point::new(x, base_y + 50), 0.6, color, 2)?;
    put_label(
        frame,
        &format!("Vert: {:.1}%", check.vertical_percent),
        Point::new(x, base_y + 75),
        0.5,
        white(),
        1,
    )?;
    Ok(())
}

/// Outlines the analyzed strip of the frame. No-op when the full frame is used.
pub fn draw_region(frame: &mut Mat, region: &ProcessRegion) -> Result<()> {
    if region.is_full_width() {
        return Ok(());
    }
    let rect = Rect::new(region.start_x, 0, region.width().max(1), region.height);
    imgproc::rectangle(frame, rect, yellow(), 2, imgproc::LINE_8, 0)?;
    put_label(
        frame,
        "Processing Area (Center)",
        Point::new(region.start_x + 10, 30),
        0.7,
        yellow(),
        2,
    )?;
    Ok(())
}

/// Running flag counter in the top-right corner.
pub fn draw_flag_count(frame: &mut Mat, count: u64) -> Result<()> {
    let x = (frame.cols() - 300).max(10);
    put_label(
        frame,
        &format!("Flagged Poses: {count}"),
        Point::new(x, 30),
        0.7,
        yellow(),
        2,
    )
}

/// Short-lived banner confirming a candidate frame was written to disk.
pub fn draw_saved_banner(frame: &mut Mat, path: &str) -> Result<()> {
    let y = (frame.rows() - 20).max(20);
    put_label(frame, &format!("SAVED: {path}"), Point::new(10, y), 0.6, green(), 2)
}

/// Horizontal reference lines for the still-image report: 0% at the shoulder
/// average, 100% at the hip average.
pub fn draw_reference_levels(frame: &mut Mat, shoulder_y: f32, hip_y: f32) -> Result<()> {
    let width = frame.cols();
    let sy = shoulder_y as i32;
    let hy = hip_y as i32;

    imgproc::line(
        frame,
        Point::new(0, sy),
        Point::new(width, sy),
        yellow(),
        2,
        imgproc::LINE_8,
        0,
    )?;
    put_label(frame, "0% (shoulder avg)", Point::new(10, sy - 10), 0.6, yellow(), 2)?;

    let cyan = Scalar::new(255.0, 255.0, 0.0, 0.0);
    imgproc::line(
        frame,
        Point::new(0, hy),
        Point::new(width, hy),
        cyan,
        2,
        imgproc::LINE_8,
        0,
    )?;
    put_label(frame, "100% (hip avg)", Point::new(10, hy + 20), 0.6, cyan, 2)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};

    fn blank_frame() -> Mat {
        Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_region_rectangle_marks_frame() {
        let mut frame = blank_frame();
        let region = ProcessRegion::centered(320, 240, 0.5);
        draw_region(&mut frame, &region).unwrap();

        let px = *frame.at_2d::<Vec3b>(0, region.start_x).unwrap();
        assert_eq!(px[1], 255, "region border should be yellow (BGR 0,255,255)");
        assert_eq!(px[2], 255, "region border should be yellow (BGR 0,255,255)");
    }

    #[test]
    fn test_full_width_region_draws_nothing() {
        let mut frame = blank_frame();
        let region = ProcessRegion::centered(320, 240, 1.0);
        draw_region(&mut frame, &region).unwrap();

        let px = *frame.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!(px, Vec3b::from([0, 0, 0]), "full-width region should not be outlined");
    }

    #[test]
    fn test_status_block_handles_default_validation() {
        let mut frame = blank_frame();
        draw_status_block(&mut frame, 0, &PostureValidation::default()).unwrap();
        draw_status_block(&mut frame, 1, &PostureValidation::default()).unwrap();
    }
}
