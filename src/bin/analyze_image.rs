//! Single-image posture report: runs detection on a still image (local path
//! or URL), prints the reference levels and wrist measurements per person,
//! and writes an annotated copy next to the working directory.

use std::env;

use anyhow::{bail, Context, Result};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

use zipwatch::config::Config;
use zipwatch::pose::PoseDetector;
use zipwatch::posture::{self, ValidationRule, WristCheck};
use zipwatch::render::overlay;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let Some(source) = env::args().nth(1) else {
        eprintln!("Usage: analyze_image <path-or-url>");
        std::process::exit(2);
    };

    let config = Config::load_or_default(CONFIG_PATH);

    println!("ZipWatch Image Analysis ({})", env!("GIT_VERSION"));
    println!("Input: {source}");

    let frame = load_image(&source)?;
    println!("Image: {}x{}", frame.cols(), frame.rows());

    let mut detector = PoseDetector::from_config(&config.detection)?;
    let rule = ValidationRule::from_config(&config.validation)?;

    // Stills are analyzed edge to edge, no central strip.
    let detections = detector.detect(&frame)?;
    if detections.is_empty() {
        println!("No persons detected");
        return Ok(());
    }
    println!("Persons detected: {}", detections.len());

    let mut annotated = frame.try_clone()?;

    for (person_idx, detection) in detections.iter().enumerate() {
        println!();
        println!("--- Person {} ---", person_idx + 1);
        println!("Detection score: {:.2}", detection.score);

        let validation = rule.validate(&detection.pose.keypoints);

        match posture::reference_levels(&detection.pose.keypoints) {
            Some((shoulder_y, hip_y)) => {
                println!("Reference levels:");
                println!("  0% level (shoulder avg): y = {shoulder_y:.1} px");
                println!("  100% level (hip avg): y = {hip_y:.1} px");
                println!("  Reference range: {:.1} px", hip_y - shoulder_y);
                overlay::draw_reference_levels(&mut annotated, shoulder_y, hip_y)?;
            }
            None => {
                println!("Cannot calculate reference levels: missing shoulder or hip keypoints");
            }
        }

        println!(
            "Shoulders: width {:.1}% -> {}",
            validation.shoulders.width_percent, validation.shoulders.message
        );
        print_wrist("Left wrist", &validation.left);
        print_wrist("Right wrist", &validation.right);
        println!(
            "Flagged: {}",
            if validation.is_flagged(rule.wrist) {
                "yes"
            } else {
                "no"
            }
        );

        overlay::draw_pose(&mut annotated, &detection.pose)?;
        overlay::draw_wrist_markers(&mut annotated, &detection.pose, &validation)?;
    }

    let output = output_name(&source);
    imgcodecs::imwrite(&output, &annotated, &Vector::new())?;
    println!();
    println!("Annotated image saved as: {output}");

    Ok(())
}

fn print_wrist(label: &str, check: &WristCheck) {
    if check.message.is_empty() {
        println!("{label}: not evaluated");
    } else {
        println!(
            "{label}: {:+.1}% -> {}",
            check.vertical_percent, check.message
        );
    }
}

fn load_image(source: &str) -> Result<Mat> {
    let mat = if source.starts_with("http://") || source.starts_with("https://") {
        let bytes = reqwest::blocking::get(source)
            .with_context(|| format!("failed to fetch {source}"))?
            .error_for_status()
            .with_context(|| format!("bad response from {source}"))?
            .bytes()
            .context("failed to read response body")?;
        let buf = Vector::<u8>::from_iter(bytes.iter().copied());
        imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?
    } else {
        imgcodecs::imread(source, imgcodecs::IMREAD_COLOR)
            .with_context(|| format!("failed to read {source}"))?
    };

    if mat.empty() {
        bail!("could not decode an image from {source}");
    }
    Ok(mat)
}

/// `shots/cam7.jpg` -> `cam7_analysis.jpg`, URLs use their last path segment.
fn output_name(source: &str) -> String {
    let name = source
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source);
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let stem = if stem.is_empty() { "image" } else { stem };
    format!("{stem}_analysis.jpg")
}
