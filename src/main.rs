//! Live clean-room monitor: runs pose estimation on the central strip of
//! each frame, validates wrist and shoulder geometry per person, and
//! archives annotated frames whose posture matches the zipping pattern.

use std::time::{Duration, Instant};

use anyhow::Result;
use opencv::core::Vector;
use opencv::imgcodecs;

use zipwatch::archive::CandidateStore;
use zipwatch::capture::{VideoSource, VideoWriterSink};
use zipwatch::config::Config;
use zipwatch::pose::{PoseDetector, ProcessRegion};
use zipwatch::posture::ValidationRule;
use zipwatch::render::{overlay, Key, MinifbRenderer};

const CONFIG_PATH: &str = "config.toml";
/// How long the SAVED banner stays up, in frames.
const SAVED_BANNER_FRAMES: u64 = 30;

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);

    println!("ZipWatch Monitor ({})", env!("GIT_VERSION"));
    println!("Source: {}", config.video.source);
    println!("Model: {}", config.detection.model_path);
    println!(
        "Processing strip: {:.0}% of frame width",
        config.detection.center_fraction * 100.0
    );
    println!(
        "Wrist band: [{}, {}]%  wrists: {}  shoulder width max: {}%",
        config.validation.vertical_min_percent,
        config.validation.vertical_max_percent,
        config.validation.wrist,
        config.validation.max_shoulder_percent
    );
    println!(
        "Archive: {}/ (prefix \"{}\")",
        config.archive.dir, config.archive.prefix
    );
    println!();
    println!("Keys: [Q] quit  [P] pause  [S] snapshot  [Esc] close window");
    println!();

    let mut source = VideoSource::open(&config.video)?;
    let (width, height) = source.resolution();
    println!("Video: {}x{} @ {:.1} fps", width, height, source.fps());

    let mut detector = PoseDetector::from_config(&config.detection)?;
    println!("Model loaded");

    let rule = ValidationRule::from_config(&config.validation)?;
    let store = CandidateStore::from_config(&config.archive)?;
    let region = ProcessRegion::centered(
        width as i32,
        height as i32,
        config.detection.center_fraction,
    );

    let mut renderer = if config.display.enabled {
        Some(MinifbRenderer::new(
            "ZipWatch Monitor",
            width as usize,
            height as usize,
        )?)
    } else {
        None
    };

    let mut writer = if config.writer.enabled {
        let fps = if config.writer.fps > 0.0 {
            config.writer.fps
        } else {
            source.fps()
        };
        Some(VideoWriterSink::create(
            &config.writer.output_path,
            fps,
            width,
            height,
        )?)
    } else {
        None
    };

    let mut frame_count: u64 = 0;
    let mut flag_count: u64 = 0;
    let mut paused = false;
    let mut last_saved: Option<(String, u64)> = None;

    // 1 Hz stats
    let mut fps_frames = 0u32;
    let mut fps_timer = Instant::now();
    let mut t_capture = 0.0f64;
    let mut t_inference = 0.0f64;
    let mut t_render = 0.0f64;
    let mut persons_last = 0usize;

    loop {
        // Window state first, so quit and pause work between frames too.
        if let Some(ref r) = renderer {
            if !r.is_open() {
                break;
            }
            if r.is_key_pressed(Key::Q) {
                println!("Quit");
                break;
            }
            if r.is_key_pressed(Key::P) {
                paused = !paused;
                println!("{}", if paused { "Paused" } else { "Resumed" });
            }
        }

        if paused {
            if let Some(ref mut r) = renderer {
                r.update()?;
            }
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }

        let t0 = Instant::now();
        let Some(mut frame) = source.read_frame()? else {
            if source.is_live() {
                eprintln!("Stream interrupted, stopping");
            } else {
                println!("End of video");
            }
            break;
        };
        frame_count += 1;
        let t1 = Instant::now();

        // Crop from the clean frame before any overlay lands on it.
        let cropped = region.crop(&frame)?;
        let detections = detector.detect(&cropped)?;
        let t2 = Instant::now();
        persons_last = detections.len();

        overlay::draw_region(&mut frame, &region)?;

        for (person_idx, detection) in detections.iter().enumerate() {
            let detection = detection.offset_x(region.start_x as f32);
            let validation = rule.validate(&detection.pose.keypoints);

            overlay::draw_pose(&mut frame, &detection.pose)?;
            overlay::draw_wrist_markers(&mut frame, &detection.pose, &validation)?;
            overlay::draw_status_block(&mut frame, person_idx, &validation)?;

            if validation.is_flagged(rule.wrist) {
                flag_count += 1;
                let path = store.save(&frame, frame_count, person_idx, &validation)?;
                println!(
                    "Flagged person {} at frame {} -> {}",
                    person_idx,
                    frame_count,
                    path.display()
                );
                last_saved = Some((path.display().to_string(), frame_count));
            }
        }

        overlay::draw_flag_count(&mut frame, flag_count)?;

        if let Some((ref path, saved_at)) = last_saved {
            if frame_count.saturating_sub(saved_at) <= SAVED_BANNER_FRAMES {
                overlay::draw_saved_banner(&mut frame, path)?;
            }
        }

        if let Some(ref mut w) = writer {
            w.write(&frame)?;
        }

        if let Some(ref mut r) = renderer {
            r.draw_frame(&frame)?;
            r.update()?;
            if r.is_key_pressed(Key::S) {
                let snap = format!("frame_{frame_count}.jpg");
                imgcodecs::imwrite(&snap, &frame, &Vector::new())?;
                println!("Snapshot saved: {snap}");
            }
        }
        let t3 = Instant::now();

        t_capture += (t1 - t0).as_secs_f64() * 1000.0;
        t_inference += (t2 - t1).as_secs_f64() * 1000.0;
        t_render += (t3 - t2).as_secs_f64() * 1000.0;

        fps_frames += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let n = fps_frames as f64;
            println!(
                "FPS: {:.1} | persons: {} | flagged total: {} | capture {:.1}ms  inference {:.1}ms  render {:.1}ms",
                fps_frames as f32 / elapsed,
                persons_last,
                flag_count,
                t_capture / n,
                t_inference / n,
                t_render / n
            );
            fps_frames = 0;
            fps_timer = Instant::now();
            t_capture = 0.0;
            t_inference = 0.0;
            t_render = 0.0;
        }
    }

    println!();
    println!("Frames processed: {}", frame_count);
    println!("Poses flagged: {}", flag_count);
    Ok(())
}
