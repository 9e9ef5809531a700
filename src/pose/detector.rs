use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, Size, CV_32FC3},
    imgproc,
    prelude::*,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::region::BBox;
use crate::config::DetectionConfig;

/// One person found in a frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub score: f32,
    pub pose: Pose,
}

impl Detection {
    /// Shift the detection horizontally, e.g. from region to frame coordinates.
    pub fn offset_x(&self, dx: f32) -> Detection {
        Detection {
            bbox: self.bbox.offset_x(dx),
            score: self.score,
            pose: self.pose.offset_x(dx),
        }
    }
}

/// YOLO-pose detector (ONNX, 17-keypoint head).
pub struct PoseDetector {
    session: Session,
    input_size: i32,
    confidence_threshold: f32,
    iou_threshold: f32,
    keypoint_confidence: f32,
}

impl PoseDetector {
    /// Load the ONNX model named in the detection config.
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load pose model {}", config.model_path))?;

        Ok(Self {
            session,
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            keypoint_confidence: config.keypoint_confidence,
        })
    }

    /// Detect every person in a BGR frame.
    ///
    /// Boxes and keypoints come back in the frame's pixel coordinates.
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let frame_w = frame.cols();
        let frame_h = frame.rows();
        let input = self.preprocess(frame)?;

        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input_tensor])
            .context("Pose inference failed")?;

        // Output: [1, 56, N] = cx, cy, w, h, person score, 17 x (x, y, conf)
        let output: ndarray::ArrayViewD<f32> = outputs["output0"]
            .try_extract_array()
            .context("Failed to extract pose model output")?;

        let scale_x = frame_w as f32 / self.input_size as f32;
        let scale_y = frame_h as f32 / self.input_size as f32;

        let detections = decode_detections(
            &output,
            scale_x,
            scale_y,
            self.confidence_threshold,
            self.keypoint_confidence,
        );
        Ok(nms(detections, self.iou_threshold))
    }

    /// BGR Mat -> NCHW [1, 3, input_size, input_size] tensor, values in [0, 1].
    fn preprocess(&self, frame: &Mat) -> Result<Array4<f32>> {
        let size = self.input_size;

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            Size::new(size, size),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut float_mat = Mat::default();
        resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

        let s = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
        let data = float_mat.data_bytes()?;
        let step = float_mat.mat_step().get(0);
        for y in 0..s {
            let row_ptr = unsafe {
                std::slice::from_raw_parts(data.as_ptr().add(y * step) as *const f32, s * 3)
            };
            for x in 0..s {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = row_ptr[x * 3 + c] / 255.0;
                }
            }
        }

        Ok(tensor)
    }
}

/// Decode the raw pose head into detections, rescaling to frame pixels.
///
/// Keypoints below `keypoint_confidence` stay at (0, 0), which is what the
/// posture validator treats as "not detected".
fn decode_detections(
    output: &ndarray::ArrayViewD<f32>,
    scale_x: f32,
    scale_y: f32,
    confidence_threshold: f32,
    keypoint_confidence: f32,
) -> Vec<Detection> {
    let n_detections = output.shape()[2];
    let mut detections = Vec::new();

    for i in 0..n_detections {
        let score = output[[0, 4, i]];
        if score < confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];
        let bbox = BBox {
            x: (cx - w / 2.0) * scale_x,
            y: (cy - h / 2.0) * scale_y,
            width: w * scale_x,
            height: h * scale_y,
        };

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for k in 0..KeypointIndex::COUNT {
            let kx = output[[0, 5 + k * 3, i]];
            let ky = output[[0, 6 + k * 3, i]];
            let conf = output[[0, 7 + k * 3, i]];
            if conf >= keypoint_confidence {
                keypoints[k] = Keypoint::new(kx * scale_x, ky * scale_y, conf);
            }
        }

        detections.push(Detection {
            bbox,
            score,
            pose: Pose::new(keypoints),
        });
    }

    detections
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| det.bbox.iou(&k.bbox) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, ArrayD};

    /// Build a [1, 56, N] output with the given (cx, cy, w, h, score) rows.
    /// All keypoint slots start zeroed.
    fn synthetic_output(dets: &[[f32; 5]]) -> ArrayD<f32> {
        let mut out = Array3::<f32>::zeros((1, 56, dets.len()));
        for (i, d) in dets.iter().enumerate() {
            for (row, v) in d.iter().enumerate() {
                out[[0, row, i]] = *v;
            }
        }
        out.into_dyn()
    }

    fn set_keypoint(out: &mut ArrayD<f32>, det: usize, k: usize, x: f32, y: f32, conf: f32) {
        out[[0, 5 + k * 3, det]] = x;
        out[[0, 6 + k * 3, det]] = y;
        out[[0, 7 + k * 3, det]] = conf;
    }

    #[test]
    fn test_decode_filters_low_scores() {
        let out = synthetic_output(&[
            [320.0, 320.0, 100.0, 200.0, 0.9],
            [100.0, 100.0, 50.0, 50.0, 0.2],
        ]);
        let dets = decode_detections(&out.view(), 1.0, 1.0, 0.5, 0.3);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_scales_to_frame_pixels() {
        let out = synthetic_output(&[[320.0, 320.0, 100.0, 200.0, 0.9]]);
        // 640 input -> 1280x480 frame
        let dets = decode_detections(&out.view(), 2.0, 0.75, 0.5, 0.3);
        assert_eq!(dets.len(), 1);
        let bbox = dets[0].bbox;
        assert!((bbox.x - (320.0 - 50.0) * 2.0).abs() < 1e-3);
        assert!((bbox.y - (320.0 - 100.0) * 0.75).abs() < 1e-3);
        assert!((bbox.width - 200.0).abs() < 1e-3);
        assert!((bbox.height - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_zeroes_low_confidence_keypoints() {
        let mut out = synthetic_output(&[[320.0, 320.0, 100.0, 200.0, 0.9]]);
        set_keypoint(&mut out, 0, KeypointIndex::Nose as usize, 300.0, 100.0, 0.8);
        set_keypoint(&mut out, 0, KeypointIndex::LeftAnkle as usize, 310.0, 600.0, 0.1);

        let dets = decode_detections(&out.view(), 1.0, 1.0, 0.5, 0.3);
        let pose = &dets[0].pose;
        assert!(pose.get(KeypointIndex::Nose).is_present());
        assert!((pose.get(KeypointIndex::Nose).x - 300.0).abs() < 1e-3);
        // Low-confidence ankle must come back as undetected
        assert!(!pose.get(KeypointIndex::LeftAnkle).is_present());
        assert_eq!(pose.get(KeypointIndex::LeftAnkle).confidence, 0.0);
    }

    #[test]
    fn test_nms_drops_overlapping_duplicates() {
        let out = synthetic_output(&[
            [320.0, 320.0, 100.0, 200.0, 0.7],
            [322.0, 321.0, 100.0, 200.0, 0.9],
            [100.0, 100.0, 40.0, 80.0, 0.8],
        ]);
        let dets = decode_detections(&out.view(), 1.0, 1.0, 0.5, 0.3);
        let kept = nms(dets, 0.45);
        assert_eq!(kept.len(), 2);
        // The higher-scoring duplicate survives
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint_detections() {
        let out = synthetic_output(&[
            [100.0, 100.0, 40.0, 80.0, 0.9],
            [500.0, 100.0, 40.0, 80.0, 0.6],
        ]);
        let dets = decode_detections(&out.view(), 1.0, 1.0, 0.5, 0.3);
        assert_eq!(nms(dets, 0.45).len(), 2);
    }

    #[test]
    fn test_detection_offset_x() {
        let out = synthetic_output(&[[320.0, 320.0, 100.0, 200.0, 0.9]]);
        let mut out = out;
        set_keypoint(&mut out, 0, KeypointIndex::Nose as usize, 300.0, 100.0, 0.8);
        let dets = decode_detections(&out.view(), 1.0, 1.0, 0.5, 0.3);

        let shifted = dets[0].offset_x(160.0);
        assert!((shifted.bbox.x - (dets[0].bbox.x + 160.0)).abs() < 1e-3);
        assert!((shifted.pose.get(KeypointIndex::Nose).x - 460.0).abs() < 1e-3);
        // Undetected keypoints are untouched by the shift
        assert!(!shifted.pose.get(KeypointIndex::LeftAnkle).is_present());
    }
}
