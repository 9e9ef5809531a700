//! Geometric posture validation.
//!
//! Wrist height is measured as a percentage of each person's own
//! shoulder-to-hip distance: 0% at shoulder level, 100% at hip level.
//! A person whose selected wrists sit inside the configured band while
//! their shoulders stay narrow (i.e. they face the camera squarely) is
//! flagged as a suspected unzipping posture.

use anyhow::{bail, Result};

use crate::config::ValidationConfig;
use crate::pose::{Keypoint, KeypointIndex};

/// Which wrists have to pass for a person to be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WristSelector {
    Left,
    Right,
    Both,
}

impl WristSelector {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn includes_left(self) -> bool {
        matches!(self, Self::Left | Self::Both)
    }

    pub fn includes_right(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }
}

/// Outcome of one wrist check. Defaults to "not validated".
#[derive(Debug, Clone, Default)]
pub struct WristCheck {
    pub valid: bool,
    /// Wrist height relative to the shoulder-hip range, in percent
    pub vertical_percent: f32,
    /// Set only when the horizontal bound is enabled
    pub horizontal_valid: Option<bool>,
    pub message: String,
}

/// Outcome of the shoulder width check.
#[derive(Debug, Clone, Default)]
pub struct ShoulderCheck {
    pub valid: bool,
    /// Shoulder span relative to the shoulder-hip range, in percent
    pub width_percent: f32,
    pub message: String,
}

/// Per-person validation result.
#[derive(Debug, Clone, Default)]
pub struct PostureValidation {
    pub left: WristCheck,
    pub right: WristCheck,
    pub shoulders: ShoulderCheck,
}

impl PostureValidation {
    /// All three checks rejected with the same diagnostic.
    fn rejected(message: &str) -> Self {
        let wrist = WristCheck {
            message: message.to_string(),
            ..WristCheck::default()
        };
        Self {
            left: wrist.clone(),
            right: wrist,
            shoulders: ShoulderCheck {
                message: message.to_string(),
                ..ShoulderCheck::default()
            },
        }
    }

    /// Whether the wrists named by `selector` all passed.
    pub fn wrists_valid(&self, selector: WristSelector) -> bool {
        match selector {
            WristSelector::Left => self.left.valid,
            WristSelector::Right => self.right.valid,
            WristSelector::Both => self.left.valid && self.right.valid,
        }
    }

    /// The frame-save trigger: narrow shoulders plus passing wrists.
    pub fn is_flagged(&self, selector: WristSelector) -> bool {
        self.shoulders.valid && self.wrists_valid(selector)
    }
}

/// The configured validation thresholds.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub vertical_min_percent: f32,
    pub vertical_max_percent: f32,
    pub max_shoulder_percent: f32,
    pub wrist: WristSelector,
    pub require_horizontal_bound: bool,
}

impl ValidationRule {
    pub fn from_config(config: &ValidationConfig) -> Result<Self> {
        let Some(wrist) = WristSelector::parse(&config.wrist) else {
            bail!(
                "Unknown wrist selector {:?} (expected \"left\", \"right\" or \"both\")",
                config.wrist
            );
        };
        Ok(Self {
            vertical_min_percent: config.vertical_min_percent,
            vertical_max_percent: config.vertical_max_percent,
            max_shoulder_percent: config.max_shoulder_percent,
            wrist,
            require_horizontal_bound: config.require_horizontal_bound,
        })
    }

    /// Validate one person's keypoints. Pure; never panics, even on an
    /// empty or short slice.
    pub fn validate(&self, keypoints: &[Keypoint]) -> PostureValidation {
        let shoulders = present_keypoints(
            keypoints,
            &[KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder],
        );
        let hips = present_keypoints(keypoints, &[KeypointIndex::LeftHip, KeypointIndex::RightHip]);

        if shoulders.is_empty() || hips.is_empty() {
            return PostureValidation::rejected("Missing reference keypoints");
        }

        // Shoulders define the 0% line, hips the 100% line.
        let shoulder_avg_y = mean(shoulders.iter().map(|k| k.y));
        let hip_avg_y = mean(hips.iter().map(|k| k.y));
        let reference_range = hip_avg_y - shoulder_avg_y;

        if reference_range <= 0.0 {
            return PostureValidation::rejected("Invalid reference range");
        }

        let min_shoulder_x = shoulders.iter().map(|k| k.x).fold(f32::MAX, f32::min);
        let max_shoulder_x = shoulders.iter().map(|k| k.x).fold(f32::MIN, f32::max);

        let mut result = PostureValidation::default();

        let width_percent = (max_shoulder_x - min_shoulder_x) / reference_range * 100.0;
        let shoulders_valid = 0.0 <= width_percent && width_percent <= self.max_shoulder_percent;
        result.shoulders = ShoulderCheck {
            valid: shoulders_valid,
            width_percent,
            message: if shoulders_valid {
                "Valid".to_string()
            } else {
                format!(
                    "Shoulder distance {:.1}% outside range [0, {}]",
                    width_percent, self.max_shoulder_percent
                )
            },
        };

        if self.wrist.includes_left() {
            result.left = self.check_wrist(
                keypoints,
                KeypointIndex::LeftWrist,
                shoulder_avg_y,
                reference_range,
                min_shoulder_x,
                max_shoulder_x,
            );
        }
        if self.wrist.includes_right() {
            result.right = self.check_wrist(
                keypoints,
                KeypointIndex::RightWrist,
                shoulder_avg_y,
                reference_range,
                min_shoulder_x,
                max_shoulder_x,
            );
        }

        result
    }

    fn check_wrist(
        &self,
        keypoints: &[Keypoint],
        index: KeypointIndex,
        shoulder_avg_y: f32,
        reference_range: f32,
        min_shoulder_x: f32,
        max_shoulder_x: f32,
    ) -> WristCheck {
        let Some(wrist) = keypoints.get(index as usize).filter(|k| k.is_present()) else {
            return WristCheck::default();
        };

        let vertical_percent = (wrist.y - shoulder_avg_y) / reference_range * 100.0;
        let vertical_valid = self.vertical_min_percent <= vertical_percent
            && vertical_percent <= self.vertical_max_percent;

        let mut messages = Vec::new();
        if !vertical_valid {
            messages.push(format!(
                "vertical position {:.1}% outside range [{}, {}]",
                vertical_percent, self.vertical_min_percent, self.vertical_max_percent
            ));
        }

        let (valid, horizontal_valid) = if self.require_horizontal_bound {
            let horizontal = min_shoulder_x <= wrist.x && wrist.x <= max_shoulder_x;
            if !horizontal {
                messages.push("horizontal position outside shoulder boundaries".to_string());
            }
            (vertical_valid && horizontal, Some(horizontal))
        } else {
            (vertical_valid, None)
        };

        WristCheck {
            valid,
            vertical_percent,
            horizontal_valid,
            message: if messages.is_empty() {
                "Valid".to_string()
            } else {
                messages.join(", ")
            },
        }
    }
}

/// Shoulder and hip average heights, when both pairs have at least one
/// present keypoint. Feeds the reference lines in the still-image report.
pub fn reference_levels(keypoints: &[Keypoint]) -> Option<(f32, f32)> {
    let shoulders = present_keypoints(
        keypoints,
        &[KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder],
    );
    let hips = present_keypoints(keypoints, &[KeypointIndex::LeftHip, KeypointIndex::RightHip]);
    if shoulders.is_empty() || hips.is_empty() {
        return None;
    }
    Some((
        mean(shoulders.iter().map(|k| k.y)),
        mean(hips.iter().map(|k| k.y)),
    ))
}

/// Keypoints at the given indices that the model actually located.
/// Indices past the end of the slice count as absent.
fn present_keypoints(keypoints: &[Keypoint], indices: &[KeypointIndex]) -> Vec<Keypoint> {
    indices
        .iter()
        .filter_map(|&i| keypoints.get(i as usize).filter(|k| k.is_present()).copied())
        .collect()
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0u32), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min: f32, max: f32, max_shoulder: f32, wrist: WristSelector) -> ValidationRule {
        ValidationRule {
            vertical_min_percent: min,
            vertical_max_percent: max,
            max_shoulder_percent: max_shoulder,
            wrist,
            require_horizontal_bound: false,
        }
    }

    /// Keypoint array with the given (index, x, y) entries present.
    fn keypoints_at(entries: &[(KeypointIndex, f32, f32)]) -> [Keypoint; KeypointIndex::COUNT] {
        let mut kpts = [Keypoint::default(); KeypointIndex::COUNT];
        for &(index, x, y) in entries {
            kpts[index as usize] = Keypoint::new(x, y, 1.0);
        }
        kpts
    }

    /// Shoulders at y=100 (x 90/110), hips at y=200: the reference range
    /// is 100 px and the shoulder span 20%.
    fn square_torso() -> Vec<(KeypointIndex, f32, f32)> {
        vec![
            (KeypointIndex::LeftShoulder, 90.0, 100.0),
            (KeypointIndex::RightShoulder, 110.0, 100.0),
            (KeypointIndex::LeftHip, 95.0, 200.0),
            (KeypointIndex::RightHip, 105.0, 200.0),
        ]
    }

    #[test]
    fn test_missing_references_reject_everything() {
        // No hips at all
        let kpts = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 90.0, 100.0),
            (KeypointIndex::RightShoulder, 110.0, 100.0),
            (KeypointIndex::LeftWrist, 100.0, 150.0),
        ]);
        let result = rule(-100.0, 100.0, 1000.0, WristSelector::Both).validate(&kpts);

        assert!(!result.left.valid);
        assert!(!result.right.valid);
        assert!(!result.shoulders.valid);
        assert_eq!(result.left.message, "Missing reference keypoints");
        assert_eq!(result.right.message, "Missing reference keypoints");
        assert_eq!(result.shoulders.message, "Missing reference keypoints");
        assert!(!result.is_flagged(WristSelector::Both));
    }

    #[test]
    fn test_empty_slice_rejects() {
        let result = rule(-20.0, 30.0, 20.0, WristSelector::Both).validate(&[]);
        assert_eq!(result.left.message, "Missing reference keypoints");
    }

    #[test]
    fn test_hips_above_shoulders_is_invalid_range() {
        let kpts = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 90.0, 200.0),
            (KeypointIndex::RightShoulder, 110.0, 200.0),
            (KeypointIndex::LeftHip, 95.0, 100.0),
            (KeypointIndex::RightHip, 105.0, 100.0),
        ]);
        let result = rule(-100.0, 100.0, 1000.0, WristSelector::Both).validate(&kpts);
        assert_eq!(result.left.message, "Invalid reference range");
        assert_eq!(result.shoulders.message, "Invalid reference range");
        assert!(!result.is_flagged(WristSelector::Both));
    }

    #[test]
    fn test_zero_reference_range_is_invalid() {
        let kpts = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 90.0, 150.0),
            (KeypointIndex::RightShoulder, 110.0, 150.0),
            (KeypointIndex::LeftHip, 95.0, 150.0),
            (KeypointIndex::RightHip, 105.0, 150.0),
        ]);
        let result = rule(-20.0, 30.0, 20.0, WristSelector::Both).validate(&kpts);
        assert_eq!(result.right.message, "Invalid reference range");
    }

    #[test]
    fn test_worked_example_percentages() {
        let mut entries = square_torso();
        entries.push((KeypointIndex::LeftWrist, 100.0, 150.0));
        entries.push((KeypointIndex::RightWrist, 100.0, 150.0));
        let kpts = keypoints_at(&entries);

        let result = rule(40.0, 60.0, 20.0, WristSelector::Both).validate(&kpts);

        // Wrist midway between shoulder and hip level = 50%
        assert!((result.left.vertical_percent - 50.0).abs() < 1e-4);
        assert!((result.right.vertical_percent - 50.0).abs() < 1e-4);
        // Shoulder span 20 px over a 100 px range = 20%
        assert!((result.shoulders.width_percent - 20.0).abs() < 1e-4);

        assert!(result.left.valid);
        assert!(result.right.valid);
        assert!(result.shoulders.valid, "20% is inside [0, 20] inclusive");
        assert!(result.is_flagged(WristSelector::Both));
        assert_eq!(result.left.message, "Valid");
        assert_eq!(result.shoulders.message, "Valid");
    }

    #[test]
    fn test_boundary_values_are_valid() {
        let mut entries = square_torso();
        entries.push((KeypointIndex::LeftWrist, 100.0, 150.0));
        let kpts = keypoints_at(&entries);

        // vertical_percent is exactly 50; both closed bounds include it
        let at_min = rule(50.0, 80.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(at_min.left.valid, "value equal to the minimum must pass");
        let at_max = rule(0.0, 50.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(at_max.left.valid, "value equal to the maximum must pass");
    }

    #[test]
    fn test_widening_the_band_never_invalidates() {
        let mut entries = square_torso();
        entries.push((KeypointIndex::LeftWrist, 100.0, 150.0));
        entries.push((KeypointIndex::RightWrist, 100.0, 150.0));
        let kpts = keypoints_at(&entries);

        let narrow = rule(40.0, 60.0, 20.0, WristSelector::Both).validate(&kpts);
        let wide = rule(30.0, 70.0, 20.0, WristSelector::Both).validate(&kpts);
        assert!(narrow.left.valid && narrow.right.valid);
        assert!(wide.left.valid && wide.right.valid);
    }

    #[test]
    fn test_out_of_band_wrist_message() {
        let mut entries = square_torso();
        // Wrist at hip level = 100%
        entries.push((KeypointIndex::LeftWrist, 100.0, 200.0));
        let kpts = keypoints_at(&entries);

        let result = rule(15.0, 35.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(!result.left.valid);
        assert_eq!(
            result.left.message,
            "vertical position 100.0% outside range [15, 35]"
        );
        assert!(!result.is_flagged(WristSelector::Left));
    }

    #[test]
    fn test_wide_shoulders_blocks_flagging() {
        let kpts = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 50.0, 100.0),
            (KeypointIndex::RightShoulder, 150.0, 100.0),
            (KeypointIndex::LeftHip, 95.0, 200.0),
            (KeypointIndex::RightHip, 105.0, 200.0),
            (KeypointIndex::LeftWrist, 100.0, 150.0),
            (KeypointIndex::RightWrist, 100.0, 150.0),
        ]);
        let result = rule(40.0, 60.0, 20.0, WristSelector::Both).validate(&kpts);

        // Wrists pass but the 100% shoulder span fails the 20% cap
        assert!(result.left.valid && result.right.valid);
        assert!(!result.shoulders.valid);
        assert_eq!(
            result.shoulders.message,
            "Shoulder distance 100.0% outside range [0, 20]"
        );
        assert!(!result.is_flagged(WristSelector::Both));
    }

    #[test]
    fn test_selector_skips_other_wrist() {
        let mut entries = square_torso();
        entries.push((KeypointIndex::LeftWrist, 100.0, 150.0));
        entries.push((KeypointIndex::RightWrist, 100.0, 150.0));
        let kpts = keypoints_at(&entries);

        let result = rule(40.0, 60.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(result.left.valid);
        // The right wrist is never validated under a left-only selector
        assert!(!result.right.valid);
        assert_eq!(result.right.message, "");
        assert_eq!(result.right.vertical_percent, 0.0);
        assert!(result.is_flagged(WristSelector::Left));
    }

    #[test]
    fn test_selected_but_absent_wrist_stays_invalid() {
        let kpts = keypoints_at(&square_torso());
        let result = rule(-100.0, 200.0, 20.0, WristSelector::Both).validate(&kpts);
        assert!(!result.left.valid);
        assert!(!result.right.valid);
        assert_eq!(result.left.message, "");
        assert!(!result.is_flagged(WristSelector::Both));
    }

    #[test]
    fn test_single_present_shoulder_and_hip_suffice() {
        let kpts = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 100.0, 100.0),
            (KeypointIndex::LeftHip, 100.0, 200.0),
            (KeypointIndex::LeftWrist, 100.0, 150.0),
        ]);
        let result = rule(40.0, 60.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(result.left.valid);
        // Single shoulder: zero span, trivially narrow
        assert_eq!(result.shoulders.width_percent, 0.0);
        assert!(result.shoulders.valid);
        assert!(result.is_flagged(WristSelector::Left));
    }

    #[test]
    fn test_horizontal_bound_rejects_outside_shoulders() {
        let mut entries = square_torso();
        // In-band vertically (50%) but 40 px left of the left shoulder
        entries.push((KeypointIndex::LeftWrist, 50.0, 150.0));
        let kpts = keypoints_at(&entries);

        let mut r = rule(40.0, 60.0, 1000.0, WristSelector::Left);
        r.require_horizontal_bound = true;
        let result = r.validate(&kpts);

        assert!(!result.left.valid);
        assert_eq!(result.left.horizontal_valid, Some(false));
        assert_eq!(
            result.left.message,
            "horizontal position outside shoulder boundaries"
        );
    }

    #[test]
    fn test_horizontal_and_vertical_failures_join() {
        let mut entries = square_torso();
        // Out of band vertically (100%) and outside the shoulders
        entries.push((KeypointIndex::LeftWrist, 50.0, 200.0));
        let kpts = keypoints_at(&entries);

        let mut r = rule(15.0, 35.0, 1000.0, WristSelector::Left);
        r.require_horizontal_bound = true;
        let result = r.validate(&kpts);

        assert_eq!(
            result.left.message,
            "vertical position 100.0% outside range [15, 35], horizontal position outside shoulder boundaries"
        );
    }

    #[test]
    fn test_horizontal_bound_disabled_reports_none() {
        let mut entries = square_torso();
        entries.push((KeypointIndex::LeftWrist, 50.0, 150.0));
        let kpts = keypoints_at(&entries);

        let result = rule(40.0, 60.0, 20.0, WristSelector::Left).validate(&kpts);
        assert!(result.left.valid, "x position is ignored without the bound");
        assert_eq!(result.left.horizontal_valid, None);
    }

    #[test]
    fn test_from_config_rejects_unknown_selector() {
        let mut config = ValidationConfig::default();
        config.wrist = "either".to_string();
        assert!(ValidationRule::from_config(&config).is_err());

        config.wrist = "both".to_string();
        let parsed = ValidationRule::from_config(&config).unwrap();
        assert_eq!(parsed.wrist, WristSelector::Both);
        assert_eq!(parsed.vertical_min_percent, -20.0);
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(WristSelector::parse("left"), Some(WristSelector::Left));
        assert_eq!(WristSelector::parse("right"), Some(WristSelector::Right));
        assert_eq!(WristSelector::parse("both"), Some(WristSelector::Both));
        assert_eq!(WristSelector::parse("Both"), None);
    }

    #[test]
    fn test_reference_levels_average_present_keypoints() {
        let kpts = keypoints_at(&square_torso());
        assert_eq!(reference_levels(&kpts), Some((100.0, 200.0)));

        let only_shoulders = keypoints_at(&[
            (KeypointIndex::LeftShoulder, 90.0, 100.0),
            (KeypointIndex::RightShoulder, 110.0, 100.0),
        ]);
        assert_eq!(reference_levels(&only_shoulders), None);
        assert_eq!(reference_levels(&[]), None);
    }
}
