pub mod detector;
pub mod keypoint;
pub mod region;

pub use detector::{Detection, PoseDetector};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use region::{BBox, ProcessRegion};
