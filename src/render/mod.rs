pub mod overlay;
pub mod skeleton;
pub mod window;

pub use minifb::Key;
pub use skeleton::SKELETON_CONNECTIONS;
pub use window::MinifbRenderer;
