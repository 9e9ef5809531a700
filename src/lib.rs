pub mod archive;
pub mod capture;
pub mod config;
pub mod gallery;
pub mod pose;
pub mod posture;
pub mod render;
pub mod vlm;
