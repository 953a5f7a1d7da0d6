pub mod config;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod shared;
pub mod video;
