pub mod overlay;
pub mod view_transform;
