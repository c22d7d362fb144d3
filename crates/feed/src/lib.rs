pub mod archive;
pub mod local;
pub mod normalize;
