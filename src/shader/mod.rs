//! WGSL building blocks: blend functions, the define preprocessor and shared chunks.

pub mod blend;
pub mod chunks;
pub mod preprocess;

pub use blend::{BlendFunction, BlendMode};
pub use chunks::KernelSize;
