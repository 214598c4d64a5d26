pub mod point;
pub mod settings;
pub mod pipeline;
pub mod buffer;

pub use point::LaserPoint;
pub use settings::{LaserQuality, LaserSettings};
pub use pipeline::{DeviceFrames, PointPipeline};
pub use buffer::DevicePointBuffer;
