pub mod config;
pub mod registry;
pub mod status;
pub mod system;

pub use config::{load_settings, save_settings};
pub use registry::DeviceRegistry;
pub use status::{DeviceStatus, StatusReport, StatusWarning};
pub use system::BeamLinkSystem;
