pub mod addressing;
pub mod config;
pub mod decoder;
pub mod receiver;
pub mod socket;
pub mod stats;
pub mod vendor;

pub use addressing::{group_address, identify_device};
pub use config::{NetConfig, SocketLayout};
pub use decoder::{DecoderAdapter, DecoderBackend, NullDecoder};
pub use receiver::{DataCallback, MulticastReceiver};
pub use stats::NetworkStats;
pub use vendor::LibraryDecoder;
