pub mod backoff;
pub mod config;
pub mod decode;
pub mod link;

pub use backoff::BackoffPolicy;
pub use config::DeviceConfig;
pub use link::DeviceLink;
