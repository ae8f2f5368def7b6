pub mod hub;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;

pub use hub::BroadcastHub;
pub use registry::{Registration, SubscriberRegistry};
pub use server::{start, ServerConfig, ServerHandle};
pub use session::SessionTiming;
pub use sink::{MemorySink, OutputSink, StdoutSink};
