pub mod clock;
pub mod errors;
pub mod events;
pub mod ids;
pub mod link;
pub mod mailbox;

pub use clock::{Clock, SystemClock};
pub use errors::BridgeError;
pub use events::{ClientEvent, ServerEvent};
pub use ids::SubscriberId;
pub use link::LinkState;
pub use mailbox::StatusMailbox;
