pub mod message_log;
pub mod reconnect;
pub mod session;
pub mod synchronizer;

pub use reconnect::ReconnectPolicy;
pub use session::ChatSession;
pub use synchronizer::{SyncPhase, SyncUpdate, Synchronizer};
