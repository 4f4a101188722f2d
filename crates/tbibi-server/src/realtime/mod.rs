//! Realtime chat core.
//!
//! - [`ConnectionRegistry`]: user id to live [`Session`], one per user
//! - [`Session`]: bounded outbound queue and cancellation for a connection
//! - [`reader_pump`] / [`writer_pump`]: the two loops serving a socket
//! - [`MessageRouter`]: validates, optionally archives, and forwards frames
//! - [`SessionLifecycle`]: admits connections and guarantees teardown

pub mod lifecycle;
pub mod message;
pub mod pumps;
pub mod registry;
pub mod router;
pub mod session;

pub use lifecycle::SessionLifecycle;
pub use message::ChatMessage;
pub use pumps::{PumpExit, reader_pump, writer_pump};
pub use registry::ConnectionRegistry;
pub use router::{ArchiveError, MessageArchive, MessageRouter, RouteOutcome, StoreArchive};
pub use session::{EnqueueError, Payload, Session};
