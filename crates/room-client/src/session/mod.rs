//! Room session orchestration.
//!
//! ```text
//! RoomSessionHandle (UI intents, snapshots)
//!        │ mailbox
//!        ▼
//! RoomSession actor ──► SignalingChannel ──► server
//!        │   ▲                 │ push events, lifecycle
//!        │   └─────────────────┘
//!        ├──► MediaEngine (transports, captures, producers)
//!        └──► consume tasks (one per remote stream, serialized)
//! ```
//!
//! The actor is the only writer of session state. Observers read
//! immutable [`RoomSnapshot`]s.

pub mod actor;
pub mod latch;
pub mod mailbox;
pub mod messages;

mod consume;
mod listeners;

pub use actor::{RoomSession, RoomSessionHandle};
pub use latch::JoinLatch;
pub use mailbox::{MailboxLevel, MailboxMonitor};
pub use messages::{LocalMediaState, RoomSnapshot, SessionState};
