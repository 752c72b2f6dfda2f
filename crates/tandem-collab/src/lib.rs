//! Tandem Collab — broadcast-based multi-writer synchronization
//!
//! Sessions coordinate only through an injected pub/sub transport: local
//! apply first, then broadcast, with self-echo suppression on receive.
//! At-least-once, ordered per (publisher, topic) pair only, last applier
//! wins by arrival order. Deliberately no CRDT/OT merge and no sequencer.

pub mod channel;
pub mod message;
pub mod presence;
pub mod transport;

pub use channel::{ChannelError, CollaborationChannel, PeerCursor, Subscriptions};
pub use message::{
    apply_change, change_topic, cursor_topic, presence_topic, Change, ChangeEnvelope, CursorFrame,
    PeerInfo, PresenceDiff,
};
pub use presence::{MemoryPresence, Presence};
pub use transport::{MemoryBus, Transport};
