//! # beacon-protocol
//!
//! Wire contract definitions for the Beacon realtime hub.
//!
//! The transport is a thin event-name/payload multiplexer, so the tagged
//! event enums in this crate *are* the wire contract: every frame on the
//! wire is a JSON object of the form `{"event": "...", "data": {...}}`.
//!
//! ## Event surface
//!
//! - `join` / `register` - Bind a connection to a user
//! - `joinInstitutionRoom` - Subscribe to an institution's queue updates
//! - `newToken` / `startProcessing` / `completeToken` - Queue-ticket lifecycle
//! - `getCurrentProcessingTokens` - Ack-style processing snapshot
//! - `sendMessage` / `sendNotification` - Directed chat and notifications
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode(r#"{"event":"join","data":{"userId":"u1"}}"#).unwrap();
//! assert!(matches!(event, ClientEvent::Join { .. }));
//! ```

pub mod codec;
pub mod events;
pub mod types;

pub use codec::{decode, encode, ProtocolError};
pub use events::{ClientEvent, ServerEvent};
pub use types::{PartyKind, PresenceStatus, Ticket, UserIdentity};
