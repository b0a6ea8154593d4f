//! # Stowage Protocol
//!
//! The framed binary wire protocol spoken between Stowage clients and the
//! server.
//!
//! Layers, outermost first:
//! - frame: `u32 length | payload`, capped at [`MAX_FRAME_LEN`]
//! - [`Message`]: magic byte, version, flags and type around a payload
//! - [`Command`] / [`Response`]: the request and reply bodies
//!
//! Every multi-byte integer on the wire is big-endian. Decoders return
//! zero-copy slices of the frame for payloads and never allocate beyond
//! declared sizes.
//!
//! ## Example
//!
//! ```rust
//! use stowage_protocol::{ids, Command, Message, MessageType};
//!
//! let ping = Command::system(ids::PING, Vec::new());
//! let msg = ping.into_message().unwrap();
//! let decoded = Message::decode(&msg.encode()).unwrap();
//! assert_eq!(decoded.message_type, MessageType::Command);
//! assert_eq!(Command::decode(&decoded.payload).unwrap(), ping);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod delivery;
mod error;
mod frame;
pub mod ids;
mod message;
mod payload;
mod pool;
mod status;

pub use command::{Command, Response};
pub use delivery::{listener_key, BrokerDelivery};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{checked_len, read_frame, write_frame, MAX_FRAME_LEN};
pub use message::{Message, MessageType, HEADER_LEN, MAGIC, PROTOCOL_VERSION, SUPPORTED_VERSIONS};
pub use payload::{value_payload, PayloadReader, PayloadWriter};
pub use pool::{BufferPool, INITIAL_CAPACITY, MAX_POOLED_CAPACITY};
pub use status::Status;
