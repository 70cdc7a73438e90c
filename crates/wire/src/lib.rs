//! Wire protocol of the Virtual Integration Bus.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Participants exchange [`WireFrame`]s with the registry; everything that
//! is not connection control travels as an [`Envelope`] carrying a typed
//! [`Message`] plus the sender's service descriptor.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod message;

pub use codec::{decode, encode, read_frame, write_frame, ProtocolError, MAX_FRAME_LEN};
pub use message::{
    DiscoveryEventKind, Envelope, LogMsg, Message, ParticipantAnnouncement, WireFrame,
    PROTOCOL_VERSION,
};
