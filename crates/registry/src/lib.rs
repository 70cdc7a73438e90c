// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The registry: central rendezvous broker of a federation.
//!
//! Participants connect over TCP, announce themselves and their services,
//! and every further message is relayed to all other peers. The registry
//! keeps a current view of each peer's service descriptors so that late
//! joiners receive the complete picture in the `Welcome` reply.

mod registry;

pub use registry::{Registry, RegistryError};
