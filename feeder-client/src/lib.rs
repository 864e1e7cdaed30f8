//! Network client for a multicast-discovered feeding dispenser.
//!
//! The feeder announces its TCP port over a well-known multicast group;
//! once discovered, every operation is a short plaintext exchange over
//! a fresh connection. This crate is the protocol core only, consumed
//! as a library by a host application.

pub mod discovery;
pub mod error;
pub mod session;

pub use discovery::{DiscoveryState, Endpoint};
pub use error::ClientError;
pub use session::{FeederClient, SubscriptionId};

pub use feeder_proto as proto;
