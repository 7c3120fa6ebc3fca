//! # wlanroam-types
//!
//! Shared vocabulary for the wlanroam roaming engine: MAC addresses,
//! network profiles, BSS snapshots, command identifiers and completion
//! statuses. Everything here is plain data with `serde` derives so an
//! embedder can forward completions and statistics over its own IPC.
//!
//! The engine itself lives in `wlanroam-engine`; this crate deliberately
//! has no behavior beyond parsing, formatting and classification helpers.

#![warn(clippy::all)]

pub mod bss;
pub mod command;
pub mod error;
pub mod mac;
pub mod profile;

pub use bss::{BssDescription, Candidate, CandidateFilter, ParsedBssInfo};
pub use command::{
    CommandId, CommandStatus, DisconnectCause, DisconnectStats, InterfaceId, ReasonCode,
};
pub use error::{EngineError, FrameParseError, Result};
pub use mac::MacAddress;
pub use profile::{Band, Channel, ChannelPolicy, ConnectedProfile, Profile, SecurityProtocol, Ssid};
