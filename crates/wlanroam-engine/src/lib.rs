//! Station/AP roaming control engine.
//!
//! One [`RoamEngine`] owns the association state of every registered
//! interface and serializes the commands that drive it: connects,
//! reassociations, disconnects, per-peer teardowns and AP lifecycle. The
//! embedder supplies the radio-facing side as a [`Platform`] of trait
//! objects and feeds lower-layer acknowledgements back in as
//! [`LinkEvent`]s; results come back through per-interface completion
//! callbacks.
//!
//! The engine is synchronous inside a single lock. Time comes in from the
//! outside through a [`TimeoutScheduler`], so hosts without a runtime (and
//! tests) can drive expiry deterministically.

#![warn(clippy::all)]

mod ap;
pub mod command;
pub mod config;
mod disconnect;
mod engine;
mod join;
pub mod platform;
mod queue;
pub mod roamsync;
pub mod session;
pub mod timer;

pub use command::{CommandOrigin, Priority, RoamCommand};
pub use config::EngineConfig;
pub use engine::{spawn_timeout_pump, CompletionCallback, RoamEngine};
pub use platform::{
    Admission, AdmissionPolicy, BssCodec, CandidateStore, JoinStatus, KeyCache, KeyContext,
    LinkEvent, LinkRequest, Platform, RejectReason, Transport,
};
pub use roamsync::{RoamAuthStatus, RoamSyncEvent};
pub use session::{LinkState, Substate};
pub use timer::{
    ManualTimeoutScheduler, TimeoutEvent, TimeoutHandle, TimeoutScheduler, TokioTimeoutScheduler,
};
