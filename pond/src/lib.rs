//! Client interface to the Pond runtime.
//!
//! This crate describes the narrow surface the observation adapters need from
//! the event-sourced actor store. It contains no event sourcing logic itself:
//! the runtime behind the [`Pond`] trait owns persistence, replication and
//! state reduction.
//!
//! # Architecture
//!
//! - **FishId / Fish**: identity of one concrete fish and its declared initial state
//! - **Pond**: an open session (observe, run commands, auxiliary queries)
//! - **Connector**: opens a session from a manifest and connection options
//! - **CancelSubscription**: RAII token returned by every push-based query
//!
//! Fish state and commands cross this boundary as `serde_json::Value`, so the
//! trait stays object safe and the runtime needs no knowledge of the
//! application's Rust types.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod error;
pub mod fish;
pub mod session;
pub mod subscription;

pub use error::{Error, ErrorKind};
pub use fish::{Fish, FishId};
pub use session::{AppManifest, ConnectionOpts, ConnectivityStatus, PondInfo, PondOptions, PondState};
pub use subscription::CancelSubscription;

/// Callback invoked with every state the runtime computes for an observed fish.
pub type StateCallback = Box<dyn Fn(Value) + Send + Sync>;

/// Callback invoked with connectivity updates of the local node.
pub type ConnectivityCallback = Box<dyn Fn(ConnectivityStatus) + Send + Sync>;

/// Callback invoked with internal state changes of the pond.
pub type PondStateCallback = Box<dyn Fn(PondState) + Send + Sync>;

/// An open session with the runtime.
///
/// Callbacks may be invoked synchronously from inside the registering call
/// (the runtime emits the current state right away when it has one) and from
/// any thread afterwards. No callback of a subscription is invoked after its
/// [`CancelSubscription`] has been cancelled.
#[async_trait]
pub trait Pond: Send + Sync {
    /// Observe the state of `fish`. `initial_state` is the state the fish
    /// starts from before any event has been applied.
    fn observe(&self, fish: &FishId, initial_state: Value, on_state: StateCallback)
        -> CancelSubscription;

    /// Ask the runtime to apply `command` to `fish`. Resolves once the runtime
    /// has durably accepted the resulting effect; the observed state may lag.
    async fn run(&self, fish: &FishId, command: Value) -> Result<(), Error>;

    /// Static information about this session.
    fn info(&self) -> PondInfo;

    /// Push connectivity updates of the local node.
    fn node_connectivity(&self, on_status: ConnectivityCallback) -> CancelSubscription;

    /// Push internal pond state updates (hydration, commands in flight).
    fn pond_state(&self, on_state: PondStateCallback) -> CancelSubscription;

    /// Release the session. Further calls to [`Pond::run`] fail with
    /// [`ErrorKind::Disposed`].
    fn dispose(&self);
}

/// Opens sessions with the runtime.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        manifest: &AppManifest,
        connection_opts: &ConnectionOpts,
        opts: &PondOptions,
    ) -> Result<Arc<dyn Pond>, Error>;
}
