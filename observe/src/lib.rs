//! Local, synchronously readable state on top of a push-based fish runtime.
//!
//! The runtime (see the `pond` crate) pushes state snapshots of fish through
//! callbacks. This crate turns those pushes into latest-value cells that the
//! application can read at any time and await changes of.
//!
//! # Architecture
//!
//! - **One session per process**: [`PondProvider`] opens the session once and
//!   hands out a [`PondContext`]; every observer takes the context
//!   explicitly and fails with a configuration error without one.
//! - **Epoch-guarded cells**: every subscription writes through a writer bound
//!   to an epoch. Identity changes and teardown start a new epoch before the
//!   old subscription is cancelled, so late pushes are dropped.
//! - **Snapshots, not mutation**: each push yields a fresh
//!   `Arc<ObservedFish>`; comparing by pointer tells whether anything changed.
//! - **Value-keyed reconciliation**: [`RegistryObserver`] keeps one member
//!   subscription per distinct property and ignores membership pushes that
//!   are equal by value.
//!
//! # Example: observing a chat room
//!
//! ```rust,ignore
//! let mut provider: PondProvider<&str> = PondProvider::builder()
//!     .placeholder("connecting")
//!     .on_error(|_| Some("Actyx is not reachable"))
//!     .build();
//! provider.mount(&connector).await?;
//!
//! if let Rendered::Children(ctx) = provider.render() {
//!     let mut room = FishObserver::builder(chat_room).name("lobby").mount(&ctx)?;
//!     let snapshot = room.changed().await;
//!     room.feed(ChatCommand::PostMessage { sender, message }).await?;
//! }
//! ```
//!
//! # Modules
//!
//! - `provider`: session singleton and the provider/fallback lifecycle
//! - `context`: the injected session accessor
//! - `fish`: single fish observation with runtime identity changes
//! - `registry`: registry-driven observation of a dynamic set of fish
//! - `stream`: latest value of a swappable stream source
//! - `bridge`: runtime callbacks as streams
//! - `feed`: command dispatch bound to a subscription

mod cell;

pub mod bridge;
pub mod context;
pub mod error;
pub mod feed;
pub mod fish;
pub mod provider;
pub mod registry;
pub mod stream;

pub use context::PondContext;
pub use error::{Error, ErrorKind};
pub use feed::{DispatchPolicy, Feed};
pub use fish::{FishObserver, FishObserverBuilder, ObservedFish, SubscriptionStatus};
pub use provider::{ErrorHandler, PondProvider, PondProviderBuilder, Rendered};
pub use registry::{Members, RegistryObserver};
pub use stream::StreamAdapter;
