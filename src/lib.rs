//! Glitch-free local state for applications built on an Actyx Pond.
//!
//! This crate ties the workspace together: the `pond` client interface, the
//! `observe` adapters, and the `service` configuration and logging. Most
//! applications only need this crate:
//!
//! ```rust,ignore
//! let config = fish_observer_rs::init()?;
//!
//! let mut provider: PondProvider<&str> = fish_observer_rs::provider_builder(&config)
//!     .on_error(|_| Some("Actyx is not reachable"))
//!     .build();
//! provider.mount(&connector).await?;
//! ```

use dotenvy::dotenv;
use log::*;
use std::ffi::OsString;

pub use observe::bridge;
pub use observe::{
    DispatchPolicy, Error, ErrorKind, Feed, FishObserver, FishObserverBuilder, Members,
    ObservedFish, PondContext, PondProvider, PondProviderBuilder, RegistryObserver, Rendered,
    StreamAdapter, SubscriptionStatus,
};
pub use pond::{
    AppManifest, CancelSubscription, ConnectionOpts, ConnectivityStatus, Connector, Fish,
    FishId, Pond, PondInfo, PondOptions, PondState,
};
pub use service::config::Config;
pub use service::logging::Logger;

/// Load `.env` and parse the process arguments.
pub fn load_config() -> Config {
    Config::new()
}

/// Load `.env` and parse `args` instead of the process arguments.
pub fn load_config_from<I, T>(args: I) -> Result<Config, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    dotenv().ok();
    <Config as clap::Parser>::try_parse_from(args)
}

/// Load the configuration from `.env` and the process arguments, then install
/// the global logger. Call once at startup.
pub fn init() -> Result<Config, SetLoggerError> {
    start(load_config())
}

/// Install the global logger for an already loaded configuration.
pub fn start(config: Config) -> Result<Config, SetLoggerError> {
    Logger::init_logger(&config)?;
    info!(
        "Logging at {} for {} {}",
        config.log_level_filter, config.app_id, config.app_version
    );
    Ok(config)
}

/// A provider builder preset with the configured manifest and connection
/// target.
pub fn provider_builder<V>(config: &Config) -> PondProviderBuilder<V> {
    let manifest = config.manifest();
    if config.requires_signature() && manifest.signature.is_none() {
        warn!(
            "App ID {} is outside com.example. and no signature is configured",
            manifest.app_id
        );
    }
    debug!(
        "Provider for {} targeting {:?}",
        manifest.app_id,
        config.connection_opts()
    );

    PondProvider::builder()
        .manifest(manifest)
        .connection_opts(config.connection_opts())
}

/// Dispatch policy for observers, as configured.
pub fn dispatch_policy(config: &Config) -> DispatchPolicy {
    DispatchPolicy::retrying(config.dispatch_max_attempts)
}
