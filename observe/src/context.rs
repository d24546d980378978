use crate::error::{missing_provider, Error};
use pond::{
    CancelSubscription, ConnectivityCallback, Pond, PondInfo, PondStateCallback,
};
use std::fmt;
use std::sync::Arc;

/// Read-only access to the session, handed down explicitly to every observer.
///
/// A context obtained from a mounted [`PondProvider`](crate::PondProvider)
/// carries the session; [`PondContext::detached`] models code running outside
/// any provider and fails on every access.
#[derive(Clone, Default)]
pub struct PondContext {
    pond: Option<Arc<dyn Pond>>,
}

impl PondContext {
    /// Wrap an existing session. Applications normally obtain their context
    /// from a mounted provider instead.
    pub fn new(pond: Arc<dyn Pond>) -> Self {
        Self { pond: Some(pond) }
    }

    pub fn detached() -> Self {
        Self { pond: None }
    }

    /// The session, or a `Configuration` error when no provider is in scope.
    pub fn pond(&self) -> Result<Arc<dyn Pond>, Error> {
        self.pond.clone().ok_or_else(missing_provider)
    }

    pub fn is_provided(&self) -> bool {
        self.pond.is_some()
    }

    pub fn info(&self) -> Result<PondInfo, Error> {
        Ok(self.pond()?.info())
    }

    pub fn node_connectivity(
        &self,
        on_status: ConnectivityCallback,
    ) -> Result<CancelSubscription, Error> {
        Ok(self.pond()?.node_connectivity(on_status))
    }

    pub fn pond_state(&self, on_state: PondStateCallback) -> Result<CancelSubscription, Error> {
        Ok(self.pond()?.pond_state(on_state))
    }
}

impl fmt::Debug for PondContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PondContext")
            .field("provided", &self.is_provided())
            .finish()
    }
}
