use crate::pond::MockPond;
use async_trait::async_trait;
use log::*;
use pond::{AppManifest, ConnectionOpts, Connector, Error, ErrorKind, Pond, PondOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Connector that hands out one [`MockPond`] or fails with a fixed message.
pub struct MockConnector {
    pond: MockPond,
    failure: Option<String>,
    connects: AtomicUsize,
    last_manifest: Mutex<Option<AppManifest>>,
}

impl MockConnector {
    pub fn new(pond: MockPond) -> Self {
        Self {
            pond,
            failure: None,
            connects: AtomicUsize::new(0),
            last_manifest: Mutex::new(None),
        }
    }

    /// A connector whose every attempt fails with `ErrorKind::Connection`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(MockPond::new())
        }
    }

    pub fn pond(&self) -> &MockPond {
        &self.pond
    }

    /// Number of connection attempts made so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_manifest(&self) -> Option<AppManifest> {
        self.last_manifest
            .lock()
            .ok()
            .and_then(|manifest| manifest.clone())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        manifest: &AppManifest,
        connection_opts: &ConnectionOpts,
        _opts: &PondOptions,
    ) -> Result<Arc<dyn Pond>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_manifest.lock() {
            *last = Some(manifest.clone());
        }
        debug!(
            "Mock connect for {} ({:?})",
            manifest.app_id, connection_opts
        );

        match &self.failure {
            Some(message) => Err(Error::new(ErrorKind::Connection, message)),
            None => Ok(self.pond.handle()),
        }
    }
}
