use crate::context::PondContext;
use crate::error::Error;
use log::*;
use pond::{AppManifest, ConnectionOpts, Connector, Pond, PondOptions};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The one session of this process. Set by the first successful mount and
/// kept for the lifetime of the process.
static SESSION: Mutex<Option<Arc<dyn Pond>>> = Mutex::new(None);

fn session() -> MutexGuard<'static, Option<Arc<dyn Pond>>> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Callback deciding what to show after the session could not be opened.
pub type ErrorHandler<V> = Box<dyn Fn(&Error) -> Option<V> + Send + Sync>;

enum ProviderState<V> {
    Pending,
    Ready(PondContext),
    Failed(Option<V>),
}

/// What the provider shows at the moment.
pub enum Rendered<'a, V> {
    /// The session is not ready (yet). Carries the placeholder view, if any.
    Placeholder(Option<&'a V>),
    /// The session is ready; hand this context to the application.
    Children(PondContext),
    /// Opening the session failed and the error handler supplied a view.
    Fallback(&'a V),
}

/// Opens the process-wide session and provides it to the application.
///
/// `V` is whatever the embedding application renders while waiting or after
/// a failure (a widget, a string, a status enum).
pub struct PondProvider<V> {
    manifest: AppManifest,
    connection_opts: ConnectionOpts,
    opts: PondOptions,
    placeholder: Option<V>,
    on_error: Option<ErrorHandler<V>>,
    state: ProviderState<V>,
}

pub struct PondProviderBuilder<V> {
    manifest: Option<AppManifest>,
    connection_opts: Option<ConnectionOpts>,
    opts: Option<PondOptions>,
    placeholder: Option<V>,
    on_error: Option<ErrorHandler<V>>,
}

impl<V> PondProviderBuilder<V> {
    pub fn manifest(mut self, manifest: AppManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn connection_opts(mut self, connection_opts: ConnectionOpts) -> Self {
        self.connection_opts = Some(connection_opts);
        self
    }

    pub fn opts(mut self, opts: PondOptions) -> Self {
        self.opts = Some(opts);
        self
    }

    /// View shown while the session is being opened.
    pub fn placeholder(mut self, placeholder: V) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Called when the session cannot be opened. Returning a view renders it
    /// instead of the application.
    pub fn on_error(mut self, on_error: impl Fn(&Error) -> Option<V> + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn build(self) -> PondProvider<V> {
        if self.on_error.is_none() {
            warn!(
                "Not providing an on_error handler is deprecated. Add a mechanism \
                 (e.g. reload) for handling connection problems with Actyx"
            );
        }

        PondProvider {
            manifest: self.manifest.unwrap_or_default(),
            connection_opts: self.connection_opts.unwrap_or_default(),
            opts: self.opts.unwrap_or_default(),
            placeholder: self.placeholder,
            on_error: self.on_error,
            state: ProviderState::Pending,
        }
    }
}

impl<V> PondProvider<V> {
    pub fn builder() -> PondProviderBuilder<V> {
        PondProviderBuilder {
            manifest: None,
            connection_opts: None,
            opts: None,
            placeholder: None,
            on_error: None,
        }
    }

    /// Open the session, or reuse the one opened earlier in this process.
    ///
    /// Returns `Err` only when opening failed and no error handler was
    /// configured; a handled failure leaves the provider showing the
    /// handler's view (or the placeholder when the handler returned none).
    pub async fn mount(&mut self, connector: &dyn Connector) -> Result<(), Error> {
        if matches!(self.state, ProviderState::Ready(_)) {
            return Ok(());
        }

        if let Some(existing) = session().clone() {
            warn!("Reusing existing pond session. Initialize the PondProvider only once at top level");
            self.state = ProviderState::Ready(PondContext::new(existing));
            return Ok(());
        }

        info!(
            "Opening pond session for {} ({} {})",
            self.manifest.app_id, self.manifest.display_name, self.manifest.version
        );

        match connector
            .connect(&self.manifest, &self.connection_opts, &self.opts)
            .await
        {
            Ok(pond) => {
                let pond = {
                    let mut session = session();
                    match session.as_ref() {
                        Some(existing) => {
                            warn!("Another provider opened the pond session first; disposing the duplicate");
                            pond.dispose();
                            Arc::clone(existing)
                        }
                        None => {
                            *session = Some(Arc::clone(&pond));
                            pond
                        }
                    }
                };
                info!("Pond session ready (node {})", pond.info().node_id);
                self.state = ProviderState::Ready(PondContext::new(pond));
                Ok(())
            }
            Err(e) => {
                let err = Error::from(e);
                error!("Failed to open pond session: {err}");
                match &self.on_error {
                    Some(on_error) => {
                        self.state = ProviderState::Failed(on_error(&err));
                        Ok(())
                    }
                    None => Err(err),
                }
            }
        }
    }

    pub fn render(&self) -> Rendered<'_, V> {
        match &self.state {
            ProviderState::Ready(ctx) => Rendered::Children(ctx.clone()),
            ProviderState::Failed(Some(view)) => Rendered::Fallback(view),
            ProviderState::Pending | ProviderState::Failed(None) => {
                Rendered::Placeholder(self.placeholder.as_ref())
            }
        }
    }

    /// Context for the application, once the session is ready.
    pub fn context(&self) -> Option<PondContext> {
        match &self.state {
            ProviderState::Ready(ctx) => Some(ctx.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ProviderState::Ready(_))
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.manifest
    }

    /// Forget the process-wide session so the next mount opens a new one.
    #[doc(hidden)]
    pub fn reset_session() {
        session().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use testing_tools::{MockConnector, MockPond};
    use tokio::sync::Barrier;

    /// Holds every connect until `parties` of them are in flight, so their
    /// sessions come back after all providers have checked the singleton.
    struct RacingConnector {
        opened: Mutex<Vec<MockPond>>,
        gate: Barrier,
    }

    impl RacingConnector {
        fn new(parties: usize) -> Self {
            Self {
                opened: Mutex::new(Vec::new()),
                gate: Barrier::new(parties),
            }
        }

        fn opened(&self) -> Vec<MockPond> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for RacingConnector {
        async fn connect(
            &self,
            _manifest: &AppManifest,
            _connection_opts: &ConnectionOpts,
            _opts: &PondOptions,
        ) -> Result<Arc<dyn Pond>, pond::Error> {
            let pond = MockPond::new();
            self.opened.lock().unwrap().push(pond.clone());
            self.gate.wait().await;
            Ok(pond.handle())
        }
    }

    // The session is process-wide; provider tests must not interleave.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        PondProvider::<()>::reset_session();
        guard
    }

    #[tokio::test]
    async fn test_mount_provides_context() {
        let _serial = serial();
        let connector = MockConnector::new(MockPond::new());
        let mut provider: PondProvider<&str> = PondProvider::builder()
            .placeholder("loading")
            .on_error(|_| Some("failed"))
            .build();

        assert!(matches!(provider.render(), Rendered::Placeholder(Some(&"loading"))));
        provider.mount(&connector).await.unwrap();

        assert!(provider.is_ready());
        match provider.render() {
            Rendered::Children(ctx) => {
                assert_eq!(ctx.info().unwrap(), connector.pond().info())
            }
            _ => panic!("expected children"),
        }
        assert_eq!(connector.last_manifest(), Some(AppManifest::default()));
    }

    #[tokio::test]
    async fn test_second_mount_reuses_session() {
        let _serial = serial();
        let connector = MockConnector::new(MockPond::new());

        let mut first: PondProvider<()> = PondProvider::builder().on_error(|_| None).build();
        first.mount(&connector).await.unwrap();
        let mut second: PondProvider<()> = PondProvider::builder().on_error(|_| None).build();
        second.mount(&connector).await.unwrap();

        assert_eq!(connector.connects(), 1);
        assert_eq!(
            second.context().unwrap().info().unwrap(),
            first.context().unwrap().info().unwrap()
        );
    }

    #[tokio::test]
    async fn test_failure_renders_handler_view() {
        let _serial = serial();
        let connector = MockConnector::failing("Is Actyx running?");
        let mut provider: PondProvider<String> = PondProvider::builder()
            .on_error(|e| Some(format!("offline: {e}")))
            .build();

        provider.mount(&connector).await.unwrap();

        assert!(!provider.is_ready());
        match provider.render() {
            Rendered::Fallback(view) => assert!(view.contains("Is Actyx running?")),
            _ => panic!("expected fallback"),
        }
    }

    #[tokio::test]
    async fn test_handler_without_view_keeps_placeholder() {
        let _serial = serial();
        let connector = MockConnector::failing("down");
        let mut provider: PondProvider<&str> = PondProvider::builder()
            .placeholder("loading")
            .on_error(|_| None)
            .build();

        provider.mount(&connector).await.unwrap();
        assert!(matches!(provider.render(), Rendered::Placeholder(Some(&"loading"))));
        assert!(provider.context().is_none());
    }

    #[tokio::test]
    async fn test_failure_without_handler_is_escalated() {
        let _serial = serial();
        let connector = MockConnector::failing("down");
        let mut provider: PondProvider<()> = PondProvider::builder().build();

        let err = provider.mount(&connector).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_custom_manifest_is_passed_to_connector() {
        let _serial = serial();
        let connector = MockConnector::new(MockPond::new());
        let manifest = AppManifest {
            app_id: "com.example.chat".to_string(),
            display_name: "Chat".to_string(),
            version: "1.2.3".to_string(),
            signature: None,
        };
        let mut provider: PondProvider<()> = PondProvider::builder()
            .manifest(manifest.clone())
            .on_error(|_| None)
            .build();

        provider.mount(&connector).await.unwrap();
        assert_eq!(connector.last_manifest(), Some(manifest));
    }

    #[tokio::test]
    async fn test_losing_a_connect_race_disposes_the_duplicate() {
        let _serial = serial();
        let connector = RacingConnector::new(2);
        let mut first: PondProvider<()> = PondProvider::builder().on_error(|_| None).build();
        let mut second: PondProvider<()> = PondProvider::builder().on_error(|_| None).build();

        let (a, b) = tokio::join!(first.mount(&connector), second.mount(&connector));
        a.unwrap();
        b.unwrap();

        let opened = connector.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened.iter().filter(|pond| pond.is_disposed()).count(), 1);
        let kept = opened.iter().find(|pond| !pond.is_disposed()).unwrap();
        assert_eq!(first.context().unwrap().info().unwrap(), kept.info());
        assert_eq!(second.context().unwrap().info().unwrap(), kept.info());
    }
}
