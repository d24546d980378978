use crate::registry::{SharedCallback, SubscriberRegistry};
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use pond::{
    CancelSubscription, ConnectivityCallback, ConnectivityStatus, Error, ErrorKind, FishId, Pond,
    PondInfo, PondState, PondStateCallback, StateCallback,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type SharedConnectivity = Arc<dyn Fn(ConnectivityStatus) + Send + Sync>;
type SharedPondState = Arc<dyn Fn(PondState) + Send + Sync>;

/// Scriptable in-process session.
///
/// Tests drive pushes explicitly with [`MockPond::push`] and inspect how many
/// subscriptions the code under test keeps open. Cloning yields another
/// handle to the same session.
#[derive(Clone)]
pub struct MockPond {
    inner: Arc<Inner>,
}

struct Inner {
    node_id: String,
    emit_initial_state: bool,
    retain_cancelled: bool,
    retained: Mutex<Vec<(FishId, SharedCallback)>>,
    registry: SubscriberRegistry,
    states: DashMap<FishId, Value>,
    opened: AtomicUsize,
    cancelled: AtomicUsize,
    commands: Mutex<Vec<(FishId, Value)>>,
    reject_next: AtomicU32,
    disposed: AtomicBool,
    connectivity: Mutex<Option<ConnectivityStatus>>,
    connectivity_listeners: DashMap<u64, SharedConnectivity>,
    pond_state: Mutex<PondState>,
    pond_state_listeners: DashMap<u64, SharedPondState>,
    next_listener: AtomicUsize,
}

impl MockPond {
    /// A session that only pushes states set through [`MockPond::push`].
    pub fn new() -> Self {
        Self::build(false, false)
    }

    /// A session that pushes a fish's initial state as soon as it is observed,
    /// the way the real runtime does for fish without events.
    pub fn with_initial_emission() -> Self {
        Self::build(true, false)
    }

    /// A session that keeps pushing to callbacks after their subscription was
    /// cancelled, modelling a runtime push racing with the cancellation.
    /// Cancellation is still counted and the subscription no longer counts
    /// as live.
    pub fn retaining_cancelled() -> Self {
        Self::build(false, true)
    }

    fn build(emit_initial_state: bool, retain_cancelled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                node_id: uuid::Uuid::new_v4().to_string(),
                emit_initial_state,
                retain_cancelled,
                retained: Mutex::new(Vec::new()),
                registry: SubscriberRegistry::new(),
                states: DashMap::new(),
                opened: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
                commands: Mutex::new(Vec::new()),
                reject_next: AtomicU32::new(0),
                disposed: AtomicBool::new(false),
                connectivity: Mutex::new(None),
                connectivity_listeners: DashMap::new(),
                pond_state: Mutex::new(PondState::default()),
                pond_state_listeners: DashMap::new(),
                next_listener: AtomicUsize::new(0),
            }),
        }
    }

    /// Shared session handle for code that takes `Arc<dyn Pond>`.
    pub fn handle(&self) -> Arc<dyn Pond> {
        Arc::new(self.clone())
    }

    /// Record `state` as the current state of `fish` and deliver it to every
    /// live observer of that fish, in registration-independent order.
    pub fn push(&self, fish: &FishId, state: Value) {
        self.inner.states.insert(fish.clone(), state.clone());
        let mut callbacks = self.inner.registry.callbacks_for(fish);
        if let Ok(retained) = self.inner.retained.lock() {
            callbacks.extend(
                retained
                    .iter()
                    .filter(|(retained_fish, _)| retained_fish == fish)
                    .map(|(_, callback)| Arc::clone(callback)),
            );
        }
        debug!("Pushing state of {} to {} observer(s)", fish, callbacks.len());
        for callback in callbacks {
            callback(state.clone());
        }
    }

    /// Record `state` without notifying anyone; later observers receive it.
    pub fn set_state(&self, fish: &FishId, state: Value) {
        self.inner.states.insert(fish.clone(), state);
    }

    /// Forget the recorded state of `fish`, so later observers wait for the
    /// next push.
    pub fn forget_state(&self, fish: &FishId) {
        self.inner.states.remove(fish);
    }

    /// Make the next `count` calls to `run` fail with `EffectRejected`.
    pub fn reject_next_commands(&self, count: u32) {
        self.inner.reject_next.store(count, Ordering::SeqCst);
    }

    pub fn set_connectivity(&self, status: ConnectivityStatus) {
        if let Ok(mut current) = self.inner.connectivity.lock() {
            *current = Some(status.clone());
        }
        let listeners: Vec<SharedConnectivity> = self
            .inner
            .connectivity_listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(status.clone());
        }
    }

    pub fn set_pond_state(&self, state: PondState) {
        if let Ok(mut current) = self.inner.pond_state.lock() {
            *current = state.clone();
        }
        let listeners: Vec<SharedPondState> = self
            .inner
            .pond_state_listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(state.clone());
        }
    }

    /// Number of observations currently open.
    pub fn live_subscriptions(&self) -> usize {
        self.inner.registry.live_count()
    }

    /// Number of observations currently open for `fish`.
    pub fn live_subscriptions_for(&self, fish: &FishId) -> usize {
        self.inner.registry.live_for(fish)
    }

    /// Opaque identities of the observations open for `fish`, for checking
    /// that a subscription survived unchanged.
    pub fn subscription_ids_for(&self, fish: &FishId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .registry
            .subscription_ids_for(fish)
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Total observations ever opened.
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Total observations ever cancelled.
    pub fn cancelled(&self) -> usize {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Commands accepted so far, in order.
    pub fn commands(&self) -> Vec<(FishId, Value)> {
        self.inner
            .commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn next_listener_id(&self) -> u64 {
        self.inner.next_listener.fetch_add(1, Ordering::SeqCst) as u64
    }
}

impl Default for MockPond {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pond for MockPond {
    fn observe(
        &self,
        fish: &FishId,
        initial_state: Value,
        on_state: StateCallback,
    ) -> CancelSubscription {
        let on_state: SharedCallback = Arc::from(on_state);
        let subscription_id = self
            .inner
            .registry
            .register(fish.clone(), Arc::clone(&on_state));
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened observation {} of {}", subscription_id.as_str(), fish);

        let current = self
            .inner
            .states
            .get(fish)
            .map(|state| state.value().clone());
        match current {
            Some(state) => on_state(state),
            None if self.inner.emit_initial_state => on_state(initial_state),
            None => {}
        }

        let inner = Arc::clone(&self.inner);
        let fish = fish.clone();
        CancelSubscription::new(move || {
            if inner.registry.unregister(&subscription_id) {
                inner.cancelled.fetch_add(1, Ordering::SeqCst);
                if inner.retain_cancelled {
                    if let Ok(mut retained) = inner.retained.lock() {
                        retained.push((fish, on_state));
                    }
                }
                debug!("Cancelled observation {}", subscription_id.as_str());
            } else {
                warn!(
                    "Observation {} cancelled more than once",
                    subscription_id.as_str()
                );
            }
        })
    }

    async fn run(&self, fish: &FishId, command: Value) -> Result<(), Error> {
        if self.is_disposed() {
            return Err(Error::new(ErrorKind::Disposed, "pond has been disposed"));
        }

        let rejected = self
            .inner
            .reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(Error::new(
                ErrorKind::EffectRejected,
                &format!("command for {fish} rejected"),
            ));
        }

        if let Ok(mut commands) = self.inner.commands.lock() {
            commands.push((fish.clone(), command));
        }
        Ok(())
    }

    fn info(&self) -> PondInfo {
        PondInfo {
            node_id: self.inner.node_id.clone(),
        }
    }

    fn node_connectivity(&self, on_status: ConnectivityCallback) -> CancelSubscription {
        let id = self.next_listener_id();
        let listener: SharedConnectivity = Arc::from(on_status);
        self.inner
            .connectivity_listeners
            .insert(id, Arc::clone(&listener));

        let current = self
            .inner
            .connectivity
            .lock()
            .ok()
            .and_then(|status| status.clone());
        if let Some(status) = current {
            listener(status);
        }

        let inner = Arc::clone(&self.inner);
        CancelSubscription::new(move || {
            inner.connectivity_listeners.remove(&id);
        })
    }

    fn pond_state(&self, on_state: PondStateCallback) -> CancelSubscription {
        let id = self.next_listener_id();
        let listener: SharedPondState = Arc::from(on_state);
        self.inner
            .pond_state_listeners
            .insert(id, Arc::clone(&listener));

        let current = self
            .inner
            .pond_state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default();
        listener(current);

        let inner = Arc::clone(&self.inner);
        CancelSubscription::new(move || {
            inner.pond_state_listeners.remove(&id);
        })
    }

    fn dispose(&self) {
        info!("Disposing mock pond {}", self.inner.node_id);
        self.inner.disposed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, StateCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            seen,
            Box::new(move |state| sink.lock().unwrap().push(state)),
        )
    }

    #[test]
    fn test_push_reaches_only_observers_of_that_fish() {
        let pond = MockPond::new();
        let lobby = FishId::of("chat", "lobby", 0);
        let (seen, callback) = recorder();
        let _sub = pond.observe(&lobby, json!([]), callback);

        pond.push(&lobby, json!(["alice: hi"]));
        pond.push(&FishId::of("chat", "general", 0), json!(["bob: yo"]));

        assert_eq!(*seen.lock().unwrap(), vec![json!(["alice: hi"])]);
    }

    #[test]
    fn test_observe_emits_known_state_synchronously() {
        let pond = MockPond::new();
        let lobby = FishId::of("chat", "lobby", 0);
        pond.set_state(&lobby, json!(["alice: hi"]));

        let (seen, callback) = recorder();
        let _sub = pond.observe(&lobby, json!([]), callback);
        assert_eq!(*seen.lock().unwrap(), vec![json!(["alice: hi"])]);
    }

    #[test]
    fn test_initial_emission() {
        let pond = MockPond::with_initial_emission();
        let (seen, callback) = recorder();
        let _sub = pond.observe(&FishId::of("chat", "lobby", 0), json!([]), callback);
        assert_eq!(*seen.lock().unwrap(), vec![json!([])]);
    }

    #[test]
    fn test_cancel_stops_delivery_and_is_counted() {
        let pond = MockPond::new();
        let lobby = FishId::of("chat", "lobby", 0);
        let (seen, callback) = recorder();
        let mut sub = pond.observe(&lobby, json!([]), callback);
        assert_eq!(pond.live_subscriptions(), 1);

        sub.cancel();
        pond.push(&lobby, json!(["late"]));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(pond.live_subscriptions(), 0);
        assert_eq!(pond.opened(), 1);
        assert_eq!(pond.cancelled(), 1);
    }

    #[test]
    fn test_retaining_pond_keeps_delivering_after_cancel() {
        let pond = MockPond::retaining_cancelled();
        let lobby = FishId::of("chat", "lobby", 0);
        let (seen, callback) = recorder();
        let mut sub = pond.observe(&lobby, json!([]), callback);

        sub.cancel();
        pond.push(&lobby, json!(["late"]));

        assert_eq!(*seen.lock().unwrap(), vec![json!(["late"])]);
        assert_eq!(pond.live_subscriptions(), 0);
        assert_eq!(pond.cancelled(), 1);
    }

    #[tokio::test]
    async fn test_run_records_commands_and_rejects_on_request() {
        let pond = MockPond::new();
        let lobby = FishId::of("chat", "lobby", 0);

        pond.reject_next_commands(1);
        let err = pond.run(&lobby, json!({"type": "post"})).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::EffectRejected);

        pond.run(&lobby, json!({"type": "post"})).await.unwrap();
        assert_eq!(pond.commands(), vec![(lobby, json!({"type": "post"}))]);
    }

    #[tokio::test]
    async fn test_run_after_dispose_fails() {
        let pond = MockPond::new();
        pond.dispose();
        let err = pond
            .run(&FishId::of("chat", "lobby", 0), json!(null))
            .await
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Disposed);
    }

    #[test]
    fn test_connectivity_listeners() {
        let pond = MockPond::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut sub = pond.node_connectivity(Box::new(move |s| sink.lock().unwrap().push(s)));

        pond.set_connectivity(ConnectivityStatus::FullyConnected);
        sub.cancel();
        pond.set_connectivity(ConnectivityStatus::NotConnected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectivityStatus::FullyConnected]
        );
    }
}
