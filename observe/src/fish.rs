use crate::cell::LatestCell;
use crate::context::PondContext;
use crate::error::{stale_dispatch, Error};
use crate::feed::{DispatchPolicy, Feed};
use async_stream::stream;
use futures::Stream;
use log::*;
use pond::{CancelSubscription, Fish, FishId, Pond};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Latest observed state of one fish, with the capability to command it.
///
/// `props` is what the fish was made from: the name for a single fish, the
/// registry property for registry members. A fresh value is created for
/// every push, so `Arc::ptr_eq` on two snapshots tells whether anything
/// changed.
pub struct ObservedFish<S, C, P = String> {
    pub state: S,
    pub props: P,
    dispatch: Feed<C>,
}

impl<S, C, P> ObservedFish<S, C, P> {
    pub(crate) fn new(state: S, props: P, dispatch: Feed<C>) -> Self {
        Self {
            state,
            props,
            dispatch,
        }
    }

    pub fn fish_id(&self) -> &FishId {
        self.dispatch.fish_id()
    }

    /// Dispatch handle bound to this snapshot's fish.
    pub fn feeder(&self) -> &Feed<C> {
        &self.dispatch
    }
}

impl<S, C: Serialize, P> ObservedFish<S, C, P> {
    pub async fn feed(&self, command: C) -> Result<(), Error> {
        self.dispatch.feed(command).await
    }
}

impl<S: fmt::Debug, C, P: fmt::Debug> fmt::Debug for ObservedFish<S, C, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObservedFish")
            .field("fish", self.fish_id())
            .field("props", &self.props)
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No name set; nothing is observed.
    Unsubscribed,
    /// Observing, waiting for the first state of the current fish.
    Subscribing,
    /// A snapshot of the current fish is available.
    Subscribed,
}

type Snapshot<S, C> = Option<Arc<ObservedFish<S, C>>>;
type MakeFish<S, C> = Box<dyn Fn(&str) -> Fish<S, C> + Send + Sync>;

struct ActiveSubscription<C> {
    cancel: CancelSubscription,
    live: Arc<AtomicBool>,
    feed: Feed<C>,
}

/// Observes one fish, chosen by name, and keeps its latest state.
///
/// The fish definition is supplied as a function from name to [`Fish`]; the
/// name can be set, changed and cleared at any time. Changing it cancels the
/// old subscription before the new one is opened.
///
/// ```rust,ignore
/// let mut chat = FishObserver::new(&ctx, chat_room, Some("lobby".to_string()))?;
/// chat.changed().await;
/// if let Some(room) = chat.current() {
///     room.feed(ChatCommand::PostMessage { sender, message }).await?;
/// }
/// chat.set_name("general");
/// ```
pub struct FishObserver<S, C> {
    pond: Arc<dyn Pond>,
    make_fish: MakeFish<S, C>,
    name: Option<String>,
    active: Option<ActiveSubscription<C>>,
    cell: LatestCell<Snapshot<S, C>>,
    receiver: watch::Receiver<Snapshot<S, C>>,
    last_error: Arc<Mutex<Option<Error>>>,
    policy: DispatchPolicy,
    eager_initial_state: bool,
}

pub struct FishObserverBuilder<S, C> {
    make_fish: MakeFish<S, C>,
    name: Option<String>,
    policy: DispatchPolicy,
    eager_initial_state: bool,
}

impl<S, C> FishObserverBuilder<S, C>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    C: Serialize + Send + Sync + 'static,
{
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Expose the fish's declared initial state as soon as a name is set,
    /// instead of waiting for the runtime's first push.
    pub fn eager_initial_state(mut self, eager: bool) -> Self {
        self.eager_initial_state = eager;
        self
    }

    pub fn mount(self, ctx: &PondContext) -> Result<FishObserver<S, C>, Error> {
        let pond = ctx.pond()?;
        let cell = LatestCell::new(None);
        let receiver = cell.subscribe();
        let mut observer = FishObserver {
            pond,
            make_fish: self.make_fish,
            name: None,
            active: None,
            cell,
            receiver,
            last_error: Arc::new(Mutex::new(None)),
            policy: self.policy,
            eager_initial_state: self.eager_initial_state,
        };
        if let Some(name) = self.name {
            observer.subscribe(name);
        }
        Ok(observer)
    }
}

impl<S, C> FishObserver<S, C>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    C: Serialize + Send + Sync + 'static,
{
    pub fn builder(
        make_fish: impl Fn(&str) -> Fish<S, C> + Send + Sync + 'static,
    ) -> FishObserverBuilder<S, C> {
        FishObserverBuilder {
            make_fish: Box::new(make_fish),
            name: None,
            policy: DispatchPolicy::default(),
            eager_initial_state: false,
        }
    }

    /// Observe the fish `make_fish(name)`, or nothing until a name is set.
    pub fn new(
        ctx: &PondContext,
        make_fish: impl Fn(&str) -> Fish<S, C> + Send + Sync + 'static,
        name: Option<String>,
    ) -> Result<Self, Error> {
        let mut builder = Self::builder(make_fish);
        builder.name = name;
        builder.mount(ctx)
    }

    /// Observe the fish with `name` instead. Setting the current name again
    /// changes nothing.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name.as_deref() == Some(name.as_str()) {
            return;
        }
        self.subscribe(name);
    }

    /// Stop observing; the snapshot is cleared.
    pub fn clear_name(&mut self) {
        self.teardown();
        self.name = None;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn status(&self) -> SubscriptionStatus {
        match (&self.name, self.cell.get()) {
            (None, _) => SubscriptionStatus::Unsubscribed,
            (Some(_), None) => SubscriptionStatus::Subscribing,
            (Some(_), Some(_)) => SubscriptionStatus::Subscribed,
        }
    }

    /// The latest snapshot of the current fish.
    pub fn current(&self) -> Option<Arc<ObservedFish<S, C>>> {
        self.cell.get()
    }

    /// Wait until the snapshot changes and return the new one (`None` after
    /// the fish was cleared or changed).
    ///
    /// A push that cannot be decoded also wakes this, returning the unchanged
    /// snapshot; the error is available from [`FishObserver::take_error`].
    pub async fn changed(&mut self) -> Option<Arc<ObservedFish<S, C>>> {
        // The cell owns a sender for as long as `self` lives.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }

    /// Receiver of snapshot changes, for consumers living in another task.
    pub fn watch(&self) -> watch::Receiver<Option<Arc<ObservedFish<S, C>>>> {
        self.cell.subscribe()
    }

    /// Every snapshot from now on, starting with the current one if any.
    /// Each snapshot is yielded once.
    pub fn stream(&self) -> impl Stream<Item = Arc<ObservedFish<S, C>>> + Send + 'static {
        let mut receiver = self.cell.subscribe();
        stream! {
            let mut last: Option<Arc<ObservedFish<S, C>>> = None;
            loop {
                let next = receiver.borrow_and_update().clone();
                if let Some(snapshot) = next {
                    if !last.as_ref().is_some_and(|last| Arc::ptr_eq(last, &snapshot)) {
                        last = Some(Arc::clone(&snapshot));
                        yield snapshot;
                    }
                }
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Dispatch `command` to the currently observed fish.
    pub async fn feed(&self, command: C) -> Result<(), Error> {
        match &self.active {
            Some(active) => active.feed.feed(command).await,
            None => Err(stale_dispatch("no fish")),
        }
    }

    /// The last state push that could not be decoded, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn subscribe(&mut self, name: String) {
        self.teardown();

        let fish = (self.make_fish)(&name);
        let fish_id = fish.id().clone();
        let live = Arc::new(AtomicBool::new(true));
        let feed = Feed::new(
            Arc::clone(&self.pond),
            fish_id.clone(),
            Arc::clone(&live),
            self.policy,
        );

        let initial = self.eager_initial_state.then(|| {
            Arc::new(ObservedFish::new(
                fish.initial_state().clone(),
                name.clone(),
                feed.clone(),
            ))
        });
        let writer = self.cell.next_epoch(initial);

        let initial_state = match fish.initial_state_json() {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to encode initial state of {fish_id}: {e}");
                Value::Null
            }
        };

        debug!("Subscribing to {fish_id}");
        let props = name.clone();
        let snapshot_feed = feed.clone();
        let last_error = Arc::clone(&self.last_error);
        let callback_fish = fish_id.clone();
        let cancel = self.pond.observe(
            &fish_id,
            initial_state,
            Box::new(move |state| match serde_json::from_value::<S>(state) {
                Ok(state) => {
                    let snapshot =
                        ObservedFish::new(state, props.clone(), snapshot_feed.clone());
                    if !writer.write(Some(Arc::new(snapshot))) {
                        trace!("Discarded state of {callback_fish} after teardown");
                    }
                }
                Err(e) if writer.is_current() => {
                    error!("Failed to decode state of {callback_fish}: {e}");
                    *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.into());
                    writer.notify();
                }
                Err(_) => {}
            }),
        );

        self.name = Some(name);
        self.active = Some(ActiveSubscription { cancel, live, feed });
    }
}

impl<S, C> FishObserver<S, C> {
    /// Invalidate pending pushes first, then cancel, so nothing lands after
    /// this returns.
    fn teardown(&mut self) {
        self.cell.close(None);
        if let Some(mut active) = self.active.take() {
            active.live.store(false, Ordering::SeqCst);
            active.cancel.cancel();
            debug!("Cancelled subscription to {}", active.feed.fish_id());
        }
    }
}

impl<S, C> Drop for FishObserver<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
