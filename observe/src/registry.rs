//! Observation of a dynamic set of fish announced by a registry fish.
//!
//! The registry fish's state is mapped to an ordered list of properties; each
//! property is turned into a member fish by a factory. Member subscriptions
//! are reconciled by property value:
//!
//! - a membership list equal to the previous one changes nothing
//! - properties that disappear have their subscription cancelled
//! - new properties get exactly one new subscription
//! - retained properties keep their subscription and their latest state
//!
//! While new members of a reconciliation pass have not delivered their first
//! state, the previously published array stays visible. Once every member of
//! the pass is confirmed the array is swapped in, and from then on each
//! member push republishes it right away.

use crate::context::PondContext;
use crate::error::Error;
use crate::feed::{DispatchPolicy, Feed};
use crate::fish::ObservedFish;
use async_stream::stream;
use futures::Stream;
use log::*;
use pond::{CancelSubscription, Fish, Pond};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

/// Published member snapshots, in membership order.
pub type Members<S, C, P> = Arc<Vec<Arc<ObservedFish<S, C, P>>>>;

type MapFn<R, P> = Box<dyn Fn(&R) -> Vec<P> + Send + Sync>;
type MakeFish<P, S, C> = Box<dyn Fn(&P) -> Fish<S, C> + Send + Sync>;

struct Member<S, C, P> {
    /// Distinguishes a re-added property from its earlier incarnation.
    slot: u64,
    cancel: Option<CancelSubscription>,
    live: Arc<AtomicBool>,
    latest: Option<Arc<ObservedFish<S, C, P>>>,
}

struct Table<S, C, P> {
    closed: bool,
    live: bool,
    membership: Option<Vec<P>>,
    members: HashMap<P, Member<S, C, P>>,
    pending: HashSet<P>,
    next_slot: u64,
}

struct Reconciler<R, P, S, C> {
    pond: Arc<dyn Pond>,
    map: MapFn<R, P>,
    make_fish: MakeFish<P, S, C>,
    policy: DispatchPolicy,
    table: Mutex<Table<S, C, P>>,
    output: watch::Sender<Members<S, C, P>>,
    last_error: Mutex<Option<Error>>,
}

/// Observes a registry fish and every member fish it announces.
///
/// ```rust,ignore
/// let mut rooms = RegistryObserver::new(&ctx, channel_list(), |names| names.clone(), |name| chat_room(name))?;
/// rooms.changed().await;
/// for room in rooms.current().iter() {
///     println!("{}: {}", room.props, room.state.join(", "));
/// }
/// ```
pub struct RegistryObserver<R, P, S, C> {
    reconciler: Arc<Reconciler<R, P, S, C>>,
    registry_subscription: CancelSubscription,
    receiver: watch::Receiver<Members<S, C, P>>,
}

impl<R, P, S, C> RegistryObserver<R, P, S, C>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    S: DeserializeOwned + Serialize + Send + Sync + 'static,
    C: Serialize + Send + Sync + 'static,
{
    /// Observe `registry`, map each of its states to member properties with
    /// `map`, and observe `make_fish(property)` for every member.
    pub fn new<RC>(
        ctx: &PondContext,
        registry: Fish<R, RC>,
        map: impl Fn(&R) -> Vec<P> + Send + Sync + 'static,
        make_fish: impl Fn(&P) -> Fish<S, C> + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        Self::with_dispatch_policy(ctx, registry, map, make_fish, DispatchPolicy::default())
    }

    pub fn with_dispatch_policy<RC>(
        ctx: &PondContext,
        registry: Fish<R, RC>,
        map: impl Fn(&R) -> Vec<P> + Send + Sync + 'static,
        make_fish: impl Fn(&P) -> Fish<S, C> + Send + Sync + 'static,
        policy: DispatchPolicy,
    ) -> Result<Self, Error> {
        let pond = ctx.pond()?;
        let (output, receiver) = watch::channel(Arc::new(Vec::new()));
        let reconciler = Arc::new(Reconciler {
            pond: Arc::clone(&pond),
            map: Box::new(map),
            make_fish: Box::new(make_fish),
            policy,
            table: Mutex::new(Table {
                closed: false,
                live: false,
                membership: None,
                members: HashMap::new(),
                pending: HashSet::new(),
                next_slot: 0,
            }),
            output,
            last_error: Mutex::new(None),
        });

        let initial_state = registry.initial_state_json()?;
        debug!("Subscribing to registry {}", registry.id());
        let weak: Weak<Reconciler<R, P, S, C>> = Arc::downgrade(&reconciler);
        let registry_subscription = pond.observe(
            registry.id(),
            initial_state,
            Box::new(move |state| {
                if let Some(reconciler) = weak.upgrade() {
                    reconciler.on_registry_state(state);
                }
            }),
        );

        Ok(Self {
            reconciler,
            registry_subscription,
            receiver,
        })
    }

    /// The published member snapshots, in membership order.
    pub fn current(&self) -> Members<S, C, P> {
        self.reconciler.output.borrow().clone()
    }

    /// Just the member states, in membership order.
    pub fn states(&self) -> Vec<S>
    where
        S: Clone,
    {
        self.current().iter().map(|m| m.state.clone()).collect()
    }

    /// Wait until a new member array is published and return it.
    ///
    /// A registry or member push that cannot be decoded also wakes this,
    /// returning the unchanged array; the error is available from
    /// [`RegistryObserver::take_error`].
    pub async fn changed(&mut self) -> Members<S, C, P> {
        // The reconciler owns the sender for as long as `self` lives.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Members<S, C, P>> {
        self.reconciler.output.subscribe()
    }

    /// Every published array of member states, starting with the current one.
    /// Each array is yielded once.
    pub fn state_stream(&self) -> impl Stream<Item = Vec<S>> + Send + 'static
    where
        S: Clone,
    {
        let mut receiver = self.reconciler.output.subscribe();
        stream! {
            let mut last: Option<Members<S, C, P>> = None;
            loop {
                let members = receiver.borrow_and_update().clone();
                if !last.as_ref().is_some_and(|last| Arc::ptr_eq(last, &members)) {
                    yield members.iter().map(|m| m.state.clone()).collect::<Vec<S>>();
                    last = Some(members);
                }
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// The membership list last reported by the registry.
    pub fn membership(&self) -> Option<Vec<P>> {
        self.reconciler.table().membership.clone()
    }

    /// Number of member subscriptions currently held.
    pub fn member_count(&self) -> usize {
        self.reconciler.table().members.len()
    }

    /// Whether every member of the latest reconciliation pass has delivered
    /// its first state.
    pub fn is_live(&self) -> bool {
        self.reconciler.table().live
    }

    /// The last registry or member state that could not be decoded, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.reconciler
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<S, C> RegistryObserver<Vec<String>, String, S, C>
where
    S: DeserializeOwned + Serialize + Send + Sync + 'static,
    C: Serialize + Send + Sync + 'static,
{
    /// Observe a registry fish whose state already is the list of member names.
    pub fn of_names<RC>(
        ctx: &PondContext,
        registry: Fish<Vec<String>, RC>,
        make_fish: impl Fn(&str) -> Fish<S, C> + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        Self::new(ctx, registry, |names: &Vec<String>| names.clone(), move |name: &String| {
            make_fish(name)
        })
    }
}

impl<R, P, S, C> Drop for RegistryObserver<R, P, S, C> {
    fn drop(&mut self) {
        self.registry_subscription.cancel();

        let members: Vec<Member<S, C, P>> = {
            let mut table = self
                .reconciler
                .table
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            table.closed = true;
            table.pending.clear();
            table.members.drain().map(|(_, member)| member).collect()
        };
        debug!("Registry observer dropped, cancelling {} member(s)", members.len());
        for member in members {
            member.release();
        }
    }
}

impl<S, C, P> Member<S, C, P> {
    fn release(mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(mut cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl<R, P, S, C> Reconciler<R, P, S, C>
where
    R: DeserializeOwned + Send + Sync + 'static,
    P: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    S: DeserializeOwned + Serialize + Send + Sync + 'static,
    C: Serialize + Send + Sync + 'static,
{
    fn table(&self) -> MutexGuard<'_, Table<S, C, P>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `err` and wake waiters without publishing a new array.
    fn report_error(&self, err: Error) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
        self.output.send_modify(|_| {});
    }

    fn is_current_member(&self, props: &P, slot: u64) -> bool {
        let table = self.table();
        !table.closed && table.members.get(props).is_some_and(|m| m.slot == slot)
    }

    fn on_registry_state(self: &Arc<Self>, state: Value) {
        let registry_state: R = match serde_json::from_value(state) {
            Ok(state) => state,
            Err(e) => {
                if !self.table().closed {
                    error!("Failed to decode registry state: {e}");
                    self.report_error(e.into());
                }
                return;
            }
        };
        let membership = (self.map)(&registry_state);

        let (added, removed) = {
            let mut table = self.table();
            if table.closed {
                return;
            }
            if table.membership.as_ref() == Some(&membership) {
                trace!("Registry membership unchanged ({} member(s))", membership.len());
                return;
            }

            let wanted: HashSet<&P> = membership.iter().collect();
            let gone: Vec<P> = table
                .members
                .keys()
                .filter(|props| !wanted.contains(props))
                .cloned()
                .collect();
            let removed: Vec<Member<S, C, P>> = gone
                .iter()
                .filter_map(|props| table.members.remove(props))
                .collect();

            let mut added = Vec::new();
            for props in &membership {
                if table.members.contains_key(props) {
                    continue;
                }
                let slot = table.next_slot;
                table.next_slot += 1;
                let live = Arc::new(AtomicBool::new(true));
                table.members.insert(
                    props.clone(),
                    Member {
                        slot,
                        cancel: None,
                        live: Arc::clone(&live),
                        latest: None,
                    },
                );
                added.push((props.clone(), slot, live));
            }

            let pending: HashSet<P> = membership
                .iter()
                .filter(|props| {
                    table
                        .members
                        .get(*props)
                        .is_some_and(|member| member.latest.is_none())
                })
                .cloned()
                .collect();

            debug!(
                "Registry membership changed: {} member(s), {} added, {} removed",
                membership.len(),
                added.len(),
                removed.len()
            );

            table.live = pending.is_empty();
            table.pending = pending;
            table.membership = Some(membership);
            if table.live {
                self.publish(&table);
            }
            (added, removed)
        };

        for member in removed {
            member.release();
        }
        for (props, slot, live) in added {
            self.open_member(props, slot, live);
        }
    }

    fn open_member(self: &Arc<Self>, props: P, slot: u64, live: Arc<AtomicBool>) {
        let fish = (self.make_fish)(&props);
        let fish_id = fish.id().clone();
        let feed: Feed<C> = Feed::new(Arc::clone(&self.pond), fish_id.clone(), live, self.policy);

        let initial_state = match fish.initial_state_json() {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to encode initial state of {fish_id}: {e}");
                Value::Null
            }
        };

        debug!("Subscribing to registry member {props:?} ({fish_id})");
        let weak = Arc::downgrade(self);
        let member_props = props.clone();
        let cancel = self.pond.observe(
            &fish_id,
            initial_state,
            Box::new(move |state| {
                if let Some(reconciler) = weak.upgrade() {
                    reconciler.on_member_state(&member_props, slot, &feed, state);
                }
            }),
        );

        let orphan = {
            let mut table = self.table();
            let closed = table.closed;
            match table.members.get_mut(&props) {
                Some(member) if member.slot == slot && !closed => {
                    member.cancel = Some(cancel);
                    None
                }
                _ => Some(cancel),
            }
        };
        if let Some(mut cancel) = orphan {
            debug!("Registry member {props:?} went away while subscribing");
            cancel.cancel();
        }
    }

    fn on_member_state(&self, props: &P, slot: u64, feed: &Feed<C>, state: Value) {
        let state: S = match serde_json::from_value(state) {
            Ok(state) => state,
            Err(e) => {
                if self.is_current_member(props, slot) {
                    error!("Failed to decode state of registry member {props:?}: {e}");
                    self.report_error(e.into());
                }
                return;
            }
        };
        let snapshot = Arc::new(ObservedFish::new(state, props.clone(), feed.clone()));

        let mut table = self.table();
        if table.closed {
            return;
        }
        match table.members.get_mut(props) {
            Some(member) if member.slot == slot => member.latest = Some(snapshot),
            _ => {
                trace!("Discarded state of removed registry member {props:?}");
                return;
            }
        }

        table.pending.remove(props);
        if table.pending.is_empty() {
            if !table.live {
                debug!("Registry pass confirmed, publishing members");
                table.live = true;
            }
            self.publish(&table);
        }
    }

    fn publish(&self, table: &Table<S, C, P>) {
        let Some(membership) = &table.membership else {
            return;
        };
        let members: Vec<Arc<ObservedFish<S, C, P>>> = membership
            .iter()
            .filter_map(|props| table.members.get(props).and_then(|m| m.latest.clone()))
            .collect();
        self.output.send_replace(Arc::new(members));
    }
}
