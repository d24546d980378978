use dashmap::DashMap;
use pond::FishId;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared form of a state callback so it can be invoked outside map locks.
pub type SharedCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Unique identifier for one observation (generated per `observe` call)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    fish: FishId,
    on_state: SharedCallback,
}

/// Subscriber table with dual indices
pub struct SubscriberRegistry {
    /// Primary storage: lookup by subscription id for cancellation
    subscribers: DashMap<SubscriptionId, Subscriber>,

    /// Secondary index: subscriptions per fish for push routing
    fish_index: DashMap<FishId, HashSet<SubscriptionId>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            fish_index: DashMap::new(),
        }
    }

    pub fn register(&self, fish: FishId, on_state: SharedCallback) -> SubscriptionId {
        let subscription_id = SubscriptionId::new();

        self.subscribers.insert(
            subscription_id.clone(),
            Subscriber {
                fish: fish.clone(),
                on_state,
            },
        );

        self.fish_index
            .entry(fish)
            .or_default()
            .insert(subscription_id.clone());

        subscription_id
    }

    /// Returns `false` when the subscription was not registered (already removed).
    pub fn unregister(&self, subscription_id: &SubscriptionId) -> bool {
        let Some((_, subscriber)) = self.subscribers.remove(subscription_id) else {
            return false;
        };

        if let Some(mut entry) = self.fish_index.get_mut(&subscriber.fish) {
            entry.remove(subscription_id);

            if entry.is_empty() {
                drop(entry); // Release lock before removal
                self.fish_index.remove(&subscriber.fish);
            }
        }
        true
    }

    /// Callbacks currently observing `fish`, collected so no map lock is held
    /// while they run.
    pub fn callbacks_for(&self, fish: &FishId) -> Vec<SharedCallback> {
        let Some(ids) = self.fish_index.get(fish) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.subscribers.get(id).map(|s| Arc::clone(&s.on_state)))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn live_for(&self, fish: &FishId) -> usize {
        self.fish_index.get(fish).map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn subscription_ids_for(&self, fish: &FishId) -> HashSet<SubscriptionId> {
        self.fish_index
            .get(fish)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
