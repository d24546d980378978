use crate::error::{stale_dispatch, Error};
use log::*;
use pond::{FishId, Pond};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How often a rejected command is offered to the runtime again.
///
/// The default makes a single attempt: a rejected effect is reported to the
/// caller and never retried behind its back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
}

impl DispatchPolicy {
    pub fn retrying(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// Dispatch capability bound to exactly one observed fish.
///
/// The binding is captured when the subscription is opened. Once that
/// subscription is torn down (identity change, drop, registry removal) every
/// call fails with `StaleDispatch`.
pub struct Feed<C> {
    pond: Arc<dyn Pond>,
    fish: FishId,
    live: Arc<AtomicBool>,
    policy: DispatchPolicy,
    _command: PhantomData<fn(C)>,
}

impl<C> Feed<C> {
    pub(crate) fn new(
        pond: Arc<dyn Pond>,
        fish: FishId,
        live: Arc<AtomicBool>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            pond,
            fish,
            live,
            policy,
            _command: PhantomData,
        }
    }

    pub fn fish_id(&self) -> &FishId {
        &self.fish
    }

    /// Whether the subscription this feed was bound to is still open.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl<C: Serialize> Feed<C> {
    /// Ask the runtime to apply `command` to the bound fish. Resolves once the
    /// runtime has accepted the effect; the observed state follows through
    /// the subscription.
    pub async fn feed(&self, command: C) -> Result<(), Error> {
        if !self.is_live() {
            return Err(stale_dispatch(&self.fish.to_string()));
        }
        let command = serde_json::to_value(command)?;

        let mut attempt = 1;
        loop {
            match self.pond.run(&self.fish, command.clone()).await {
                Ok(()) => return Ok(()),
                Err(e)
                    if e.error_kind == pond::ErrorKind::EffectRejected
                        && attempt < self.policy.max_attempts =>
                {
                    warn!(
                        "Command for {} rejected (attempt {}/{}): {e}",
                        self.fish, attempt, self.policy.max_attempts
                    );
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Command for {} failed: {e}", self.fish);
                    return Err(e.into());
                }
            }
        }
    }
}

impl<C> Clone for Feed<C> {
    fn clone(&self) -> Self {
        Self {
            pond: Arc::clone(&self.pond),
            fish: self.fish.clone(),
            live: Arc::clone(&self.live),
            policy: self.policy,
            _command: PhantomData,
        }
    }
}

impl<C> fmt::Debug for Feed<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Feed")
            .field("fish", &self.fish)
            .field("live", &self.is_live())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use testing_tools::fish::ChatCommand;
    use testing_tools::MockPond;

    fn post() -> ChatCommand {
        ChatCommand::PostMessage {
            sender: "alice".to_string(),
            message: "hi".to_string(),
        }
    }

    fn feed_for(pond: &MockPond, policy: DispatchPolicy) -> (Arc<AtomicBool>, Feed<ChatCommand>) {
        let live = Arc::new(AtomicBool::new(true));
        let feed = Feed::new(
            pond.handle(),
            FishId::of("com.example.chatRoom", "lobby", 0),
            Arc::clone(&live),
            policy,
        );
        (live, feed)
    }

    #[tokio::test]
    async fn test_feed_serializes_command_for_bound_fish() {
        let pond = MockPond::new();
        let (_live, feed) = feed_for(&pond, DispatchPolicy::default());

        feed.feed(post()).await.unwrap();

        let commands = pond.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0.name, "lobby");
        assert_eq!(
            commands[0].1,
            json!({"type": "postMessage", "sender": "alice", "message": "hi"})
        );
    }

    #[tokio::test]
    async fn test_feed_after_teardown_is_stale() {
        let pond = MockPond::new();
        let (live, feed) = feed_for(&pond, DispatchPolicy::default());
        live.store(false, Ordering::SeqCst);

        let err = feed.feed(post()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleDispatch);
        assert!(pond.commands().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried_by_default() {
        let pond = MockPond::new();
        pond.reject_next_commands(1);
        let (_live, feed) = feed_for(&pond, DispatchPolicy::default());

        let err = feed.feed(post()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EffectRejected);
        assert!(pond.commands().is_empty());
    }

    #[tokio::test]
    async fn test_retrying_policy_retries_rejections() {
        let pond = MockPond::new();
        pond.reject_next_commands(2);
        let (_live, feed) = feed_for(&pond, DispatchPolicy::retrying(3));

        feed.feed(post()).await.unwrap();
        assert_eq!(pond.commands().len(), 1);
    }

    #[test]
    fn test_retrying_policy_makes_at_least_one_attempt() {
        assert_eq!(DispatchPolicy::retrying(0).max_attempts, 1);
    }
}
