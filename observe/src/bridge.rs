//! Callback-to-stream bridges for the runtime's push interfaces.
//!
//! Each bridge registers a callback that forwards into an unbounded channel
//! and returns a stream draining it. The stream owns the subscription, so
//! dropping the stream cancels it. Combine with
//! [`StreamAdapter`](crate::StreamAdapter) to read the latest value.

use async_stream::stream;
use futures::Stream;
use log::*;
use pond::{ConnectivityStatus, FishId, Pond, PondState};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Raw state pushes of one fish, undecoded.
pub fn fish_states(
    pond: Arc<dyn Pond>,
    fish: FishId,
    initial_state: Value,
) -> impl Stream<Item = Value> + Send + 'static {
    let (tx, mut rx) = mpsc::unbounded_channel();
    debug!("Bridging states of {fish} into a stream");
    let subscription = pond.observe(
        &fish,
        initial_state,
        Box::new(move |state| {
            let _ = tx.send(state);
        }),
    );

    stream! {
        let _subscription = subscription;
        while let Some(state) = rx.recv().await {
            yield state;
        }
    }
}

pub fn node_connectivity(pond: Arc<dyn Pond>) -> impl Stream<Item = ConnectivityStatus> + Send + 'static {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = pond.node_connectivity(Box::new(move |status| {
        let _ = tx.send(status);
    }));

    stream! {
        let _subscription = subscription;
        while let Some(status) = rx.recv().await {
            yield status;
        }
    }
}

pub fn pond_state(pond: Arc<dyn Pond>) -> impl Stream<Item = PondState> + Send + 'static {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = pond.pond_state(Box::new(move |state| {
        let _ = tx.send(state);
    }));

    stream! {
        let _subscription = subscription;
        while let Some(state) = rx.recv().await {
            yield state;
        }
    }
}
