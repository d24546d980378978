use fish_observer_rs::{
    dispatch_policy, load_config_from, provider_builder, ErrorKind, FishObserver, PondContext,
    PondProvider, RegistryObserver, Rendered, StreamAdapter, SubscriptionStatus,
};
use futures::channel::mpsc;
use serde_json::json;
use std::sync::{Mutex, MutexGuard, PoisonError};
use testing_tools::fish::{channel_list, chat_room, ChatCommand};
use testing_tools::{MockConnector, MockPond};

// The pond session is process-wide; scenarios mounting a provider must not interleave.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    PondProvider::<()>::reset_session();
    guard
}

async fn mounted(pond: &MockPond) -> PondContext {
    let config = load_config_from(["fish-observer", "--app-id", "com.example.chat"]).unwrap();
    let connector = MockConnector::new(pond.clone());
    let mut provider: PondProvider<String> = provider_builder(&config)
        .on_error(|e| Some(e.to_string()))
        .build();
    provider.mount(&connector).await.unwrap();

    assert_eq!(connector.last_manifest().unwrap().app_id, "com.example.chat");
    match provider.render() {
        Rendered::Children(ctx) => ctx,
        _ => panic!("provider should render its children"),
    }
}

#[tokio::test]
async fn chat_room_round_trip() {
    let _serial = serial();
    let pond = MockPond::new();
    let ctx = mounted(&pond).await;

    let mut room = FishObserver::builder(chat_room)
        .name("lobby")
        .mount(&ctx)
        .unwrap();
    assert_eq!(room.status(), SubscriptionStatus::Subscribing);

    let lobby = chat_room("lobby").id().clone();
    pond.push(&lobby, json!(["alice: hi"]));
    let snapshot = room.current().unwrap();
    assert_eq!(snapshot.state, vec!["alice: hi"]);

    room.feed(ChatCommand::PostMessage {
        sender: "bob".to_string(),
        message: "yo".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(pond.commands().len(), 1);
    assert_eq!(pond.commands()[0].0, lobby);

    drop(room);
    assert_eq!(pond.live_subscriptions(), 0);
}

#[tokio::test]
async fn identity_change_swaps_exactly_one_subscription() {
    let _serial = serial();
    let pond = MockPond::retaining_cancelled();
    let ctx = mounted(&pond).await;
    let mut room = FishObserver::new(&ctx, chat_room, Some("lobby".to_string())).unwrap();
    pond.push(chat_room("lobby").id(), json!(["in lobby"]));

    room.set_name("general");
    pond.push(chat_room("lobby").id(), json!(["late lobby push"]));

    assert_eq!(pond.opened(), 2);
    assert_eq!(pond.cancelled(), 1);
    assert!(room.current().is_none());

    pond.push(chat_room("general").id(), json!(["in general"]));
    assert_eq!(room.current().unwrap().state, vec!["in general"]);
}

#[tokio::test]
async fn lobby_registry_scenario() {
    let _serial = serial();
    let pond = MockPond::new();
    let ctx = mounted(&pond).await;
    let rooms: RegistryObserver<Vec<String>, String, Vec<String>, ChatCommand> =
        RegistryObserver::of_names(&ctx, channel_list(), chat_room).unwrap();

    pond.push(channel_list().id(), json!(["lobby"]));
    pond.push(chat_room("lobby").id(), json!(["alice: hi"]));

    let members = rooms.current();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].props, "lobby");
    assert_eq!(members[0].state, vec!["alice: hi"]);

    drop(rooms);
    assert_eq!(pond.live_subscriptions(), 0);
}

#[tokio::test]
async fn stream_adapter_scenario() {
    let mut adapter: StreamAdapter<u32> = StreamAdapter::new();
    assert_eq!(adapter.current(), None);

    let (first_tx, first_rx) = mpsc::unbounded();
    first_tx.unbounded_send(42).unwrap();
    adapter.set_stream(first_rx).unwrap();
    assert_eq!(adapter.changed().await, Some(42));

    let (second_tx, second_rx) = mpsc::unbounded();
    adapter.set_stream(second_rx).unwrap();
    let _ = first_tx.unbounded_send(1);
    second_tx.unbounded_send(2).unwrap();
    assert_eq!(adapter.changed().await, Some(2));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(adapter.current(), Some(2));
}

#[tokio::test]
async fn configured_retries_absorb_rejections() {
    let _serial = serial();
    let pond = MockPond::new();
    let ctx = mounted(&pond).await;
    let config =
        load_config_from(["fish-observer", "--dispatch-max-attempts", "3"]).unwrap();

    let room = FishObserver::builder(chat_room)
        .name("lobby")
        .dispatch_policy(dispatch_policy(&config))
        .mount(&ctx)
        .unwrap();
    pond.reject_next_commands(2);

    room.feed(ChatCommand::PostMessage {
        sender: "alice".to_string(),
        message: "third time lucky".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(pond.commands().len(), 1);
}

#[test]
fn observers_outside_a_provider_fail_fast() {
    let ctx = PondContext::detached();

    let err = FishObserver::new(&ctx, chat_room, Some("lobby".to_string()))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(ctx.info().is_err());
}

#[tokio::test]
async fn failed_session_renders_fallback() {
    let _serial = serial();
    let config = load_config_from(["fish-observer"]).unwrap();
    let connector = MockConnector::failing("Is Actyx running?");
    let mut provider: PondProvider<String> = provider_builder(&config)
        .placeholder("connecting".to_string())
        .on_error(|e| Some(format!("offline: {e}")))
        .build();

    assert!(matches!(provider.render(), Rendered::Placeholder(Some(_))));
    provider.mount(&connector).await.unwrap();

    match provider.render() {
        Rendered::Fallback(view) => assert!(view.starts_with("offline:")),
        _ => panic!("expected the fallback view"),
    }
}
