use std::sync::Arc;

use bayeuxd::extension::{ManualClock, ACK_FIELD, TIMESYNC_FIELD};
use bayeuxd::protocol::meta;
use bayeuxd::{
    AckExtension, ChannelId, Config, ExtensionPipeline, LocalSession, Message, Packet, Session,
    TimesyncExtension, Transport,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn packet(route: &str, messages: Vec<Message>) -> Packet {
    Packet::new(None, ChannelId::parse(route).unwrap(), messages)
}

fn pipeline(clock: Arc<ManualClock>) -> ExtensionPipeline {
    ExtensionPipeline::new()
        .with(Arc::new(AckExtension::new(10)))
        .with(Arc::new(TimesyncExtension::with_clock(clock)))
}

fn connect_request(id: &str, ack: i64, tc: i64) -> Packet {
    packet(
        meta::CONNECT,
        vec![Message::new(meta::CONNECT)
            .with_id(id)
            .with_ext(ACK_FIELD, json!(ack))
            .with_ext(TIMESYNC_FIELD, json!({"tc": tc, "l": 3, "o": 1}))],
    )
}

fn connect_reply(id: &str, extra: Vec<Message>) -> Packet {
    let mut messages = vec![Message::new(meta::CONNECT).with_id(id).with_successful(true)];
    messages.extend(extra);
    packet(meta::CONNECT, messages)
}

#[test]
fn handshake_and_connect_cycle() {
    let clock = Arc::new(ManualClock::new(5_000));
    let pipeline = pipeline(clock.clone());
    let session = LocalSession::new("s1", &Transport::with_defaults("long-polling"));

    let mut handshake = packet(
        meta::HANDSHAKE,
        vec![Message::new(meta::HANDSHAKE)
            .with_id("1")
            .with_ext(ACK_FIELD, json!(true))
            .with_ext(TIMESYNC_FIELD, json!({"tc": 4_990, "l": 0, "o": 0}))],
    );
    pipeline.on_request(Some(&session), &mut handshake).unwrap();

    clock.advance(2);
    let mut handshake_reply = packet(
        meta::HANDSHAKE,
        vec![Message::new(meta::HANDSHAKE).with_id("1").with_successful(true)],
    );
    pipeline
        .on_response(Some(&session), &mut handshake_reply)
        .unwrap();

    let ext = handshake_reply.messages()[0].ext().unwrap();
    assert_eq!(ext.get(ACK_FIELD), Some(&json!(true)));
    assert_eq!(
        ext.get(TIMESYNC_FIELD),
        Some(&json!({"tc": 4_990, "ts": 5_000, "p": 2, "a": -10}))
    );
    assert!(session.is_long_polling());

    pipeline
        .on_request(Some(&session), &mut connect_request("2", 0, 5_010))
        .unwrap();
    let mut reply = connect_reply("2", Vec::new());
    pipeline.on_response(Some(&session), &mut reply).unwrap();

    let ext = reply.messages()[0].ext().unwrap();
    assert_eq!(ext.get(ACK_FIELD), Some(&json!(1)));
    assert_eq!(ext["timesync"]["tc"], json!(5_010));
}

#[test]
fn reconnecting_client_gets_missed_messages() {
    let pipeline = pipeline(Arc::new(ManualClock::new(0)));
    let session = LocalSession::new("s1", &Transport::with_defaults("long-polling"));
    let mut handshake = packet(
        meta::HANDSHAKE,
        vec![Message::new(meta::HANDSHAKE).with_ext(ACK_FIELD, json!(true))],
    );
    pipeline.on_request(Some(&session), &mut handshake).unwrap();

    // Ack id 1 reaches the client; ack id 2, carrying a chat message, is lost.
    let mut first = connect_reply("2", Vec::new());
    pipeline.on_response(Some(&session), &mut first).unwrap();
    let mut lost = connect_reply(
        "3",
        vec![Message::new("/chat/room").with_field("data", json!({"text": "hello"}))],
    );
    pipeline.on_response(Some(&session), &mut lost).unwrap();

    pipeline
        .on_request(Some(&session), &mut connect_request("4", 1, 10))
        .unwrap();
    let mut replay = connect_reply("4", Vec::new());
    pipeline.on_response(Some(&session), &mut replay).unwrap();

    let channels: Vec<&str> = replay
        .messages()
        .iter()
        .filter_map(Message::channel)
        .collect();
    assert_eq!(channels, [meta::CONNECT, "/chat/room"]);
    assert_eq!(replay.messages()[0].ext_value(ACK_FIELD), Some(&json!(3)));

    let state = AckExtension::state(&session).unwrap().unwrap();
    assert_eq!(state.window_ids(), [3]);

    // Acknowledging the replay empties the window.
    pipeline
        .on_request(Some(&session), &mut connect_request("5", 3, 11))
        .unwrap();
    assert_eq!(state.window_len(), 0);
    assert_eq!(state.pending_resend(), 0);
}

#[test]
fn session_without_ack_is_untouched() {
    let pipeline = pipeline(Arc::new(ManualClock::new(0)));
    let session = LocalSession::new("s1", &Transport::with_defaults("websocket"));

    let mut reply = connect_reply("1", Vec::new());
    pipeline.on_response(Some(&session), &mut reply).unwrap();

    assert_eq!(reply.messages()[0].ext_value(ACK_FIELD), None);
    assert!(!session.is_long_polling());
}

#[test]
fn session_extensions_run_after_server_extensions() {
    let pipeline = ExtensionPipeline::new().with(Arc::new(AckExtension::new(4)));
    let session = LocalSession::new("s1", &Transport::with_defaults("websocket"));
    session
        .add_extension(Arc::new(TimesyncExtension::with_clock(Arc::new(
            ManualClock::new(100),
        ))))
        .unwrap();

    let mut request = packet(
        meta::CONNECT,
        vec![Message::new(meta::CONNECT)
            .with_id("9")
            .with_ext(TIMESYNC_FIELD, json!({"tc": 90, "l": 0, "o": 0}))],
    );
    pipeline.on_request(Some(&session), &mut request).unwrap();
    let mut reply = connect_reply("9", Vec::new());
    pipeline.on_response(Some(&session), &mut reply).unwrap();

    assert_eq!(
        reply.messages()[0].ext_value(TIMESYNC_FIELD).map(|v| v["a"].clone()),
        Some(Value::from(-10))
    );
}

#[test]
fn configured_pipeline_runs_end_to_end() {
    let config = Config::from_toml_str(
        "[extensions.ack]\nmax_window_size = 1\n[extensions.timesync]\nenabled = false\n",
    )
    .unwrap();
    let pipeline = config.build_pipeline();
    let session = LocalSession::new("s1", &Transport::with_defaults("websocket"));
    let mut handshake = packet(
        meta::HANDSHAKE,
        vec![Message::new(meta::HANDSHAKE).with_ext(ACK_FIELD, json!(true))],
    );
    pipeline.on_request(Some(&session), &mut handshake).unwrap();

    for _ in 0..3 {
        pipeline
            .on_response(Some(&session), &mut connect_reply("1", Vec::new()))
            .unwrap();
    }

    let state = AckExtension::state(&session).unwrap().unwrap();
    assert_eq!(state.window_len(), 1);
    assert_eq!(state.counter(), 3);
}
