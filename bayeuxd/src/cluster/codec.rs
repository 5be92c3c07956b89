//! Binary record format used to move packets between cluster nodes.
//!
//! Layout, every string length-prefixed (see [`framing`](super::framing)):
//!
//! ```text
//! [sender session id][sender transport name][channel id][u32 message count]
//! [message 0 json] .. [message n-1 json]
//! ```
//!
//! A packet without a sender is written with an empty id and transport.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

use crate::cluster::framing::{get_bytes, get_count, get_string, put_count, put_str};
use crate::error::CodecError;
use crate::protocol::{Message, Packet};
use crate::server::Server;
use crate::session::{RemoteSession, Session};

const SENDER_ID: &str = "sender id";
const TRANSPORT: &str = "transport";
const CHANNEL: &str = "channel";
const MESSAGE_COUNT: &str = "message count";
const MESSAGE: &str = "message";

pub struct PacketCodec;

impl PacketCodec {
    /// Encodes `packet` as published by session `sender_id` over `transport`.
    pub fn encode(sender_id: &str, transport: &str, packet: &Packet) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        put_str(&mut buf, SENDER_ID, sender_id)?;
        put_str(&mut buf, TRANSPORT, transport)?;
        put_str(&mut buf, CHANNEL, packet.route())?;
        put_count(&mut buf, MESSAGE_COUNT, packet.len())?;

        for (index, message) in packet.messages().iter().enumerate() {
            let json = message
                .to_json()
                .map_err(|source| CodecError::InvalidMessage { index, source })?;
            put_str(&mut buf, MESSAGE, &json)?;
        }

        Ok(buf.freeze())
    }

    /// Encodes `packet` with the identity of its own sender.
    pub fn encode_packet(packet: &Packet) -> Result<Bytes, CodecError> {
        match packet.sender() {
            Some(sender) => Self::encode(sender.id(), sender.transport_name(), packet),
            None => Self::encode("", "", packet),
        }
    }

    /// Decodes one record into a packet bound to a [`RemoteSession`].
    ///
    /// The channel is interned through the server's channel cache and the
    /// sender's timings come from the server's configuration of the named
    /// transport.
    pub fn decode(mut bytes: &[u8], server: &dyn Server) -> Result<Packet, CodecError> {
        let sender_id = get_string(&mut bytes, SENDER_ID)?;
        let transport = get_string(&mut bytes, TRANSPORT)?;
        let channel = get_string(&mut bytes, CHANNEL)?;
        let count = get_count(&mut bytes, MESSAGE_COUNT)?;

        // Each message needs at least its length prefix.
        let mut messages = Vec::with_capacity(count.min(bytes.remaining() / 4));
        for index in 0..count {
            let json = get_bytes(&mut bytes, MESSAGE)?;
            match serde_json::from_slice::<Value>(&json)
                .map_err(|source| CodecError::InvalidMessage { index, source })?
            {
                Value::Object(fields) => messages.push(Message::from_map(fields)),
                _ => return Err(CodecError::NotAnObject { index }),
            }
        }

        if bytes.has_remaining() {
            return Err(CodecError::TrailingBytes(bytes.remaining()));
        }

        let channel = server.channel_ids().generate(&channel)?;
        let sender: Option<Arc<dyn Session>> = if sender_id.is_empty() && transport.is_empty() {
            None
        } else {
            let transport = server
                .transport(&transport)
                .ok_or(CodecError::UnknownTransport(transport))?;
            Some(Arc::new(RemoteSession::new(sender_id, transport)))
        };

        Ok(Packet::new(sender, channel, messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelId;
    use crate::server::testing::RecordingServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn server() -> RecordingServer {
        RecordingServer::new(&["websocket"])
    }

    fn packet(messages: Vec<Message>) -> Packet {
        Packet::new(None, ChannelId::parse("/chat/room").unwrap(), messages)
    }

    fn bodies(packet: &Packet) -> Vec<String> {
        packet
            .messages()
            .iter()
            .map(|m| m.to_json().unwrap())
            .collect()
    }

    #[test]
    fn wire_layout() {
        let encoded =
            PacketCodec::encode("ab", "ws", &packet(vec![Message::new("/c")])).unwrap();

        let mut expected = vec![0, 0, 0, 2, b'a', b'b', 0, 0, 0, 2, b'w', b's'];
        expected.extend_from_slice(&[0, 0, 0, 10]);
        expected.extend_from_slice(b"/chat/room");
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 0, 0, 16]);
        expected.extend_from_slice(br#"{"channel":"/c"}"#);
        assert_eq!(encoded.to_vec(), expected);
    }

    #[test]
    fn decode_restores_channel_and_bodies() {
        let server = server();
        for messages in [
            vec![],
            vec![Message::new("/chat/room").with_id("1").with_field("data", json!({"b": 1, "a": [1, 2]}))],
            vec![
                Message::new("/chat/room").with_id("1"),
                Message::new("/chat/room").with_id("2").with_ext("ack", json!(3)),
                Message::new("/chat/room").with_field("data", json!("ünïcode")),
            ],
        ] {
            let original = packet(messages);
            let encoded = PacketCodec::encode("client-1", "websocket", &original).unwrap();

            let decoded = PacketCodec::decode(&encoded, &server).unwrap();

            assert_eq!(decoded.route(), "/chat/room");
            assert_eq!(bodies(&decoded), bodies(&original));
            let sender = decoded.sender().unwrap();
            assert_eq!(sender.id(), "client-1");
            assert_eq!(sender.transport_name(), "websocket");
            assert!(!sender.is_local());
        }
    }

    #[test]
    fn decoded_channel_is_interned() {
        let server = server();
        let encoded = PacketCodec::encode("c", "websocket", &packet(vec![])).unwrap();

        let first = PacketCodec::decode(&encoded, &server).unwrap();
        let second = PacketCodec::decode(&encoded, &server).unwrap();

        assert!(first.channel().same_instance(second.channel()));
    }

    #[test]
    fn senderless_packet_round_trips() {
        let server = server();
        let encoded = PacketCodec::encode_packet(&packet(vec![Message::new("/x")])).unwrap();

        let decoded = PacketCodec::decode(&encoded, &server).unwrap();

        assert!(decoded.sender().is_none());
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn truncated_record_fails() {
        let server = server();
        let encoded =
            PacketCodec::encode("c", "websocket", &packet(vec![Message::new("/x")])).unwrap();

        let err = PacketCodec::decode(&encoded[..encoded.len() - 3], &server).unwrap_err();

        assert!(matches!(err, CodecError::Truncated { field: MESSAGE, .. }));
    }

    #[test]
    fn unknown_transport_fails() {
        let server = server();
        let encoded = PacketCodec::encode("c", "carrier-pigeon", &packet(vec![])).unwrap();

        let err = PacketCodec::decode(&encoded, &server).unwrap_err();

        assert!(matches!(err, CodecError::UnknownTransport(name) if name == "carrier-pigeon"));
    }

    #[test]
    fn non_object_message_fails() {
        let mut buf = BytesMut::new();
        put_str(&mut buf, SENDER_ID, "").unwrap();
        put_str(&mut buf, TRANSPORT, "").unwrap();
        put_str(&mut buf, CHANNEL, "/chat").unwrap();
        put_count(&mut buf, MESSAGE_COUNT, 1).unwrap();
        put_str(&mut buf, MESSAGE, "[1,2]").unwrap();

        let err = PacketCodec::decode(&buf, &server()).unwrap_err();

        assert!(matches!(err, CodecError::NotAnObject { index: 0 }));
    }

    #[test]
    fn garbage_fails_without_panicking() {
        let err = PacketCodec::decode(b"\xff\xff\xff\xffnot a record", &server()).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: SENDER_ID, .. }));
    }
}
