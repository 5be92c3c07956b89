//! The unit of transport between sessions, extensions and cluster nodes.

use std::fmt;
use std::sync::Arc;

use crate::protocol::channel::ChannelId;
use crate::protocol::message::Message;
use crate::session::Session;

/// One sender, one channel, one or more messages.
///
/// The message list has a fixed length once the packet is built. Extensions
/// may edit individual messages through [`Packet::messages_mut`], but adding
/// messages always goes through [`Packet::merge`], which builds a new packet.
#[derive(Clone)]
pub struct Packet {
    sender: Option<Arc<dyn Session>>,
    channel: ChannelId,
    messages: Box<[Message]>,
}

impl Packet {
    pub fn new(
        sender: Option<Arc<dyn Session>>,
        channel: ChannelId,
        messages: Vec<Message>,
    ) -> Self {
        Packet {
            sender,
            channel,
            messages: messages.into_boxed_slice(),
        }
    }

    pub fn sender(&self) -> Option<&Arc<dyn Session>> {
        self.sender.as_ref()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|session| session.id())
    }

    /// The channel this packet travels on; for replies this is the meta route.
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Shorthand for the channel path.
    pub fn route(&self) -> &str {
        self.channel.as_str()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut [Message] {
        &mut self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends the non-meta messages of `other` after this packet's messages.
    ///
    /// Used to piggyback redelivered packets on a `/meta/connect` reply: the
    /// meta replies of `other` belong to a connect cycle that already ended.
    pub fn merge(&self, other: &Packet) -> Packet {
        let messages = self
            .messages
            .iter()
            .cloned()
            .chain(
                other
                    .messages
                    .iter()
                    .filter(|message| !is_meta_message(message))
                    .cloned(),
            )
            .collect::<Vec<_>>();

        Packet::new(self.sender.clone(), self.channel.clone(), messages)
    }
}

fn is_meta_message(message: &Message) -> bool {
    message
        .channel()
        .is_some_and(|channel| channel.starts_with("/meta/"))
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("sender", &self.sender_id())
            .field("channel", &self.channel)
            .field("messages", &self.messages)
            .finish()
    }
}
