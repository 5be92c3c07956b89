//! Bayeux protocol model: channels, messages and packets.

pub mod channel;
pub mod message;
pub mod meta;
pub mod packet;

pub use channel::{ChannelId, ChannelIdCache};
pub use message::Message;
pub use packet::Packet;
