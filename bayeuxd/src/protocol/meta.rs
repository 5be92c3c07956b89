//! Reserved `/meta` routes of the Bayeux protocol.

pub const HANDSHAKE: &str = "/meta/handshake";
pub const CONNECT: &str = "/meta/connect";
pub const DISCONNECT: &str = "/meta/disconnect";
pub const SUBSCRIBE: &str = "/meta/subscribe";
pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";

/// `true` for handshake and connect, the two routes that carry reliability
/// and clock negotiation.
pub fn is_negotiation_route(route: &str) -> bool {
    route == HANDSHAKE || route == CONNECT
}
