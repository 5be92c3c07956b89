use std::sync::Arc;

use crate::error::BackboneError;
use crate::protocol::Packet;
use crate::server::Server;

/// Fan-out of locally published packets to every other cluster node.
pub trait ServerBackbone: Send + Sync {
    /// Starts delivering packets from other nodes into `server`.
    ///
    /// Returns once the backbone is running. A call racing another start
    /// waits for it and returns without starting anything twice.
    fn start_up(&self, server: Arc<dyn Server>) -> Result<(), BackboneError>;

    /// Stops delivery. Safe to call at any point of the lifecycle.
    fn shut_down(&self) -> Result<(), BackboneError>;

    /// Sends `packet` to the other nodes.
    fn publish(&self, packet: &Packet) -> Result<(), BackboneError>;
}
