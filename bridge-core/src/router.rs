use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::{model::DeviceUuid, transport::Transport};

/// Forwards host set requests to the controller. Fire-and-forget: failures
/// are logged, never retried, and no local state changes here.
#[derive(Clone)]
pub struct CommandRouter {
    transport: Arc<dyn Transport>,
}

impl CommandRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn send_status_change(&self, id: &DeviceUuid, on: bool) {
        debug!(uuid = %id, on, "forwarding status change");
        if let Err(e) = self.transport.send_status_change_command(id, on) {
            counter!("bridge.commands.failed").increment(1);
            warn!(uuid = %id, error = %e, "status change command failed");
        }
    }

    pub fn send_brightness_change(&self, id: &DeviceUuid, level: u8) {
        debug!(uuid = %id, level, "forwarding brightness change");
        if let Err(e) = self.transport.send_brightness_change_command(id, level) {
            counter!("bridge.commands.failed").increment(1);
            warn!(uuid = %id, error = %e, "brightness change command failed");
        }
    }
}
