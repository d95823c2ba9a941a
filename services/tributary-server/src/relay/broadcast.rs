//! Broadcast Handler
//!
//! `BROADCAST` fans one message out to every registered connection. The
//! registry is only touched to take a snapshot and to prune dead peers; no
//! lock is held while sending. A peer whose send fails is presumed dead:
//! it is deregistered and closed, and delivery carries on with the rest.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::handle::{ConnectionId, Outbound};
use crate::connection::protocol::{Command, MessageEnvelope};
use crate::error::HandlerError;
use crate::relay::handler::{CommandHandler, HandlerContext};
use crate::relay::registry::Registry;

/// Payload of a `BROADCAST` command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
    /// Overrides the server's sender policy for this message
    #[serde(default, rename = "excludeSender")]
    pub exclude_sender: Option<bool>,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was queued for
    pub delivered: usize,
    /// Peers removed because their send failed
    pub pruned: usize,
}

pub struct Broadcaster {
    include_sender: bool,
}

impl Broadcaster {
    pub const COMMAND: &'static str = "BROADCAST";

    /// `include_sender` decides whether the sender receives its own message
    /// when the request does not say otherwise.
    pub fn new(include_sender: bool) -> Self {
        Self { include_sender }
    }

    /// Queue `frame` for every open member of `registry`, optionally
    /// skipping `exclude`.
    pub fn fanout(
        &self,
        registry: &Registry,
        exclude: Option<ConnectionId>,
        frame: Outbound,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for peer in registry.snapshot() {
            if Some(peer.id()) == exclude {
                continue;
            }
            match peer.send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(conn_id = %peer.id(), error = %e, "Dropping unreachable peer");
                    registry.remove(peer.id());
                    peer.close();
                    report.pruned += 1;
                }
            }
        }

        report
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl CommandHandler for Broadcaster {
    fn name(&self) -> &'static str {
        Self::COMMAND
    }

    async fn handle(&self, ctx: &HandlerContext, command: &Command) -> Result<(), HandlerError> {
        let request: BroadcastRequest =
            command
                .parse_payload()
                .map_err(|e| HandlerError::InvalidPayload {
                    command: Self::COMMAND.to_string(),
                    reason: e.to_string(),
                })?;

        let include_sender = request
            .exclude_sender
            .map_or(self.include_sender, |exclude| !exclude);
        let exclude = (!include_sender).then(|| ctx.connection.id());

        let frame: Outbound = MessageEnvelope::new(request.message)
            .to_json()
            .map_err(|e| HandlerError::Failed(format!("Failed to encode broadcast: {e}")))?
            .into();

        let report = self.fanout(&ctx.registry, exclude, frame);
        debug!(
            conn_id = %ctx.connection.id(),
            delivered = report.delivered,
            pruned = report.pruned,
            "Broadcast complete"
        );

        Ok(())
    }
}
