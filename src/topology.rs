//! Topology probing: asking a node whether it currently holds the primary role

use crate::connection::Connection;
use crate::protocol::constants::commands;
use crate::protocol::{CommandReply, CommandRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use bson::Bson;

/// Role reported by a probed node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// `ismaster: true`
    Primary,
    /// Anything else, including an absent or non-boolean role field
    NotPrimary,
}

impl NodeRole {
    /// Extract the role from the first document of a probe reply.
    ///
    /// A reply without documents is malformed. A missing or non-boolean
    /// `ismaster` field counts as not primary.
    pub fn from_reply(reply: &CommandReply) -> Result<Self> {
        let doc = reply
            .first()
            .ok_or_else(|| Error::Protocol("isMaster reply contained no document".into()))?;

        match doc.get(commands::IS_MASTER_FIELD) {
            Some(Bson::Boolean(true)) => Ok(NodeRole::Primary),
            Some(Bson::Boolean(false)) => Ok(NodeRole::NotPrimary),
            other => {
                tracing::debug!(field = ?other, "isMaster reply has no boolean role field");
                Ok(NodeRole::NotPrimary)
            }
        }
    }

    /// Whether the node reported the primary role
    pub fn is_primary(self) -> bool {
        self == NodeRole::Primary
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::NotPrimary => write!(f, "not-primary"),
        }
    }
}

/// Issues the role query on an authenticated connection
#[async_trait]
pub trait TopologyProber: Send + Sync {
    /// Probe the node at the other end of `conn`
    async fn probe(&self, conn: &mut Connection) -> Result<NodeRole>;
}

/// Default prober: `{isMaster: 1}` against `admin.$cmd`
#[derive(Debug, Clone, Copy, Default)]
pub struct IsMasterProber;

#[async_trait]
impl TopologyProber for IsMasterProber {
    async fn probe(&self, conn: &mut Connection) -> Result<NodeRole> {
        let request = CommandRequest::is_master();
        let reply = conn.run_command(&request.database, request.command).await?;
        let role = NodeRole::from_reply(&reply)?;
        tracing::debug!(peer = ?conn.address(), %role, "isMaster probe");
        Ok(role)
    }
}
