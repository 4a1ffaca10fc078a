//! Inbound allow rules.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::GroupId;
use super::service::Protocol;

/// The address range used for public ingress.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Where permitted traffic may come from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "group")]
pub enum SourceSelector {
    /// Members of another access group.
    Group(GroupId),
    /// Any IPv4 address.
    AnyAddress,
}

impl Display for SourceSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceSelector::Group(id) => write!(f, "{id}"),
            SourceSelector::AnyAddress => write!(f, "{ANY_IPV4}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AllowRule {
    pub source: SourceSelector,
    pub port: u16,
    pub protocol: Protocol,
}

impl AllowRule {
    pub fn from_group(group: GroupId, port: u16, protocol: Protocol) -> Self {
        AllowRule {
            source: SourceSelector::Group(group),
            port,
            protocol,
        }
    }

    pub fn from_anywhere(port: u16, protocol: Protocol) -> Self {
        AllowRule {
            source: SourceSelector::AnyAddress,
            port,
            protocol,
        }
    }

    /// Two rules with the same key are duplicates within a group.
    pub fn key(&self) -> (&SourceSelector, u16) {
        (&self.source, self.port)
    }
}

impl Display for AllowRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "allow {} -> {}/{}", self.source, self.port, self.protocol)
    }
}
