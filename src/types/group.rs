//! Access groups and collections of them.

use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{GroupId, ServiceId};
use super::rule::AllowRule;

/// The inbound rules governing traffic to one service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccessGroup {
    id: GroupId,
    service: ServiceId,
    description: String,
    rules: Vec<AllowRule>,
}

impl AccessGroup {
    /// Create an empty group for `service`.
    pub fn new(id: GroupId, service: ServiceId) -> Self {
        let description = format!("{service} internal services");
        AccessGroup {
            id,
            service,
            description,
            rules: Vec::new(),
        }
    }

    /// Replace the default description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Rules in insertion order.
    pub fn rules(&self) -> &[AllowRule] {
        &self.rules
    }

    /// Append `rule` unless a rule with the same source and port already exists.
    ///
    /// Returns `true` if the rule was added.
    pub(crate) fn add_rule(&mut self, rule: AllowRule) -> bool {
        if self.rules.iter().any(|r| r.key() == rule.key()) {
            return false;
        }
        self.rules.push(rule);
        true
    }
}

impl Display for AccessGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({} rules)", self.id, self.rules.len())
    }
}

/// The complete, ordered output of one compile: one group per service, in the
/// order the services were declared.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccessGroups(Vec<AccessGroup>);

impl AccessGroups {
    pub(crate) fn from_vec(groups: Vec<AccessGroup>) -> Self {
        AccessGroups(groups)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessGroup> {
        self.0.iter()
    }

    /// The group belonging to `service`.
    pub fn for_service(&self, service: &str) -> Option<&AccessGroup> {
        self.0.iter().find(|g| g.service.as_str() == service)
    }

    /// Total number of rules across every group.
    pub fn rule_count(&self) -> usize {
        self.0.iter().map(|g| g.rules.len()).sum()
    }

    /// Stable lookup keys for downstream substitution: `group.<service>` maps
    /// to the group id.
    pub fn bindings(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.0
            .iter()
            .map(|g| (format!("group.{}", g.service), g.id.to_string()))
    }
}

impl Display for AccessGroups {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}]", self.0.iter().map(|g| &g.id).join(", "))
    }
}

impl<'a> IntoIterator for &'a AccessGroups {
    type Item = &'a AccessGroup;
    type IntoIter = std::slice::Iter<'a, AccessGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
