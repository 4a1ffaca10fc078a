use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::types::{AddressList, ListKind};

use super::{PolicyDocument, PolicyResource};

/// Where one optional list lands in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSlot {
    pub kind: ListKind,
    /// Address-list resource holding the entries.
    pub resource: &'static str,
    /// Rule inside the consumer that matches against the list.
    pub rule: &'static str,
    /// Rule group that owns the rule and depends on the list.
    pub consumer: &'static str,
}

pub const ALLOW_SLOT: ListSlot = ListSlot {
    kind: ListKind::Allow,
    resource: "IPAllowList",
    rule: "ip-allow-list",
    consumer: "WebACL",
};

pub const DENY_SLOT: ListSlot = ListSlot {
    kind: ListKind::Deny,
    resource: "IPDenyList",
    rule: "ip-deny-list",
    consumer: "WebACL",
};

impl ListSlot {
    pub fn for_kind(kind: ListKind) -> ListSlot {
        match kind {
            ListKind::Allow => ALLOW_SLOT,
            ListKind::Deny => DENY_SLOT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum ListState {
    PresentNonEmpty,
    AbsentOrEmpty,
}

impl ListState {
    pub fn of(list: Option<&AddressList>) -> ListState {
        match list {
            Some(list) if !list.is_empty() => ListState::PresentNonEmpty,
            _ => ListState::AbsentOrEmpty,
        }
    }
}

/// How loudly a branch reported its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
pub enum Notice {
    Quiet,
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchOutcome {
    pub kind: ListKind,
    pub state: ListState,
    pub notice: Notice,
}

/// A finished document together with what each branch decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Templated {
    pub document: PolicyDocument,
    pub outcomes: [BranchOutcome; 2],
}

impl Templated {
    pub fn warnings(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.notice == Notice::Warning)
            .count()
    }

    pub fn outcome(&self, kind: ListKind) -> &BranchOutcome {
        match kind {
            ListKind::Allow => &self.outcomes[0],
            ListKind::Deny => &self.outcomes[1],
        }
    }
}

/// Fill in or strip the allow and deny lists of `base`.
///
/// Each list is handled on its own by [`apply_branch`]; the branches touch
/// disjoint resources, so their order does not matter. The result is validated
/// once at the end and any dangling reference is an error.
pub fn template(
    mut base: PolicyDocument,
    allow: Option<&AddressList>,
    deny: Option<&AddressList>,
) -> Result<Templated, ConfigError> {
    let allow_outcome = apply_branch(&mut base, ListKind::Allow, allow)?;
    let deny_outcome = apply_branch(&mut base, ListKind::Deny, deny)?;
    base.validate()?;

    Ok(Templated {
        document: base,
        outcomes: [allow_outcome, deny_outcome],
    })
}

/// Run one list's branch against `doc`.
///
/// | kind  | state           | effect                        | log   |
/// |-------|-----------------|-------------------------------|-------|
/// | allow | present         | materialize list, link rule   | debug |
/// | deny  | present         | materialize list, link rule   | debug |
/// | allow | absent or empty | drop list, rule and edges     | warn  |
/// | deny  | absent or empty | drop list, rule and edges     | info  |
///
/// Does not validate; [`template`] does that after both branches ran.
pub fn apply_branch(
    doc: &mut PolicyDocument,
    kind: ListKind,
    list: Option<&AddressList>,
) -> Result<BranchOutcome, ConfigError> {
    let slot = ListSlot::for_kind(kind);
    let state = ListState::of(list);

    let notice = match (kind, state, list) {
        (ListKind::Allow, ListState::PresentNonEmpty, Some(list)) => {
            materialize(doc, &slot, list)?;
            debug!(event = "Template", phase = "AllowList", entries = list.len());
            Notice::Quiet
        }
        (ListKind::Deny, ListState::PresentNonEmpty, Some(list)) => {
            materialize(doc, &slot, list)?;
            debug!(event = "Template", phase = "DenyList", entries = list.len());
            Notice::Quiet
        }
        (ListKind::Allow, _, _) => {
            retract(doc, &slot)?;
            warn!(
                event = "Template",
                phase = "AllowList",
                "allow list is empty, the service becomes publicly reachable"
            );
            Notice::Warning
        }
        (ListKind::Deny, _, _) => {
            retract(doc, &slot)?;
            info!(event = "Template", phase = "DenyList", "deny list is empty");
            Notice::Info
        }
    };

    Ok(BranchOutcome {
        kind,
        state,
        notice,
    })
}

fn materialize(
    doc: &mut PolicyDocument,
    slot: &ListSlot,
    list: &AddressList,
) -> Result<(), ConfigError> {
    let consumer = doc
        .resources
        .get_mut(slot.consumer)
        .ok_or_else(|| ConfigError::MissingResource(slot.consumer.to_string()))?;
    let rule = consumer
        .rule_mut(slot.rule)
        .ok_or_else(|| ConfigError::MissingResource(format!("{}/{}", slot.consumer, slot.rule)))?;
    rule.address_list = Some(slot.resource.to_string());
    consumer.depends_on.insert(slot.resource.to_string());

    let entries = list.entries().to_vec();
    match doc.resources.get_mut(slot.resource) {
        Some(existing) => existing.addresses = entries,
        None => {
            doc.resources.insert(
                slot.resource.to_string(),
                PolicyResource::address_list(entries),
            );
        }
    }
    Ok(())
}

fn retract(doc: &mut PolicyDocument, slot: &ListSlot) -> Result<(), ConfigError> {
    let consumer = doc
        .resources
        .get_mut(slot.consumer)
        .ok_or_else(|| ConfigError::MissingResource(slot.consumer.to_string()))?;
    consumer.rules.retain(|r| r.name != slot.rule);

    doc.resources.remove(slot.resource);
    for resource in doc.resources.values_mut() {
        resource.depends_on.remove(slot.resource);
    }
    Ok(())
}
