//! Edge firewall policy documents.
//!
//! A document is a map from resource name to resource. Resources point at each
//! other in two ways: through `DependsOn` (must exist first) and through a rule's
//! `AddressList` (the list the rule matches against). A finished document never
//! points at a resource it does not contain; [`PolicyDocument::validate`] checks that.

mod templater;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{ConfigError, Error};

pub use templater::{
    ALLOW_SLOT, BranchOutcome, DENY_SLOT, ListSlot, ListState, Notice, Templated, apply_branch,
    template,
};

/// The base template shipped with the crate.
pub const BASE_TEMPLATE: &str = include_str!("../../templates/edge-policy.json");

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum ResourceKind {
    AddressList,
    RuleGroup,
    Association,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum RuleAction {
    Allow,
    Block,
    Count,
}

/// One rule inside a rule group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyRule {
    pub name: String,
    pub priority: u32,
    pub action: RuleAction,
    /// Name of the address-list resource this rule matches against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_list: Option<String>,
    /// Match requests whose source is *not* in the address list.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    /// Requests per five minutes before the rule fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyResource {
    #[serde(rename = "Type")]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<RuleAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
    /// Provider-specific settings passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl PolicyResource {
    pub fn address_list(addresses: Vec<String>) -> Self {
        PolicyResource {
            kind: ResourceKind::AddressList,
            depends_on: BTreeSet::new(),
            addresses,
            default_action: None,
            rules: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn rule(&self, name: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub(crate) fn rule_mut(&mut self, name: &str) -> Option<&mut PolicyRule> {
        self.rules.iter_mut().find(|r| r.name == name)
    }

    /// Names of every resource this one refers to.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.depends_on
            .iter()
            .map(String::as_str)
            .chain(self.rules.iter().filter_map(|r| r.address_list.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resources: BTreeMap<String, PolicyResource>,
}

impl PolicyDocument {
    /// The template shipped with the crate.
    pub fn base() -> Result<Self, Error> {
        Self::from_json(BASE_TEMPLATE)
    }

    /// Parse a document and check it for dangling references.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let doc: PolicyDocument = serde_json::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&PolicyResource> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Every (resource, referenced name) pair whose target is missing.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.resources
            .iter()
            .flat_map(|(name, res)| res.references().map(move |target| (name, target)))
            .filter(|(_, target)| !self.resources.contains_key(*target))
            .map(|(name, target)| (name.clone(), target.to_string()))
            .collect()
    }

    /// Walk every reference once and fail on the first that does not resolve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.dangling_references().into_iter().next() {
            Some((resource, missing)) => Err(ConfigError::DanglingReference { resource, missing }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_template_parses_and_is_consistent() {
        let doc = PolicyDocument::base().unwrap();
        assert!(doc.contains("WebACL"));
        assert!(doc.contains("IPAllowList"));
        assert!(doc.contains("IPDenyList"));
        assert!(doc.dangling_references().is_empty());
    }

    #[test]
    fn test_base_template_rules() {
        let doc = PolicyDocument::base().unwrap();
        let acl = doc.get("WebACL").unwrap();
        assert_eq!(acl.kind, ResourceKind::RuleGroup);
        assert_eq!(acl.default_action, Some(RuleAction::Allow));
        assert_eq!(
            acl.rule("ip-allow-list").unwrap().address_list.as_deref(),
            Some("IPAllowList")
        );
        assert!(acl.rule("ip-allow-list").unwrap().negate);
        assert_eq!(acl.rule("rate-limit").unwrap().rate_limit, Some(2000));
    }

    #[test]
    fn test_validate_reports_dangling_depends_on() {
        let mut doc = PolicyDocument::base().unwrap();
        doc.resources.remove("IPDenyList");
        let err = doc.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DanglingReference { ref missing, .. } if missing == "IPDenyList"
        ));
    }

    #[test]
    fn test_validate_reports_dangling_rule_reference() {
        let mut doc = PolicyDocument::base().unwrap();
        doc.resources
            .get_mut("WebACL")
            .unwrap()
            .depends_on
            .remove("IPDenyList");
        doc.resources.remove("IPDenyList");
        let err = doc.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::DanglingReference {
                resource: "WebACL".to_string(),
                missing: "IPDenyList".to_string(),
            }
        );
    }

    #[test]
    fn test_from_json_rejects_dangling_template() {
        let text = r#"{
            "Resources": {
                "Assoc": { "Type": "Association", "DependsOn": ["Nowhere"] }
            }
        }"#;
        assert!(matches!(
            PolicyDocument::from_json(text),
            Err(Error::Config(ConfigError::DanglingReference { .. }))
        ));
    }

    #[test]
    fn test_from_json_rejects_unknown_kind() {
        let text = r#"{ "Resources": { "X": { "Type": "Teleporter" } } }"#;
        assert!(matches!(PolicyDocument::from_json(text), Err(Error::Json(_))));
    }

    #[test]
    fn test_empty_collections_are_not_serialized() {
        let doc = PolicyDocument {
            description: None,
            resources: BTreeMap::from([(
                "L".to_string(),
                PolicyResource::address_list(vec!["10.0.0.0/8".to_string()]),
            )]),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({
                "Resources": { "L": { "Type": "AddressList", "Addresses": ["10.0.0.0/8"] } }
            })
        );
    }
}
