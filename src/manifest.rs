//! Placeholder substitution for per-service deployment manifests.
//!
//! Manifests are YAML documents. Any string scalar may contain `{{ key }}`
//! placeholders, which are replaced from a [`Bindings`] lookup. Structured
//! values (the finalized policy document, subnet lists) are spliced in with
//! [`embed`].

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::ManifestError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

/// Key-value lookup used to fill placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten nested provisioning outputs into dotted keys:
    /// `{"Network": {"VpcId": "vpc-1"}}` becomes `Network.VpcId = vpc-1`.
    /// Numbers and booleans are stringified; arrays are joined with `,`.
    pub fn from_outputs(outputs: &serde_json::Value) -> Self {
        let mut bindings = Bindings::new();
        flatten_into(&mut bindings, String::new(), outputs);
        bindings
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Bindings {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut bindings = Bindings::new();
        bindings.extend(iter);
        bindings
    }
}

fn flatten_into(bindings: &mut Bindings, prefix: String, value: &serde_json::Value) {
    use serde_json::Value as J;
    let scalar = match value {
        J::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(bindings, key, v);
            }
            return;
        }
        J::Array(items) => items
            .iter()
            .map(|i| match i {
                J::String(s) => s.clone(),
                other => other.to_string(),
            })
            .join(","),
        J::String(s) => s.clone(),
        J::Null => return,
        other => other.to_string(),
    };
    if !prefix.is_empty() {
        bindings.insert(prefix, scalar);
    }
}

/// Replace every placeholder in `text`.
pub fn substitute(text: &str, bindings: &Bindings) -> Result<String, ManifestError> {
    let mut missing: Option<String> = None;
    let out = PLACEHOLDER.replace_all(text, |caps: &Captures| {
        let key = &caps[1];
        match bindings.get(key) {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(ManifestError::UnboundPlaceholder(key)),
        None => Ok(out.into_owned()),
    }
}

/// Return a copy of `template` with every placeholder in every string scalar
/// replaced. Mapping keys are left alone.
pub fn render(template: &Value, bindings: &Bindings) -> Result<Value, ManifestError> {
    match template {
        Value::String(s) => Ok(Value::String(substitute(s, bindings)?)),
        Value::Sequence(items) => items
            .iter()
            .map(|i| render(i, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render(v, bindings)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.as_ref().clone();
            tagged.value = render(&tagged.value, bindings)?;
            Ok(Value::Tagged(Box::new(tagged)))
        }
        other => Ok(other.clone()),
    }
}

/// Place `value` at the dotted `path` inside `manifest`, creating mappings on
/// the way. If both the existing value and `value` are mappings their keys are
/// merged, with `value` winning.
pub fn embed(manifest: &mut Value, path: &str, value: Value) -> Result<(), ManifestError> {
    let mut current = manifest;
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();

    for segment in &segments {
        if current.is_null() {
            *current = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = current else {
            return Err(ManifestError::NotAMapping {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        };
        current = map
            .entry(Value::String(segment.to_string()))
            .or_insert(Value::Null);
    }

    match (current, value) {
        (Value::Mapping(existing), Value::Mapping(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        (slot, value) => *slot = value,
    }
    debug!(event = "Manifest", phase = "Embed", path);
    Ok(())
}

/// Serialize any value into YAML form for [`embed`].
pub fn to_value<T: Serialize>(path: &str, value: &T) -> Result<Value, ManifestError> {
    serde_yaml::to_value(value).map_err(|e| ManifestError::Conversion {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn bindings() -> Bindings {
        [
            ("vpc.id", "vpc-123"),
            ("group.orion", "sg-orion"),
            ("docdb.endpoint", "docdb.cluster.local"),
        ]
        .into_iter()
        .collect()
    }

    #[parameterized(
        whole_value = { "{{ vpc.id }}", "vpc-123" },
        no_spaces = { "{{vpc.id}}", "vpc-123" },
        embedded = { "mongodb://{{ docdb.endpoint }}:27017", "mongodb://docdb.cluster.local:27017" },
        two = { "{{ vpc.id }}/{{ group.orion }}", "vpc-123/sg-orion" },
        none = { "plain text", "plain text" },
    )]
    fn test_substitute(input: &str, expected: &str) {
        assert_eq!(substitute(input, &bindings()).unwrap(), expected);
    }

    #[test]
    fn test_substitute_unbound_is_error() {
        let err = substitute("{{ vpc.id }} {{ nope }}", &bindings()).unwrap_err();
        assert!(matches!(err, ManifestError::UnboundPlaceholder(ref k) if k == "nope"));
    }

    #[test]
    fn test_render_walks_nested_values() {
        let template: Value = serde_yaml::from_str(
            r#"
x-aws-vpc: "{{ vpc.id }}"
networks:
  orion-sg:
    name: "{{ group.orion }}"
services:
  orion:
    ports: [1026]
    environment:
      - "DOCDB_ENDPOINT={{ docdb.endpoint }}"
"#,
        )
        .unwrap();
        let rendered = render(&template, &bindings()).unwrap();
        assert_eq!(rendered["x-aws-vpc"].as_str(), Some("vpc-123"));
        assert_eq!(rendered["networks"]["orion-sg"]["name"].as_str(), Some("sg-orion"));
        assert_eq!(
            rendered["services"]["orion"]["environment"][0].as_str(),
            Some("DOCDB_ENDPOINT=docdb.cluster.local")
        );
        assert_eq!(rendered["services"]["orion"]["ports"][0].as_u64(), Some(1026));
    }

    #[test]
    fn test_embed_creates_path() {
        let mut manifest = Value::Mapping(Mapping::new());
        embed(&mut manifest, "a.b.c", Value::String("x".to_string())).unwrap();
        assert_eq!(manifest["a"]["b"]["c"].as_str(), Some("x"));
    }

    #[test]
    fn test_embed_merges_mappings() {
        let mut manifest: Value =
            serde_yaml::from_str("Resources:\n  LoadBalancer:\n    Type: lb\n").unwrap();
        let incoming: Value = serde_yaml::from_str("WebACL:\n  Type: RuleGroup\n").unwrap();
        embed(&mut manifest, "Resources", incoming).unwrap();
        assert_eq!(manifest["Resources"]["LoadBalancer"]["Type"].as_str(), Some("lb"));
        assert_eq!(manifest["Resources"]["WebACL"]["Type"].as_str(), Some("RuleGroup"));
    }

    #[test]
    fn test_embed_through_scalar_is_error() {
        let mut manifest: Value = serde_yaml::from_str("a: 1\n").unwrap();
        let err = embed(&mut manifest, "a.b", Value::Null).unwrap_err();
        assert!(matches!(err, ManifestError::NotAMapping { ref segment, .. } if segment == "b"));
    }

    #[test]
    fn test_bindings_from_outputs() {
        let outputs = serde_json::json!({
            "Network": {
                "OrionVPCId": "vpc-1",
                "OrionPublicSubnetsIds": "subnet-a,subnet-b"
            },
            "DocumentdbStack": { "Docdbendpoint": "docdb.local", "Port": 27017 },
            "Empty": null
        });
        let bindings = Bindings::from_outputs(&outputs);
        assert_eq!(bindings.get("Network.OrionVPCId"), Some("vpc-1"));
        assert_eq!(bindings.get("DocumentdbStack.Port"), Some("27017"));
        assert_eq!(bindings.get("Empty"), None);
        assert_eq!(bindings.len(), 4);
    }

    #[test]
    fn test_bindings_from_array_output() {
        let outputs = serde_json::json!({ "Subnets": ["subnet-a", "subnet-b"] });
        let bindings = Bindings::from_outputs(&outputs);
        assert_eq!(bindings.get("Subnets"), Some("subnet-a,subnet-b"));
    }
}
