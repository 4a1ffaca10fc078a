//! The FIWARE reference deployment: context broker, its document store, the
//! sink and its relational store, plus their load balancers.

use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::compiler::Topology;
use crate::error::{Error, ManifestError};
use crate::manifest::{Bindings, embed, render, to_value};
use crate::policy::{PolicyDocument, Templated, template};
use crate::settings::Settings;
use crate::types::{AccessGroups, AddressList, ConnectivityIntent, Service};

pub const ORION_PORT: u16 = 1026;
pub const DOCDB_PORT: u16 = 27017;
pub const AURORA_PORT: u16 = 5432;
pub const CYGNUS_SERVICE_PORT: u16 = 5055;
pub const CYGNUS_API_PORT: u16 = 5080;

/// Where the finalized policy resources are spliced into a manifest.
pub const POLICY_EMBED_PATH: &str = "x-aws-cloudformation.Resources";

const SUBNETS_PATH: &str = "x-aws-cloudformation.Resources.LoadBalancer.Properties.Subnets";

/// One deployment manifest and how to finish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestSpec {
    /// File name of the template and of the rendered output.
    pub file: &'static str,
    /// Binding holding the comma-separated subnets of the load balancer.
    pub subnets_from: &'static str,
    /// Whether the edge firewall policy is attached to this manifest.
    pub edge_policy: bool,
}

pub const ORION_MANIFEST: ManifestSpec = ManifestSpec {
    file: "orion.yml",
    subnets_from: "Network.OrionPublicSubnetsIds",
    edge_policy: true,
};

pub const CYGNUS_MANIFEST: ManifestSpec = ManifestSpec {
    file: "cygnus.yml",
    subnets_from: "Network.OrionPrivateSubnetsIds",
    edge_policy: false,
};

/// Manifests to render for `settings`.
pub fn manifests(settings: &Settings) -> Vec<ManifestSpec> {
    if settings.sink_enabled() {
        vec![ORION_MANIFEST, CYGNUS_MANIFEST]
    } else {
        vec![ORION_MANIFEST]
    }
}

/// Services and intents for `settings`. The sink tier (cygnus, its load
/// balancer and aurora) is only included when the settings enable it.
pub fn reference_topology(settings: &Settings) -> Topology {
    let mut services = vec![
        Service::new("orion-alb", [ORION_PORT])
            .public_on(ORION_PORT)
            .described("Fiware-Orion allow internet access to API"),
        Service::new("orion", [ORION_PORT]).described("Fiware-Orion internal services"),
        Service::new("docdb", [DOCDB_PORT]).described("Fiware-Orion allow connection to DDB"),
    ];
    let mut intents = vec![
        ConnectivityIntent::new("orion-alb", "orion", ORION_PORT),
        ConnectivityIntent::new("orion", "docdb", DOCDB_PORT),
    ];

    if settings.sink_enabled() {
        services.extend([
            Service::new("cygnus", [CYGNUS_SERVICE_PORT, CYGNUS_API_PORT])
                .described("Fiware-Cygnus internal services"),
            Service::new("cygnus-alb", [CYGNUS_SERVICE_PORT, CYGNUS_API_PORT])
                .described("Fiware-Cygnus allow access to management API"),
            Service::new("aurora", [AURORA_PORT])
                .described("Fiware-Cygnus allow connection to Aurora psql"),
        ]);
        intents.extend([
            ConnectivityIntent::new("cygnus", "aurora", AURORA_PORT),
            ConnectivityIntent::new("orion", "cygnus", CYGNUS_SERVICE_PORT),
            ConnectivityIntent::new("orion", "cygnus", CYGNUS_API_PORT),
            ConnectivityIntent::new("cygnus-alb", "cygnus", CYGNUS_SERVICE_PORT),
            ConnectivityIntent::new("cygnus-alb", "cygnus", CYGNUS_API_PORT),
            ConnectivityIntent::new("orion", "cygnus-alb", CYGNUS_SERVICE_PORT),
        ]);
    }

    Topology::new(services, intents)
}

/// Everything one run produces before manifests are rendered.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub groups: AccessGroups,
    pub policy: Templated,
}

impl Plan {
    /// Placeholder values for the manifests.
    ///
    /// Provisioning outputs come first, then settings, then one `group.<service>`
    /// entry per access group; later sources win on a key clash.
    pub fn bindings(&self, settings: &Settings, outputs: &serde_json::Value) -> Bindings {
        let mut bindings = Bindings::from_outputs(outputs);
        bindings.extend(settings.bindings());
        bindings.extend(self.groups.bindings());
        bindings
    }

    /// Fill in `template` for `spec`.
    ///
    /// The load balancer subnets are spliced in as a list, and for the edge
    /// manifest the finalized policy resources are merged into its resources.
    pub fn render_manifest(
        &self,
        spec: &ManifestSpec,
        template: &Value,
        bindings: &Bindings,
    ) -> Result<Value, Error> {
        let mut manifest = render(template, bindings)?;

        let subnets = bindings
            .get(spec.subnets_from)
            .ok_or_else(|| ManifestError::UnboundPlaceholder(spec.subnets_from.to_string()))?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        embed(&mut manifest, SUBNETS_PATH, Value::Sequence(subnets))?;

        if spec.edge_policy {
            let resources = to_value(POLICY_EMBED_PATH, &self.policy.document.resources)?;
            embed(&mut manifest, POLICY_EMBED_PATH, resources)?;
        }
        debug!(
            event = "Plan",
            phase = "Render",
            manifest = spec.file,
            edge_policy = spec.edge_policy
        );
        Ok(manifest)
    }
}

/// Compile the reference topology and template the edge policy.
///
/// The two steps are independent; a config error in either aborts the plan.
pub fn plan(
    settings: &Settings,
    base: PolicyDocument,
    allow: Option<&AddressList>,
    deny: Option<&AddressList>,
) -> Result<Plan, Error> {
    let groups = reference_topology(settings).compile()?;
    let policy = template(base, allow, deny)?;
    info!(
        event = "Plan",
        phase = "Done",
        groups = groups.len(),
        rules = groups.rule_count(),
        resources = policy.document.resources.len()
    );
    Ok(Plan { groups, policy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Sink;
    use crate::types::{GroupId, SourceSelector};

    fn with_sink() -> Settings {
        let mut settings = Settings::default();
        settings.fiware.cygnus = Some(Sink::default());
        settings
    }

    #[test]
    fn test_broker_only_topology() {
        let groups = reference_topology(&Settings::default()).compile().unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups.for_service("cygnus").is_none());
        assert_eq!(groups.rule_count(), 3);
    }

    #[test]
    fn test_full_topology_rules() {
        let groups = reference_topology(&with_sink()).compile().unwrap();
        assert_eq!(groups.len(), 6);

        let cygnus = groups.for_service("cygnus").unwrap();
        assert_eq!(cygnus.rules().len(), 4);
        let from_orion = cygnus
            .rules()
            .iter()
            .filter(|r| r.source == SourceSelector::Group(GroupId::new("sg-orion")))
            .count();
        assert_eq!(from_orion, 2);

        assert_eq!(groups.for_service("aurora").unwrap().rules().len(), 1);
        assert_eq!(groups.for_service("cygnus-alb").unwrap().rules().len(), 1);
        assert_eq!(groups.rule_count(), 9);
    }

    #[test]
    fn test_only_the_broker_balancer_is_public() {
        let groups = reference_topology(&with_sink()).compile().unwrap();
        let public: Vec<&str> = groups
            .iter()
            .filter(|g| g.rules().iter().any(|r| r.source == SourceSelector::AnyAddress))
            .map(|g| g.service().as_str())
            .collect();
        assert_eq!(public, vec!["orion-alb"]);
    }

    #[test]
    fn test_groups_describe_their_purpose() {
        let groups = reference_topology(&with_sink()).compile().unwrap();
        let described: Vec<(&str, &str)> = groups
            .iter()
            .map(|g| (g.service().as_str(), g.description()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("orion-alb", "Fiware-Orion allow internet access to API"),
                ("orion", "Fiware-Orion internal services"),
                ("docdb", "Fiware-Orion allow connection to DDB"),
                ("cygnus", "Fiware-Cygnus internal services"),
                ("cygnus-alb", "Fiware-Cygnus allow access to management API"),
                ("aurora", "Fiware-Cygnus allow connection to Aurora psql"),
            ]
        );
    }

    #[test]
    fn test_manifests_follow_sink_setting() {
        assert_eq!(manifests(&Settings::default()), vec![ORION_MANIFEST]);
        assert_eq!(manifests(&with_sink()), vec![ORION_MANIFEST, CYGNUS_MANIFEST]);
    }

    fn outputs() -> serde_json::Value {
        serde_json::json!({
            "Network": {
                "OrionVPCId": "vpc-1",
                "OrionPublicSubnetsIds": "subnet-a,subnet-b",
                "OrionPrivateSubnetsIds": "subnet-c"
            }
        })
    }

    fn broker_plan() -> Plan {
        plan(
            &Settings::default(),
            PolicyDocument::base().unwrap(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_bindings_carry_group_ids() {
        let plan = broker_plan();
        let bindings = plan.bindings(&Settings::default(), &outputs());
        assert_eq!(bindings.get("group.orion"), Some("sg-orion"));
        assert_eq!(bindings.get("group.orion-alb"), Some("sg-orion-alb"));
        assert_eq!(bindings.get("orion.image"), Some("fiware/orion"));
        assert_eq!(bindings.get("Network.OrionVPCId"), Some("vpc-1"));
    }

    #[test]
    fn test_render_edge_manifest_embeds_policy() {
        let plan = broker_plan();
        let bindings = plan.bindings(&Settings::default(), &outputs());
        let template: Value = serde_yaml::from_str(
            r#"
x-aws-vpc: "{{ Network.OrionVPCId }}"
x-aws-cloudformation:
  Resources:
    LoadBalancer:
      Properties:
        SecurityGroups: ["{{ group.orion-alb }}"]
"#,
        )
        .unwrap();
        let manifest = plan.render_manifest(&ORION_MANIFEST, &template, &bindings).unwrap();
        let resources = &manifest["x-aws-cloudformation"]["Resources"];
        assert_eq!(manifest["x-aws-vpc"].as_str(), Some("vpc-1"));
        assert_eq!(
            resources["LoadBalancer"]["Properties"]["SecurityGroups"][0].as_str(),
            Some("sg-orion-alb")
        );
        assert_eq!(
            resources["LoadBalancer"]["Properties"]["Subnets"][1].as_str(),
            Some("subnet-b")
        );
        assert_eq!(resources["WebACL"]["Type"].as_str(), Some("RuleGroup"));
        assert!(resources.get("IPAllowList").is_none());
    }

    #[test]
    fn test_render_without_subnets_binding_fails() {
        let plan = broker_plan();
        let bindings = plan.bindings(&Settings::default(), &serde_json::json!({}));
        let err = plan
            .render_manifest(&CYGNUS_MANIFEST, &Value::Null, &bindings)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(ManifestError::UnboundPlaceholder(ref key)) if key == "Network.OrionPrivateSubnetsIds"
        ));
    }

    #[test]
    fn test_plan_combines_groups_and_policy() {
        let allow = AddressList::parse(["127.0.0.1/32"]).unwrap();
        let plan = plan(
            &Settings::default(),
            PolicyDocument::base().unwrap(),
            allow.as_ref(),
            None,
        )
        .unwrap();
        assert_eq!(plan.groups.len(), 3);
        assert!(plan.policy.document.contains("IPAllowList"));
        assert!(!plan.policy.document.contains("IPDenyList"));
    }
}
