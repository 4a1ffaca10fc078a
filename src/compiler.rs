use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::ConfigError;
use crate::naming::assign_group_ids;
use crate::types::{
    AccessGroup, AccessGroups, AllowRule, ConnectivityIntent, GroupId, Service, ServiceId,
};

/// A declared set of services and the paths between them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Topology {
    pub services: Vec<Service>,
    pub intents: Vec<ConnectivityIntent>,
}

impl Topology {
    pub fn new(services: Vec<Service>, intents: Vec<ConnectivityIntent>) -> Self {
        Topology { services, intents }
    }

    pub fn compile(&self) -> Result<AccessGroups, ConfigError> {
        compile(&self.services, &self.intents)
    }
}

/// Derive one access group per service and the allow rules every intent needs.
///
/// Each intent becomes a rule on the destination's group admitting the source's
/// group on the intent's port; each public service gets one rule admitting any
/// address on its public port. Identical (source, port) pairs collapse.
///
/// An intent whose port is not a declared listener of its destination is still
/// honoured, with a warning.
///
/// Either every group is returned or a [`ConfigError`] is; there is no partial output.
pub fn compile(
    services: &[Service],
    intents: &[ConnectivityIntent],
) -> Result<AccessGroups, ConfigError> {
    debug!(
        event = "Compile",
        phase = "Start",
        services = services.len(),
        intents = intents.len()
    );

    let group_ids = assign_group_ids(services.iter().map(Service::id))?;
    let by_id: BTreeMap<&ServiceId, &Service> = services.iter().map(|s| (s.id(), s)).collect();

    for service in services {
        if service.public_port() == Some(0) {
            return Err(ConfigError::InvalidPort(format!(
                "public port of service '{}'",
                service.id()
            )));
        }
    }

    // Resolve every intent before building anything.
    let mut resolved: Vec<(&ConnectivityIntent, &GroupId, &Service)> =
        Vec::with_capacity(intents.len());
    for intent in intents {
        if intent.port == 0 {
            return Err(ConfigError::InvalidPort(format!("intent {intent}")));
        }
        let source_group = group_ids.get(&intent.source).ok_or_else(|| {
            ConfigError::UnknownService {
                intent: intent.to_string(),
                service: intent.source.to_string(),
            }
        })?;
        let destination = by_id.get(&intent.destination).copied().ok_or_else(|| {
            ConfigError::UnknownService {
                intent: intent.to_string(),
                service: intent.destination.to_string(),
            }
        })?;
        resolved.push((intent, source_group, destination));
    }

    let mut groups: Vec<AccessGroup> = services
        .iter()
        .map(|s| {
            let group = AccessGroup::new(group_ids[s.id()].clone(), s.id().clone());
            match s.description() {
                Some(description) => group.with_description(description),
                None => group,
            }
        })
        .collect();
    let position: BTreeMap<&ServiceId, usize> = services
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id(), i))
        .collect();

    for (intent, source_group, destination) in resolved {
        if destination.listener(intent.port).is_none() {
            warn!(
                event = "Compile",
                phase = "Intent",
                intent = intent.to_string(),
                "port is not a declared listener of the destination; allowing it anyway"
            );
        }
        let rule = AllowRule::from_group(
            source_group.clone(),
            intent.port,
            destination.protocol_for(intent.port),
        );
        let group = &mut groups[position[destination.id()]];
        if !group.add_rule(rule) {
            debug!(
                event = "Compile",
                phase = "Intent",
                intent = intent.to_string(),
                "duplicate intent collapsed"
            );
        }
    }

    for service in services {
        let Some(port) = service.public_port() else {
            continue;
        };
        let rule = AllowRule::from_anywhere(port, service.protocol_for(port));
        info!(
            event = "Compile",
            phase = "PublicIngress",
            service = service.id().to_string(),
            port
        );
        groups[position[service.id()]].add_rule(rule);
    }

    let groups = AccessGroups::from_vec(groups);
    debug!(
        event = "Compile",
        phase = "Done",
        groups = groups.len(),
        rules = groups.rule_count()
    );
    Ok(groups)
}
