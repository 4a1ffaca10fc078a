//! Group identity derived from service identifiers.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;
use crate::types::{GroupId, ServiceId};

/// Prefix of every generated group id.
pub const GROUP_PREFIX: &str = "sg-";

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Derive the group id for `service`: lower-case, runs of anything that is not
/// `[a-z0-9]` collapsed into one `-`, leading and trailing `-` dropped.
///
/// `"Orion ALB"` and `"orion-alb"` both become `sg-orion-alb`; callers that hold
/// several ids must use [`assign_group_ids`] to catch that.
pub fn group_id_for(service: &ServiceId) -> Result<GroupId, ConfigError> {
    let lowered = service.as_str().to_ascii_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return Err(ConfigError::InvalidServiceId(service.to_string()));
    }
    Ok(GroupId::new(format!("{GROUP_PREFIX}{slug}")))
}

/// Map every service to its group id, failing if two services share a group id.
pub fn assign_group_ids<'a, I>(services: I) -> Result<BTreeMap<ServiceId, GroupId>, ConfigError>
where
    I: IntoIterator<Item = &'a ServiceId>,
{
    let mut owners: BTreeMap<GroupId, &ServiceId> = BTreeMap::new();
    let mut assigned = BTreeMap::new();

    for service in services {
        let group = group_id_for(service)?;
        if let Some(first) = owners.get(&group) {
            if *first == service {
                return Err(ConfigError::DuplicateService(service.to_string()));
            }
            return Err(ConfigError::GroupNameCollision {
                first: first.to_string(),
                second: service.to_string(),
                group: group.to_string(),
            });
        }
        owners.insert(group.clone(), service);
        assigned.insert(service.clone(), group);
    }

    Ok(assigned)
}
