//! Operator settings for a deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::error::{DegradedInputWarning, Error};
use crate::loader::{LoadedList, read_file};
use crate::types::AddressList;

fn default_cpu() -> u32 {
    1024
}

fn default_memory_limit_mib() -> u32 {
    2048
}

fn default_desired_count() -> u32 {
    1
}

fn default_ddb_user() -> String {
    "awsdemo".to_string()
}

fn default_db_username() -> String {
    "postgres".to_string()
}

/// Task sizing shared by every service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sizing {
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory_limit_mib", rename = "memoryLimitMiB")]
    pub memory_limit_mib: u32,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
}

impl Default for Sizing {
    fn default() -> Self {
        Sizing {
            cpu: default_cpu(),
            memory_limit_mib: default_memory_limit_mib(),
            desired_count: default_desired_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Broker {
    #[serde(flatten)]
    pub sizing: Sizing,
    /// Run the NGSI-LD flavour of the broker.
    #[serde(default, rename = "orionLD")]
    pub orion_ld: bool,
    #[serde(default = "default_ddb_user", rename = "ddbuser")]
    pub ddb_user: String,
}

impl Default for Broker {
    fn default() -> Self {
        Broker {
            sizing: Sizing::default(),
            orion_ld: false,
            ddb_user: default_ddb_user(),
        }
    }
}

impl Broker {
    pub fn image(&self) -> &'static str {
        if self.orion_ld {
            "fiware/orion-ld"
        } else {
            "fiware/orion"
        }
    }

    pub fn health_check_path(&self) -> &'static str {
        if self.orion_ld {
            "/ngsi-ld/ex/v1/version"
        } else {
            "/version"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Relational {
    #[serde(default = "default_db_username")]
    pub dbusername: String,
}

impl Default for Relational {
    fn default() -> Self {
        Relational {
            dbusername: default_db_username(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sink {
    #[serde(flatten)]
    pub sizing: Sizing,
    #[serde(default)]
    pub aurora: Relational,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Fiware {
    #[serde(default)]
    pub orion: Broker,
    /// The sink tier is only deployed when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cygnus: Option<Sink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// CIDR ranges allowed through the edge firewall when no allow-list file is given.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub fiware: Fiware,
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn sink_enabled(&self) -> bool {
        self.fiware.cygnus.is_some()
    }

    /// The `allowedIps` setting as an allow list.
    ///
    /// Behaves like a list file: empty means absent, an invalid entry is a
    /// warning and the whole list is dropped.
    pub fn allow_list(&self, origin: &Path) -> LoadedList {
        match AddressList::parse(&self.allowed_ips) {
            Ok(list) => LoadedList {
                list,
                warning: None,
            },
            Err(entry) => {
                let warning = DegradedInputWarning::InvalidCidr {
                    path: origin.to_path_buf(),
                    entry,
                };
                warn!(event = "Load", phase = "Settings", warning = %warning, "ignoring allowedIps");
                LoadedList {
                    list: None,
                    warning: Some(warning),
                }
            }
        }
    }

    /// Values the manifests can refer to, keyed `orion.*` and `cygnus.*`.
    pub fn bindings(&self) -> Vec<(String, String)> {
        let orion = &self.fiware.orion;
        let mut out = vec![
            ("orion.image".to_string(), orion.image().to_string()),
            (
                "orion.health_check_path".to_string(),
                orion.health_check_path().to_string(),
            ),
            ("orion.cpu".to_string(), orion.sizing.cpu.to_string()),
            (
                "orion.memory".to_string(),
                orion.sizing.memory_limit_mib.to_string(),
            ),
            (
                "orion.desired_count".to_string(),
                orion.sizing.desired_count.to_string(),
            ),
            ("orion.db_user".to_string(), orion.ddb_user.clone()),
        ];
        if let Some(cygnus) = &self.fiware.cygnus {
            out.extend([
                ("cygnus.cpu".to_string(), cygnus.sizing.cpu.to_string()),
                (
                    "cygnus.memory".to_string(),
                    cygnus.sizing.memory_limit_mib.to_string(),
                ),
                (
                    "cygnus.desired_count".to_string(),
                    cygnus.sizing.desired_count.to_string(),
                ),
                ("cygnus.db_user".to_string(), cygnus.aurora.dbusername.clone()),
            ]);
        }
        out
    }
}

/// Load settings from a JSON file. Missing or invalid settings are fatal.
pub fn load_settings(path: &Path) -> Result<Settings, Error> {
    let text = read_file(path)?;
    debug!(event = "Load", phase = "Settings", path = %path.display());
    Settings::from_json(&text)
}
