//! Reading inputs from disk.
//!
//! Mandatory inputs (policy template, settings, manifests) fail hard. Optional
//! address lists never do: any problem is logged and the list is treated as absent.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DegradedInputWarning, Error};
use crate::policy::PolicyDocument;
use crate::types::{AddressList, ListKind};

/// Result of loading one optional address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedList {
    pub list: Option<AddressList>,
    /// Set when the file existed but could not be used, or did not exist at all.
    pub warning: Option<DegradedInputWarning>,
}

impl LoadedList {
    pub fn absent() -> Self {
        LoadedList {
            list: None,
            warning: None,
        }
    }

    fn degraded(warning: DegradedInputWarning) -> Self {
        warn!(event = "Load", phase = "AddressList", warning = %warning, "treating list as absent");
        LoadedList {
            list: None,
            warning: Some(warning),
        }
    }
}

/// Read a whole file or fail with its path attached.
pub fn read_file(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Both lists read from one shared file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLists {
    pub allow: LoadedList,
    pub deny: LoadedList,
    /// Set when the file itself could not be read or parsed. Reported once, not per list.
    pub warning: Option<DegradedInputWarning>,
}

impl LoadedLists {
    pub fn get(&self, kind: ListKind) -> &LoadedList {
        match kind {
            ListKind::Allow => &self.allow,
            ListKind::Deny => &self.deny,
        }
    }

    /// Number of warnings raised while loading, the file-level one included.
    pub fn warnings(&self) -> usize {
        usize::from(self.warning.is_some())
            + usize::from(self.allow.warning.is_some())
            + usize::from(self.deny.warning.is_some())
    }
}

/// Load the `kind` list from `path`.
///
/// The list lives at a fixed location: `ipRatebased.allowList` for the allow list
/// and `ipRestriction.denyList` for the deny list, so both can share one file
/// (see [`load_shared_lists`]). A file without the section is an empty list. A
/// missing file, invalid JSON, a section of the wrong shape or an entry that is
/// not a CIDR range yields a warning and no list.
pub fn load_address_list(path: &Path, kind: ListKind) -> LoadedList {
    match read_list_file(path) {
        Ok(value) => extract_list(path, &value, kind),
        Err(warning) => LoadedList::degraded(warning),
    }
}

/// Load both lists from one file, reading and parsing it once.
///
/// A missing or unparseable file gives one warning and two absent lists;
/// problems inside one list's section only affect that list.
pub fn load_shared_lists(path: &Path) -> LoadedLists {
    match read_list_file(path) {
        Ok(value) => LoadedLists {
            allow: extract_list(path, &value, ListKind::Allow),
            deny: extract_list(path, &value, ListKind::Deny),
            warning: None,
        },
        Err(warning) => {
            warn!(event = "Load", phase = "AddressList", warning = %warning, "treating both lists as absent");
            LoadedLists {
                allow: LoadedList::absent(),
                deny: LoadedList::absent(),
                warning: Some(warning),
            }
        }
    }
}

fn read_list_file(path: &Path) -> Result<Value, DegradedInputWarning> {
    let text = fs::read_to_string(path).map_err(|_| DegradedInputWarning::Missing {
        path: path.to_path_buf(),
    })?;
    let value: Value =
        serde_json::from_str(&text).map_err(|e| DegradedInputWarning::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(DegradedInputWarning::Malformed {
            path: path.to_path_buf(),
            reason: "top level is not an object".to_string(),
        });
    }
    Ok(value)
}

fn extract_list(path: &Path, value: &Value, kind: ListKind) -> LoadedList {
    debug!(event = "Load", phase = "AddressList", list = %kind, path = %path.display());
    match parse_address_list(value, kind) {
        Ok(list) => LoadedList {
            list,
            warning: None,
        },
        Err(ListParseError::Malformed(reason)) => {
            LoadedList::degraded(DegradedInputWarning::Malformed {
                path: path.to_path_buf(),
                reason,
            })
        }
        Err(ListParseError::InvalidCidr(entry)) => {
            LoadedList::degraded(DegradedInputWarning::InvalidCidr {
                path: path.to_path_buf(),
                entry,
            })
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ListParseError {
    Malformed(String),
    InvalidCidr(String),
}

fn parse_address_list(value: &Value, kind: ListKind) -> Result<Option<AddressList>, ListParseError> {
    let (section, key) = kind.source_path();
    let Some(section_value) = value.get(section) else {
        return Ok(None);
    };
    let Some(entries) = section_value.as_object().map(|s| s.get(key)) else {
        return Err(ListParseError::Malformed(format!(
            "{section} is not an object"
        )));
    };
    let Some(entries) = entries else {
        return Ok(None);
    };
    let entries: Vec<String> = serde_json::from_value(entries.clone())
        .map_err(|e| ListParseError::Malformed(format!("{section}.{key}: {e}")))?;

    AddressList::parse(entries).map_err(ListParseError::InvalidCidr)
}

/// Load a policy template. Missing or unparseable templates are fatal.
pub fn load_policy_document(path: &Path) -> Result<PolicyDocument, Error> {
    let text = read_file(path)?;
    debug!(event = "Load", phase = "PolicyTemplate", path = %path.display());
    PolicyDocument::from_json(&text)
}

/// Load a YAML manifest template.
pub fn load_manifest(path: &Path) -> Result<serde_yaml::Value, Error> {
    let text = read_file(path)?;
    debug!(event = "Load", phase = "Manifest", path = %path.display());
    Ok(serde_yaml::from_str(&text)?)
}
