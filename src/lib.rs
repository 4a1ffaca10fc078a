//! Access-control topology compiler and edge firewall policy templater.
//!
//! - [`compile`] turns services and connectivity intents into access groups
//!   holding the minimal set of port-scoped allow rules.
//! - [`template`] fills in or strips the optional allow and deny lists of an
//!   edge firewall policy document, leaving it free of dangling references.

pub use compiler::{Topology, compile};
pub use error::{ConfigError, DegradedInputWarning, Error, ManifestError, Result};
pub use policy::{BranchOutcome, ListState, Notice, PolicyDocument, Templated, template};
pub use types::{
    AccessGroup, AccessGroups, AddressList, AllowRule, ConnectivityIntent, GroupId, ListKind,
    Listener, Protocol, Service, ServiceId, SourceSelector,
};

pub mod compiler;
pub mod deployment;
mod error;
pub mod loader;
pub mod manifest;
pub mod naming;
pub mod policy;
pub mod settings;
pub mod types;
