//! Data model for the topology compiler and policy templater.
//!
//! - [`Service`] and [`ConnectivityIntent`] are caller input, fixed for one compile.
//! - [`AccessGroup`] and [`AllowRule`] are built by the compiler and read-only afterwards.
//! - [`AddressList`] is an operator-supplied, validated, non-empty CIDR list.

mod address_list;
mod group;
mod ids;
mod intent;
mod rule;
mod service;

pub use address_list::{AddressList, ListKind, is_valid_cidr, parse_cidr};
pub use group::{AccessGroup, AccessGroups};
pub use ids::{GroupId, GroupMarker, Ident, ServiceId, ServiceMarker};
pub use intent::ConnectivityIntent;
pub use rule::{ANY_IPV4, AllowRule, SourceSelector};
pub use service::{Listener, Protocol, Service};
