//! Typed identifiers for services and access groups.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Marker type for services
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum ServiceMarker {}

/// Marker type for access groups
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum GroupMarker {}

/// A string identifier tagged with the kind of entity it names, so a service id
/// can never be passed where a group id is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Ident<T> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> Ident<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Ident {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T> Display for Ident<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.value)
    }
}

impl<T> From<&str> for Ident<T> {
    fn from(value: &str) -> Self {
        Ident::new(value)
    }
}

impl<T> From<String> for Ident<T> {
    fn from(value: String) -> Self {
        Ident::new(value)
    }
}

impl<T> AsRef<str> for Ident<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// A service's identifier, e.g. `orion`.
pub type ServiceId = Ident<ServiceMarker>;

/// An access group's identifier, e.g. `sg-orion`.
pub type GroupId = Ident<GroupMarker>;
