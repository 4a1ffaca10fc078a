//! Declared connectivity between services.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::ServiceId;

/// "`source` must reach `destination` on `port`".
///
/// Intents are never inferred transitively: every path that must be open is
/// declared on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ConnectivityIntent {
    pub source: ServiceId,
    pub destination: ServiceId,
    pub port: u16,
}

impl ConnectivityIntent {
    pub fn new(source: impl Into<ServiceId>, destination: impl Into<ServiceId>, port: u16) -> Self {
        ConnectivityIntent {
            source: source.into(),
            destination: destination.into(),
            port,
        }
    }
}

impl Display for ConnectivityIntent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} -> {}:{}", self.source, self.destination, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_display() {
        let intent = ConnectivityIntent::new("orion", "docdb", 27017);
        assert_eq!(intent.to_string(), "orion -> docdb:27017");
    }

    #[test]
    fn test_intent_roundtrips_through_json() {
        let json = serde_json::json!({ "source": "cygnus", "destination": "aurora", "port": 5432 });
        let intent: ConnectivityIntent = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(intent, ConnectivityIntent::new("cygnus", "aurora", 5432));
        assert_eq!(serde_json::to_value(&intent).unwrap(), json);
    }
}
