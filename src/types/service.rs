//! Services and the ports they listen on.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

use super::ids::ServiceId;

/// Transport protocol of a listener or rule.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    StrumDisplay,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// A (port, protocol) pair a service accepts traffic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct Listener {
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Listener {
    pub fn tcp(port: u16) -> Self {
        Listener {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl Display for Listener {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// A named participant in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Service {
    id: ServiceId,
    /// Port the service terminates public traffic on, if it is an entry point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_port: Option<u16>,
    #[serde(default)]
    listens: Vec<Listener>,
    /// What the service's access group is for. Defaults to "`<id>` internal services".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Service {
    /// A private service listening on the given TCP ports.
    pub fn new(id: impl Into<ServiceId>, tcp_ports: impl IntoIterator<Item = u16>) -> Self {
        Service {
            id: id.into(),
            public_port: None,
            listens: tcp_ports.into_iter().map(Listener::tcp).collect(),
            description: None,
        }
    }

    /// Mark the service as a public entry point on `port`.
    pub fn public_on(mut self, port: u16) -> Self {
        self.public_port = Some(port);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listens.push(listener);
        self
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn public_port(&self) -> Option<u16> {
        self.public_port
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.public_port.is_some()
    }

    pub fn listens(&self) -> &[Listener] {
        &self.listens
    }

    /// The declared listener on `port`, if any.
    pub fn listener(&self, port: u16) -> Option<&Listener> {
        self.listens.iter().find(|l| l.port == port)
    }

    /// Protocol used for traffic to `port`; undeclared ports default to TCP.
    pub fn protocol_for(&self, port: u16) -> Protocol {
        self.listener(port).map(|l| l.protocol).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use yare::parameterized;

    #[parameterized(
        tcp_lower = { "tcp", Protocol::Tcp },
        tcp_upper = { "TCP", Protocol::Tcp },
        udp = { "udp", Protocol::Udp },
    )]
    fn test_protocol_from_str(input: &str, expected: Protocol) {
        assert_eq!(Protocol::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_protocol_rejects_unknown() {
        assert!(Protocol::from_str("sctp").is_err());
    }

    #[test]
    fn test_service_builder() {
        let svc = Service::new("orion-alb", [1026]).public_on(1026);
        assert_eq!(svc.id().as_str(), "orion-alb");
        assert!(svc.is_public());
        assert_eq!(svc.public_port(), Some(1026));
        assert_eq!(svc.listens(), &[Listener::tcp(1026)]);
    }

    #[test]
    fn test_protocol_for_undeclared_port_defaults_to_tcp() {
        let svc = Service::new("dns", Vec::<u16>::new()).with_listener(Listener {
            port: 53,
            protocol: Protocol::Udp,
        });
        assert_eq!(svc.protocol_for(53), Protocol::Udp);
        assert_eq!(svc.protocol_for(8080), Protocol::Tcp);
    }

    #[test]
    fn test_listener_display() {
        assert_eq!(Listener::tcp(5432).to_string(), "5432/tcp");
    }

    #[test]
    fn test_service_deserializes_with_defaults() {
        let svc: Service = serde_json::from_value(serde_json::json!({
            "id": "docdb",
            "listens": [{ "port": 27017 }]
        }))
        .unwrap();
        assert!(!svc.is_public());
        assert_eq!(svc.protocol_for(27017), Protocol::Tcp);
    }
}
