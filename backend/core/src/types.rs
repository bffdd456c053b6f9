use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnclaveError;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Id of the matching node in the resource graph.
            pub fn node_id(&self) -> String {
                format!(concat!($prefix, "/{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

resource_id!(
    /// Identifier of a private network space.
    NetworkId,
    "network"
);
resource_id!(SubnetId, "subnet");
resource_id!(
    /// Identifier of a registered endpoint; this is the value a request carries
    /// as its source endpoint.
    EndpointId,
    "endpoint"
);
resource_id!(GroupId, "sg");
resource_id!(PrincipalId, "principal");
resource_id!(RoleId, "role");
resource_id!(
    /// An independent failure zone (e.g. `us-east-1a`).
    Zone,
    "zone"
);

/// External services reachable from inside the enclave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceId {
    /// Object storage; the only gateway-capable service.
    Storage,
    OcrService,
    SessionBroker,
    SessionMessages,
    InstanceMessages,
    Invocation,
    Logs,
    Metrics,
}

impl ServiceId {
    pub const ALL: [ServiceId; 8] = [
        ServiceId::Storage,
        ServiceId::OcrService,
        ServiceId::SessionBroker,
        ServiceId::SessionMessages,
        ServiceId::InstanceMessages,
        ServiceId::Invocation,
        ServiceId::Logs,
        ServiceId::Metrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Storage => "storage",
            ServiceId::OcrService => "ocr-service",
            ServiceId::SessionBroker => "session-broker",
            ServiceId::SessionMessages => "session-messages",
            ServiceId::InstanceMessages => "instance-messages",
            ServiceId::Invocation => "invocation",
            ServiceId::Logs => "logs",
            ServiceId::Metrics => "metrics",
        }
    }

    /// Short name the provider uses in its private service names.
    pub fn provider_name(&self) -> &'static str {
        match self {
            ServiceId::Storage => "s3",
            ServiceId::OcrService => "textract",
            ServiceId::SessionBroker => "ssm",
            ServiceId::SessionMessages => "ssmmessages",
            ServiceId::InstanceMessages => "ec2messages",
            ServiceId::Invocation => "lambda",
            ServiceId::Logs => "logs",
            ServiceId::Metrics => "monitoring",
        }
    }

    /// Regional private service name, e.g. `com.amazonaws.us-east-1.textract`.
    pub fn service_name(&self, region: &str) -> String {
        format!("com.amazonaws.{region}.{}", self.provider_name())
    }

    pub fn supports_gateway(&self) -> bool {
        matches!(self, ServiceId::Storage)
    }

    /// Every catalogued service listens on HTTPS.
    pub fn default_port(&self) -> PortRange {
        PortRange::single(443)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = EnclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceId::ALL
            .into_iter()
            .find(|svc| svc.as_str() == s || svc.provider_name() == s)
            .ok_or_else(|| EnclaveError::unknown("service", s))
    }
}

/// Transport protocol of a traffic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    /// Any protocol; only meaningful with [`PortRange::ALL`].
    All,
}

impl Protocol {
    /// True when a rule for `self` admits traffic of `other`.
    pub fn covers(&self, other: Protocol) -> bool {
        *self == Protocol::All || *self == other
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::All => f.write_str("all"),
        }
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub const ALL: PortRange = PortRange { from: 0, to: u16::MAX };

    pub fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    pub fn covers(&self, other: &PortRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == PortRange::ALL {
            f.write_str("all")
        } else if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_ids_round_trip_through_strings() {
        for svc in ServiceId::ALL {
            assert_eq!(svc.as_str().parse::<ServiceId>().unwrap(), svc);
        }
        assert_eq!("textract".parse::<ServiceId>().unwrap(), ServiceId::OcrService);
        assert!("ftp".parse::<ServiceId>().is_err());
    }

    #[test]
    fn only_storage_is_gateway_capable() {
        let gateways: Vec<_> = ServiceId::ALL.iter().filter(|s| s.supports_gateway()).collect();
        assert_eq!(gateways, vec![&ServiceId::Storage]);
    }

    #[test]
    fn service_name_is_regional() {
        assert_eq!(
            ServiceId::OcrService.service_name("eu-west-1"),
            "com.amazonaws.eu-west-1.textract"
        );
    }

    #[test]
    fn port_range_coverage() {
        assert!(PortRange::ALL.covers(&PortRange::single(443)));
        assert!(PortRange::single(443).covers(&PortRange::single(443)));
        assert!(!PortRange::single(443).covers(&PortRange::single(80)));
        assert!(Protocol::All.covers(Protocol::Udp));
        assert!(!Protocol::Tcp.covers(Protocol::Udp));
        assert_eq!(PortRange::ALL.to_string(), "all");
    }

    #[test]
    fn ids_know_their_graph_node() {
        assert_eq!(GroupId::new("runner-sg").node_id(), "sg/runner-sg");
        assert_eq!(RoleId::from("runner").node_id(), "role/runner");
    }

    #[test]
    fn service_serializes_kebab_case() {
        let json = serde_json::to_string(&ServiceId::OcrService).unwrap();
        assert_eq!(json, "\"ocr-service\"");
    }
}
