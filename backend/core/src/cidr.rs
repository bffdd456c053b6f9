//! IPv4 CIDR blocks used for network spaces, subnets, and rule peers.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EnclaveError;

/// An IPv4 block in `a.b.c.d/n` form. Host bits are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl Cidr {
    /// `0.0.0.0/0`, every IPv4 address.
    pub const ANY: Cidr = Cidr { base: 0, prefix: 0 };

    /// Build a block from a base address; host bits are cleared.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, EnclaveError> {
        Self::from_bits(u32::from(addr), prefix)
    }

    pub fn from_bits(base: u32, prefix: u8) -> Result<Self, EnclaveError> {
        if prefix > 32 {
            return Err(EnclaveError::InvalidCidr(format!("prefix /{prefix} exceeds /32")));
        }
        Ok(Self {
            base: base & mask(prefix),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn base_bits(&self) -> u32 {
        self.base
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// One past the last address, as a 64-bit offset so `/0` does not overflow.
    pub fn end_bits(&self) -> u64 {
        u64::from(self.base) + self.size()
    }

    /// True when `other` lies entirely inside this block.
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && (other.base & mask(self.prefix)) == self.base
    }

    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & mask(self.prefix)) == self.base
    }

    /// Aligned blocks overlap exactly when one contains the other.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = EnclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| EnclaveError::InvalidCidr(format!("missing prefix length in '{s}'")))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| EnclaveError::InvalidCidr(format!("bad address in '{s}'")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| EnclaveError::InvalidCidr(format!("bad prefix length in '{s}'")))?;
        Cidr::new(addr, prefix)
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let cidr: Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert_eq!(cidr.size(), 65_536);
    }

    #[test]
    fn clears_host_bits() {
        let cidr: Cidr = "10.0.3.7/24".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.3.0/24");
    }

    #[test]
    fn rejects_malformed_blocks() {
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0/16".parse::<Cidr>().is_err());
    }

    #[test]
    fn containment_and_overlap() {
        let vpc: Cidr = "10.0.0.0/16".parse().unwrap();
        let a: Cidr = "10.0.0.0/24".parse().unwrap();
        let b: Cidr = "10.0.1.0/24".parse().unwrap();
        let outside: Cidr = "10.1.0.0/24".parse().unwrap();

        assert!(vpc.contains(&a));
        assert!(!a.contains(&vpc));
        assert!(vpc.overlaps(&a));
        assert!(!a.overlaps(&b));
        assert!(!vpc.contains(&outside));
        assert!(Cidr::ANY.contains(&outside));
        assert!(a.contains_addr(Ipv4Addr::new(10, 0, 0, 200)));
    }

    #[test]
    fn serde_uses_string_form() {
        let cidr: Cidr = "192.168.0.0/20".parse().unwrap();
        let json = serde_json::to_string(&cidr).unwrap();
        assert_eq!(json, "\"192.168.0.0/20\"");
        let back: Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr);
    }
}
