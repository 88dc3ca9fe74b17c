//! Address directory: host name → address and subnet
//!
//! Built once from the host table and never mutated; sessions share it
//! through an `Arc`.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use crate::error::PolicyError;
use crate::settings::HostEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub name: String,
    pub address: Ipv4Addr,
    pub subnet: Ipv4Net,
}

impl From<HostEntry> for Host {
    fn from(entry: HostEntry) -> Self {
        Self {
            name: entry.name,
            address: entry.address,
            subnet: entry.subnet,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddressDirectory {
    hosts: BTreeMap<String, Host>,
    by_address: HashMap<Ipv4Addr, String>,
}

impl AddressDirectory {
    /// Rejects duplicate names, duplicate addresses, and hosts outside their subnet
    pub fn new(hosts: impl IntoIterator<Item = Host>) -> Result<Self, PolicyError> {
        let mut directory = Self::default();

        for host in hosts {
            if !host.subnet.contains(&host.address) {
                return Err(PolicyError::InvalidDirectory(format!(
                    "host '{}' address {} is outside its subnet {}",
                    host.name, host.address, host.subnet
                )));
            }
            if let Some(existing) = directory.by_address.get(&host.address) {
                return Err(PolicyError::InvalidDirectory(format!(
                    "address {} assigned to both '{}' and '{}'",
                    host.address, existing, host.name
                )));
            }
            if directory.hosts.contains_key(&host.name) {
                return Err(PolicyError::InvalidDirectory(format!(
                    "duplicate host name '{}'",
                    host.name
                )));
            }

            directory
                .by_address
                .insert(host.address, host.name.clone());
            directory.hosts.insert(host.name.clone(), host);
        }

        Ok(directory)
    }

    pub fn from_entries(entries: &[HostEntry]) -> Result<Self, PolicyError> {
        Self::new(entries.iter().cloned().map(Host::from))
    }

    pub fn lookup_address(&self, name: &str) -> Result<Ipv4Addr, PolicyError> {
        self.hosts
            .get(name)
            .map(|h| h.address)
            .ok_or_else(|| PolicyError::UnknownHost(name.to_string()))
    }

    pub fn lookup_subnet(&self, name: &str) -> Result<Ipv4Net, PolicyError> {
        self.hosts
            .get(name)
            .map(|h| h.subnet)
            .ok_or_else(|| PolicyError::UnknownHost(name.to_string()))
    }

    /// Reverse lookup used to decide whether an address is managed
    pub fn host_for_address(&self, address: Ipv4Addr) -> Option<&Host> {
        self.by_address
            .get(&address)
            .and_then(|name| self.hosts.get(name))
    }

    /// Hosts ordered by name
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PolicySettings;

    fn reference() -> AddressDirectory {
        AddressDirectory::from_entries(&PolicySettings::default().hosts).unwrap()
    }

    fn host(name: &str, address: &str, subnet: &str) -> Host {
        Host {
            name: name.to_string(),
            address: address.parse().unwrap(),
            subnet: subnet.parse().unwrap(),
        }
    }

    #[test]
    fn test_lookup_reference_hosts() {
        let dir = reference();
        assert_eq!(
            dir.lookup_address("hnotrust").unwrap(),
            Ipv4Addr::new(172, 16, 10, 100)
        );
        assert_eq!(
            dir.lookup_subnet("h20").unwrap(),
            "10.0.2.0/24".parse::<Ipv4Net>().unwrap()
        );
    }

    #[test]
    fn test_lookup_unknown_host() {
        let dir = reference();
        assert!(matches!(
            dir.lookup_address("h99"),
            Err(PolicyError::UnknownHost(name)) if name == "h99"
        ));
        assert!(dir.lookup_subnet("h99").is_err());
    }

    #[test]
    fn test_reverse_lookup() {
        let dir = reference();
        let host = dir.host_for_address(Ipv4Addr::new(10, 0, 4, 10)).unwrap();
        assert_eq!(host.name, "serv1");
        assert!(dir.host_for_address(Ipv4Addr::new(10, 0, 9, 9)).is_none());
    }

    #[test]
    fn test_rejects_host_outside_subnet() {
        let result = AddressDirectory::new(vec![host("h1", "10.0.2.5", "10.0.1.0/24")]);
        assert!(matches!(result, Err(PolicyError::InvalidDirectory(_))));
    }

    #[test]
    fn test_rejects_duplicates() {
        let dup_name = AddressDirectory::new(vec![
            host("h1", "10.0.1.5", "10.0.1.0/24"),
            host("h1", "10.0.1.6", "10.0.1.0/24"),
        ]);
        assert!(dup_name.is_err());

        let dup_addr = AddressDirectory::new(vec![
            host("h1", "10.0.1.5", "10.0.1.0/24"),
            host("h2", "10.0.1.5", "10.0.1.0/24"),
        ]);
        assert!(dup_addr.is_err());
    }

    #[test]
    fn test_hosts_sorted_by_name() {
        let dir = reference();
        let names: Vec<&str> = dir.hosts().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["h10", "h20", "h30", "hnotrust", "serv1"]);
    }
}
