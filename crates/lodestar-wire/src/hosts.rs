//! Parser for `/etc/hosts`-style files.  Entries become permanent A
//! and AAAA records, so a hosts file doubles as a tiny authoritative
//! data source.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::protocol::types::{Name, RData, Record};

/// A collection of host addresses.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Hosts {
    pub v4: HashMap<Name, Ipv4Addr>,
    pub v6: HashMap<Name, Ipv6Addr>,
}

impl Hosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a string of hosts data.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut hosts = Self::new();

        for line in data.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            };

            let mut fields = line.split_whitespace();
            let Some(address) = fields.next() else { continue };

            // an interface-scoped address, like `fe80::1%lo0`, is not
            // usable as record data
            if address.contains('%') {
                continue;
            }

            let address = IpAddr::from_str(address).map_err(|_| Error::CouldNotParseAddress {
                address: address.to_string(),
            })?;

            for field in fields {
                let name = Name::new(field);
                match address {
                    IpAddr::V4(ip) => {
                        hosts.v4.insert(name, ip);
                    }
                    IpAddr::V6(ip) => {
                        hosts.v6.insert(name, ip);
                    }
                }
            }
        }

        Ok(hosts)
    }

    /// Merge another hosts file into this one.  If the same name has
    /// records in both files, the new file wins.
    pub fn merge(&mut self, other: Hosts) {
        for (name, address) in other.v4 {
            self.v4.insert(name, address);
        }
        for (name, address) in other.v6 {
            self.v6.insert(name, address);
        }
    }

    /// The entries as permanent records, ready for cache seeding.
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.v4.len() + self.v6.len());
        for (name, address) in &self.v4 {
            records.push(Record::permanent(
                name.clone(),
                RData::A { address: *address },
            ));
        }
        for (name, address) in &self.v6 {
            records.push(Record::permanent(
                name.clone(),
                RData::AAAA { address: *address },
            ));
        }
        records
    }
}

/// An error that can occur reading a hosts file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    CouldNotParseAddress { address: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CouldNotParseAddress { address } => {
                write!(f, "'{address}' is not an address")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
