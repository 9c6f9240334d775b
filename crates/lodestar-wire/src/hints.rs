//! Parser for root hint files, the `named.root` format published by
//! InterNIC: whitespace-separated `NAME TTL TYPE DATA` lines with `;`
//! starting a comment.  Hints are seeds, so the TTL column is ignored
//! and every record comes out permanent.

use std::str::FromStr;

use crate::protocol::types::{Name, RData, Record};

/// A copy of InterNIC's `named.root`, compiled in so a resolver can
/// come up without any files at hand.
const BUNDLED: &str = include_str!("../data/root.hints");

/// The parsed contents of a root hints file.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RootHints {
    pub records: Vec<Record>,
}

impl RootHints {
    /// The root hints bundled into this crate.
    pub fn bundled() -> Self {
        Self::deserialise(BUNDLED).expect("bundled root hints are valid")
    }

    /// Parse a string of root hints data.
    ///
    /// Record types other than NS / A / AAAA are skipped: the hint
    /// set only exists to bootstrap nameserver discovery.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut records = Vec::new();

        for (index, line) in data.lines().enumerate() {
            let line_number = index + 1;
            let line = match line.split_once(';') {
                Some((before, _)) => before,
                None => line,
            };

            let mut fields = line.split_whitespace();
            let Some(name) = fields.next() else { continue };
            let (Some(_ttl), Some(rtype)) = (fields.next(), fields.next()) else {
                return Err(Error::MissingField { line_number });
            };
            let Some(data) = fields.next() else {
                return Err(Error::MissingField { line_number });
            };

            let rdata = match rtype {
                "NS" => RData::NS {
                    nsdname: Name::new(data),
                },
                "A" => RData::A {
                    address: parse_address(line_number, data)?,
                },
                "AAAA" => RData::AAAA {
                    address: parse_address(line_number, data)?,
                },
                _ => continue,
            };

            records.push(Record::permanent(Name::new(name), rdata));
        }

        Ok(Self { records })
    }
}

fn parse_address<T: FromStr>(line_number: usize, data: &str) -> Result<T, Error> {
    T::from_str(data).map_err(|_| Error::CouldNotParseAddress {
        line_number,
        address: data.to_string(),
    })
}

/// An error that can occur reading a root hints file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    MissingField {
        line_number: usize,
    },
    CouldNotParseAddress {
        line_number: usize,
        address: String,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MissingField { line_number } => {
                write!(f, "line {line_number}: fewer than four fields")
            }
            Error::CouldNotParseAddress {
                line_number,
                address,
            } => write!(f, "line {line_number}: '{address}' is not an address"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
