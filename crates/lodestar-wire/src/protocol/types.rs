use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum length of a domain name in its dotted presentation form.
/// The wire form is capped at 255 octets (RFC 1035 section 2.3.4),
/// which leaves 253 characters once the length octets and the root
/// label are accounted for.
pub const NAME_MAX_LEN: usize = 253;

/// Maximum length of a single label (RFC 1035 section 2.3.4).
pub const LABEL_MAX_LEN: usize = 63;

/// TTL marking a record as permanent: seeded at start-up or
/// synthesised for a locally-authoritative zone.  Permanent records
/// never expire and are never displaced by remote data.
pub const TTL_PERMANENT: i64 = -1;

/// A domain name, held in lowercase dotted form with no trailing dot.
/// The root is the empty string.
///
/// Normalising in the constructor means equality, hashing, and
/// ordering are all case-insensitive name comparison, which is what
/// DNS requires (RFC 4343).
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Name {
    inner: String,
}

impl Name {
    pub fn new(s: &str) -> Self {
        let stripped = s.strip_suffix('.').unwrap_or(s);
        Self {
            inner: stripped.to_ascii_lowercase(),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// The name with its leftmost label removed.  `None` for the
    /// root, which has no parent.
    pub fn parent(&self) -> Option<Name> {
        if self.inner.is_empty() {
            None
        } else {
            match self.inner.split_once('.') {
                Some((_, rest)) => Some(Name {
                    inner: rest.to_string(),
                }),
                None => Some(Name::root()),
            }
        }
    }

    /// The labels of the name, leftmost first.  Empty for the root.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.inner.split('.').filter(|l| !l.is_empty())
    }

    /// Textual suffix match, case-insensitive.  `host.lan` has the
    /// suffix `.lan`; the name `lan` itself does not.
    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.inner.ends_with(&suffix.to_ascii_lowercase())
    }

    /// Some nameserver data is an address literal rather than a
    /// hostname, in which case no glue lookup is needed.
    pub fn as_ip(&self) -> Option<IpAddr> {
        self.inner.parse().ok()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.inner.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.inner)
        }
    }
}

/// Record type codes from the IANA DNS parameters registry.  Only the
/// types needed for name resolution are interpreted; anything else is
/// carried around as `Unknown`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    AAAA,
    /// The `*` query type, matching every record at a name.  Only
    /// valid in questions.
    ANY,
    Unknown(u16),
}

impl RecordType {
    /// Whether a record of this type answers a question of type
    /// `qtype`.
    pub fn matches(self, qtype: RecordType) -> bool {
        qtype == RecordType::ANY || self == qtype
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            28 => RecordType::AAAA,
            255 => RecordType::ANY,
            _ => RecordType::Unknown(value),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::AAAA => 28,
            RecordType::ANY => 255,
            RecordType::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::ANY => write!(f, "ANY"),
            RecordType::Unknown(tag) => write!(f, "TYPE{tag}"),
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = UnknownRecordType;

    /// Accepts the mnemonics this resolver interprets, `ANY` / `*`,
    /// and RFC 3597 `TYPEn` names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "PTR" => Ok(RecordType::PTR),
            "MX" => Ok(RecordType::MX),
            "AAAA" => Ok(RecordType::AAAA),
            "ANY" | "*" => Ok(RecordType::ANY),
            other => match other.strip_prefix("TYPE").map(str::parse::<u16>) {
                Some(Ok(tag)) => Ok(RecordType::from(tag)),
                _ => Err(UnknownRecordType {
                    input: s.to_string(),
                }),
            },
        }
    }
}

/// The error from parsing a `RecordType` mnemonic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnknownRecordType {
    pub input: String,
}

impl fmt::Display for UnknownRecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}' is not a record type", self.input)
    }
}

impl std::error::Error for UnknownRecordType {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A record type together with its deserialised payload.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RData {
    /// A 32 bit Internet address.
    A { address: Ipv4Addr },

    /// The host authoritative for the owner domain.
    NS { nsdname: Name },

    /// The canonical name of the owner, which is an alias.
    CNAME { cname: Name },

    /// Start-of-authority data for a zone.  See section 3.3.13 of RFC
    /// 1035 for the field meanings; the resolver only ever inspects
    /// `mname`, the rest are carried for the wire format.
    SOA {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },

    /// A name pointing elsewhere in the domain space, used for
    /// reverse lookups.
    PTR { ptrdname: Name },

    /// A mail exchange host with its preference.
    MX { preference: u16, exchange: Name },

    /// A 128 bit Internet address (RFC 3596).
    AAAA { address: Ipv6Addr },

    /// Any type this resolver does not interpret: the raw RDATA is
    /// kept so the record survives a decode / encode round trip.
    Unknown { tag: u16, octets: Vec<u8> },
}

impl RData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RData::A { .. } => RecordType::A,
            RData::NS { .. } => RecordType::NS,
            RData::CNAME { .. } => RecordType::CNAME,
            RData::SOA { .. } => RecordType::SOA,
            RData::PTR { .. } => RecordType::PTR,
            RData::MX { .. } => RecordType::MX,
            RData::AAAA { .. } => RecordType::AAAA,
            RData::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }
}

impl fmt::Display for RData {
    /// The presentation form of the payload, as it would appear in a
    /// zone file.  Uninterpreted RDATA comes out in the RFC 3597
    /// `\# <length> <hex>` form.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RData::A { address } => write!(f, "{address}"),
            RData::NS { nsdname } => write!(f, "{nsdname}"),
            RData::CNAME { cname } => write!(f, "{cname}"),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"
            ),
            RData::PTR { ptrdname } => write!(f, "{ptrdname}"),
            RData::MX {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            RData::AAAA { address } => write!(f, "{address}"),
            RData::Unknown { octets, .. } => {
                write!(f, "\\# {}", octets.len())?;
                if !octets.is_empty() {
                    write!(f, " ")?;
                    for octet in octets {
                        write!(f, "{octet:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// A single resource record.  The class is implicitly IN: this
/// resolver does not handle any other class.
///
/// The TTL is signed: `-1` (see `TTL_PERMANENT`) marks seed and
/// locally-authoritative records which never expire.  Records off the
/// wire always carry a non-negative TTL.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Record {
    pub name: Name,
    pub rdata: RData,
    pub ttl: i64,
}

impl Record {
    pub fn permanent(name: Name, rdata: RData) -> Self {
        Self {
            name,
            rdata,
            ttl: TTL_PERMANENT,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.ttl < 0
    }

    pub fn rtype(&self) -> RecordType {
        self.rdata.rtype()
    }

    /// A copy of the record rebranded with a different owner name,
    /// used when answering a query from cached data stored under an
    /// equivalent name.
    pub fn renamed(&self, name: &Name) -> Record {
        Record {
            name: name.clone(),
            rdata: self.rdata.clone(),
            ttl: self.ttl,
        }
    }
}

/// A single question.  The class is implicitly IN, as for `Record`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Question {
    pub name: Name,
    pub qtype: RecordType,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.qtype)
    }
}

/// Message opcode.  Only `Standard` queries are answered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            _ => Opcode::Reserved(value),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(value) => value,
        }
    }
}

/// Response code (RFC 1035 section 4.1.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Unknown(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            _ => Rcode::Unknown(value),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Unknown(value) => value,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "no-error"),
            Rcode::FormatError => write!(f, "format-error"),
            Rcode::ServerFailure => write!(f, "server-failure"),
            Rcode::NameError => write!(f, "name-error"),
            Rcode::NotImplemented => write!(f, "not-implemented"),
            Rcode::Refused => write!(f, "refused"),
            Rcode::Unknown(value) => write!(f, "rcode-{value}"),
        }
    }
}

/// Message header (RFC 1035 section 4.1.1), without the four count
/// fields: those describe the section lengths and are derived during
/// serialisation rather than stored.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Header {
    /// Identifier copied from query to response, used to pair replies
    /// with outstanding requests.
    pub id: u16,

    /// QR: query (false) or response (true).
    pub is_response: bool,

    pub opcode: Opcode,

    /// AA: the answer comes from a zone authority, not a cache.
    pub is_authoritative: bool,

    /// TC: the message was cut down to fit the transport.
    pub is_truncated: bool,

    /// RD: the client asks the server to recurse on its behalf.
    pub recursion_desired: bool,

    /// RA: the server is willing to recurse.
    pub recursion_available: bool,

    pub rcode: Rcode,
}

/// A DNS message: header plus question, answer, authority, and
/// additional sections (RFC 1035 section 4.1).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// A fresh standard query for a single question.
    pub fn from_question(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// An empty response to this message, echoing the id, opcode,
    /// questions, and RD flag.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: true,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn make_format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: true,
                rcode: Rcode::FormatError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

pub const HEADER_MASK_QR: u8 = 0b1000_0000;
pub const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
pub const HEADER_OFFSET_OPCODE: u8 = 3;
pub const HEADER_MASK_AA: u8 = 0b0000_0100;
pub const HEADER_MASK_TC: u8 = 0b0000_0010;
pub const HEADER_MASK_RD: u8 = 0b0000_0001;
pub const HEADER_MASK_RA: u8 = 0b1000_0000;
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;


#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;

    pub fn name(s: &str) -> Name {
        Name::new(s)
    }

    pub fn a_record(name: &str, address: Ipv4Addr, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::A { address },
            ttl,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::AAAA { address },
            ttl,
        }
    }

    pub fn cname_record(name: &str, target: &str, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::CNAME {
                cname: Name::new(target),
            },
            ttl,
        }
    }

    pub fn ns_record(name: &str, nameserver: &str, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::NS {
                nsdname: Name::new(nameserver),
            },
            ttl,
        }
    }

    pub fn ptr_record(name: &str, target: &str, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::PTR {
                ptrdname: Name::new(target),
            },
            ttl,
        }
    }

    pub fn mx_record(name: &str, exchange: &str, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::MX {
                preference: 10,
                exchange: Name::new(exchange),
            },
            ttl,
        }
    }

    pub fn soa_record(name: &str, mname: &str, ttl: i64) -> Record {
        Record {
            name: Name::new(name),
            rdata: RData::SOA {
                mname: Name::new(mname),
                rname: Name::new(&format!("hostmaster.{name}")),
                serial: 1,
                refresh: 7200,
                retry: 600,
                expire: 360_000,
                minimum: 60,
            },
            ttl,
        }
    }
}
