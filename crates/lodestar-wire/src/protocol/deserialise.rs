//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        let buffer = &mut ConsumableBuffer::new(octets);

        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        let header = Header {
            id,
            is_response: flags1 & HEADER_MASK_QR != 0,
            opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
            is_authoritative: flags1 & HEADER_MASK_AA != 0,
            is_truncated: flags1 & HEADER_MASK_TC != 0,
            recursion_desired: flags1 & HEADER_MASK_RD != 0,
            recursion_available: flags2 & HEADER_MASK_RA != 0,
            rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
        };

        let mut questions = Vec::with_capacity(qdcount.into());
        let mut answers = Vec::with_capacity(ancount.into());
        let mut authority = Vec::with_capacity(nscount.into());
        let mut additional = Vec::with_capacity(arcount.into());

        for _ in 0..qdcount {
            questions.push(Question::deserialise(id, buffer)?);
        }
        for _ in 0..ancount {
            answers.push(Record::deserialise(id, buffer)?);
        }
        for _ in 0..nscount {
            authority.push(Record::deserialise(id, buffer)?);
        }
        for _ in 0..arcount {
            additional.push(Record::deserialise(id, buffer)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl Question {
    fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = Name::deserialise(id, buffer)?;
        let qtype = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?.into();
        // qclass: read and discarded, this resolver only speaks IN
        buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;

        Ok(Self { name, qtype })
    }
}

impl Record {
    fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = Name::deserialise(id, buffer)?;
        let rtype =
            RecordType::from(buffer.next_u16().ok_or(Error::RecordTooShort(id))?);
        // rclass: read and discarded, as in `Question::deserialise`
        buffer.next_u16().ok_or(Error::RecordTooShort(id))?;
        let ttl = i64::from(buffer.next_u32().ok_or(Error::RecordTooShort(id))?);
        let rdlength = buffer.next_u16().ok_or(Error::RecordTooShort(id))?;

        let rdata_start = buffer.position;

        // records holding domain names are parsed so compression
        // pointers get expanded; everything else keeps its raw RDATA.
        let rdata = match rtype {
            RecordType::A => RData::A {
                address: Ipv4Addr::from(buffer.next_u32().ok_or(Error::RecordTooShort(id))?),
            },
            RecordType::NS => RData::NS {
                nsdname: Name::deserialise(id, buffer)?,
            },
            RecordType::CNAME => RData::CNAME {
                cname: Name::deserialise(id, buffer)?,
            },
            RecordType::SOA => RData::SOA {
                mname: Name::deserialise(id, buffer)?,
                rname: Name::deserialise(id, buffer)?,
                serial: buffer.next_u32().ok_or(Error::RecordTooShort(id))?,
                refresh: buffer.next_u32().ok_or(Error::RecordTooShort(id))?,
                retry: buffer.next_u32().ok_or(Error::RecordTooShort(id))?,
                expire: buffer.next_u32().ok_or(Error::RecordTooShort(id))?,
                minimum: buffer.next_u32().ok_or(Error::RecordTooShort(id))?,
            },
            RecordType::PTR => RData::PTR {
                ptrdname: Name::deserialise(id, buffer)?,
            },
            RecordType::MX => RData::MX {
                preference: buffer.next_u16().ok_or(Error::RecordTooShort(id))?,
                exchange: Name::deserialise(id, buffer)?,
            },
            RecordType::AAAA => {
                let octets = buffer.take(16).ok_or(Error::RecordTooShort(id))?;
                // safe: `take` returned exactly 16 octets
                let array = <[u8; 16]>::try_from(octets).unwrap();
                RData::AAAA {
                    address: Ipv6Addr::from(array),
                }
            }
            RecordType::ANY => return Err(Error::RecordInvalid(id)),
            RecordType::Unknown(tag) => RData::Unknown {
                tag,
                octets: buffer
                    .take(rdlength as usize)
                    .ok_or(Error::RecordTooShort(id))?
                    .to_vec(),
            },
        };

        if buffer.position == rdata_start + (rdlength as usize) {
            Ok(Self { name, rdata, ttl })
        } else {
            Err(Error::RecordInvalid(id))
        }
    }
}

impl Name {
    fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut dotted = String::with_capacity(32);
        let start = buffer.position;

        loop {
            let size = buffer.next_u8().ok_or(Error::NameTooShort(id))?;

            if size == 0 {
                break;
            } else if usize::from(size) <= LABEL_MAX_LEN {
                let octets = buffer
                    .take(size as usize)
                    .ok_or(Error::NameTooShort(id))?;
                let label =
                    std::str::from_utf8(octets).map_err(|_| Error::NameLabelInvalid(id))?;
                if label.contains('.') {
                    return Err(Error::NameLabelInvalid(id));
                }
                if !dotted.is_empty() {
                    dotted.push('.');
                }
                dotted.push_str(label);
                if dotted.len() > NAME_MAX_LEN {
                    return Err(Error::NameTooLong(id));
                }
            } else if size >= 192 {
                // a compression pointer; it must point strictly
                // backwards (RFC 1035 section 4.1.4), which also rules
                // out pointer loops.
                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(Error::NameTooShort(id))?;
                let ptr = usize::from(u16::from_be_bytes([hi, lo]));

                if ptr >= start {
                    return Err(Error::NamePointerInvalid(id));
                }

                let rest = Name::deserialise(id, &mut buffer.at_offset(ptr))?;
                if !rest.is_root() {
                    if !dotted.is_empty() {
                        dotted.push('.');
                    }
                    dotted.push_str(rest.as_str());
                }
                break;
            } else {
                return Err(Error::NameLabelInvalid(id));
            }
        }

        if dotted.len() > NAME_MAX_LEN {
            Err(Error::NameTooLong(id))
        } else {
            Ok(Name::new(&dotted))
        }
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// that an error response can be sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't contain
    /// a valid ID, and an error cannot be sent back to the client.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    RecordTooShort(u16),

    /// A resource record is the wrong format.
    RecordInvalid(u16),

    /// A name is incomplete.
    NameTooShort(u16),

    /// A name is over the length limit.
    NameTooLong(u16),

    /// A name pointer points to or after the current name.
    NamePointerInvalid(u16),

    /// A name label is longer than 63 octets but not a pointer, or
    /// holds octets which cannot appear in a label.
    NameLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::RecordTooShort(id)
            | Error::RecordInvalid(id)
            | Error::NameTooShort(id)
            | Error::NameTooLong(id)
            | Error::NamePointerInvalid(id)
            | Error::NameLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "message too short to hold an id"),
            Error::HeaderTooShort(_) => write!(f, "header too short"),
            Error::QuestionTooShort(_) => write!(f, "question too short"),
            Error::RecordTooShort(_) => write!(f, "record too short"),
            Error::RecordInvalid(_) => write!(f, "record malformed"),
            Error::NameTooShort(_) => write!(f, "name too short"),
            Error::NameTooLong(_) => write!(f, "name too long"),
            Error::NamePointerInvalid(_) => write!(f, "name pointer not strictly backwards"),
            Error::NameLabelInvalid(_) => write!(f, "name label malformed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self { octets, position: 0 }
    }

    fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    fn next_u16(&mut self) -> Option<u16> {
        let slice = self.take(2)?;
        Some(u16::from_be_bytes([slice[0], slice[1]]))
    }

    fn next_u32(&mut self) -> Option<u32> {
        let slice = self.take(4)?;
        Some(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}
