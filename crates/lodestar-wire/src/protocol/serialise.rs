//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use crate::protocol::types::*;

impl Message {
    /// Serialise to the wire format.  The first two octets of the
    /// output are the transaction id.
    ///
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than the wire format can represent).
    pub fn to_octets(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = WritableBuffer::default();

        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(&mut buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(&mut buffer)?;
        }
        for rr in &self.answers {
            rr.serialise(&mut buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(&mut buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(&mut buffer)?;
        }

        Ok(buffer.octets)
    }
}

impl Header {
    fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode =
            HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & u8::from(self.rcode);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
    }
}

impl Question {
    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer)?;
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(RCLASS_IN);
        Ok(())
    }
}

impl Record {
    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer)?;
        buffer.write_u16(self.rtype().into());
        buffer.write_u16(RCLASS_IN);
        // permanent records go out with a zero TTL: their lifetime is
        // a property of this resolver, not something for peers to
        // cache by.
        buffer.write_u32(u32::try_from(self.ttl.max(0)).unwrap_or(u32::MAX));

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.rdata {
            RData::A { address } => buffer.write_octets(&address.octets()),
            RData::NS { nsdname } => nsdname.serialise(buffer)?,
            RData::CNAME { cname } => cname.serialise(buffer)?,
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer)?;
                rname.serialise(buffer)?;
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RData::PTR { ptrdname } => ptrdname.serialise(buffer)?,
            RData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer)?;
            }
            RData::AAAA { address } => buffer.write_octets(&address.octets()),
            RData::Unknown { octets, .. } => buffer.write_octets(octets),
        }

        // -2 so the 2 octets of the rdlength field itself aren't counted
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl Name {
    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        for label in self.labels() {
            if label.len() > LABEL_MAX_LEN {
                return Err(Error::LabelTooLong {
                    label: label.to_string(),
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            buffer.write_u8(label.len() as u8);
            buffer.write_octets(label.as_bytes());
        }
        buffer.write_u8(0);
        Ok(())
    }
}

/// The IN class code.  The only class this resolver speaks.
const RCLASS_IN: u16 = 1;

/// Errors encountered when serialising a message.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize },

    /// A name label is over 63 octets.
    LabelTooLong { label: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter } => {
                write!(f, "'{counter}' cannot be converted to a u16")
            }
            Error::LabelTooLong { label } => {
                write!(f, "label '{label}' is over 63 octets")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: Vec<u8>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: Vec::with_capacity(512),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.push(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    u16::try_from(counter).map_err(|_| Error::CounterTooLarge { counter })
}
