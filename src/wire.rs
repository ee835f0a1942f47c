//! Update record wire format.
//!
//! A batch is a flat concatenation of records with no count field; the
//! transport supplies the total byte length out of band. Each record is a
//! packed little-endian header followed by the variable-length bytes:
//!
//! ```text
//! +--------------------+-------------+--------------+---------------+----------------+
//! | opcode_and_control | domain_len  | redirect_len | domain bytes  | redirect bytes |
//! |       1 byte       | u16 LE      |     u8       |  domain_len   |  redirect_len  |
//! +--------------------+-------------+--------------+---------------+----------------+
//! ```
//!
//! Bits 0-1 of the first byte are the control action, bits 2-3 the opcode,
//! bits 4-7 are reserved and must be zero. The bit layout is confined to
//! this module; everything else sees [`ControlAction`] and [`Opcode`].

use crate::{ControlAction, Error, Opcode, Result};

/// Size of the fixed per-record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 4;

const CONTROL_MASK: u8 = 0b0000_0011;
const OPCODE_SHIFT: u8 = 2;
const OPCODE_MASK: u8 = 0b0000_0011;
const RESERVED_MASK: u8 = 0b1111_0000;

/// One decoded update record, borrowing its bytes from the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Add or Delete
    pub opcode: Opcode,
    /// Control action (meaningful for Add)
    pub action: ControlAction,
    /// Domain bytes as sent; not necessarily lowercased
    pub domain: &'a [u8],
    /// Redirect bytes, present when `redirect_len > 0`
    pub redirect: Option<&'a [u8]>,
}

impl<'a> RawRecord<'a> {
    /// Domain as a string, lossy on non-UTF8 bytes.
    pub fn domain_str(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.domain)
    }

    /// Redirect as a string, lossy on non-UTF8 bytes.
    pub fn redirect_str(&self) -> Option<std::borrow::Cow<'a, str>> {
        self.redirect.map(String::from_utf8_lossy)
    }
}

/// Iterator over the records of a batch buffer.
///
/// Yields `Err` exactly once if a record's declared lengths run past the
/// buffer end, then stops; the remaining bytes are never reinterpreted as
/// a new record.
pub struct BatchReader<'a> {
    buf: &'a [u8],
    pos: usize,
    poisoned: bool,
}

impl<'a> BatchReader<'a> {
    /// Create a reader over a batch buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            poisoned: false,
        }
    }

    /// Byte offset of the next record (or of the malformed one after an
    /// error). The bytes before this offset decoded cleanly.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn read_record(&mut self) -> Result<RawRecord<'a>> {
        let start = self.pos;
        let rest = &self.buf[start..];
        if rest.len() < RECORD_HEADER_SIZE {
            return Err(Error::MalformedRecord { offset: start });
        }

        let tag = rest[0];
        let domain_len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
        let redirect_len = rest[3] as usize;

        let total = RECORD_HEADER_SIZE + domain_len + redirect_len;
        if rest.len() < total || domain_len == 0 {
            return Err(Error::MalformedRecord { offset: start });
        }

        if tag & RESERVED_MASK != 0 {
            return Err(Error::InvalidControl(tag));
        }
        let action = ControlAction::from_u8(tag & CONTROL_MASK)
            .ok_or(Error::InvalidControl(tag & CONTROL_MASK))?;
        let opcode = Opcode::from_u8((tag >> OPCODE_SHIFT) & OPCODE_MASK)
            .ok_or(Error::InvalidOpcode((tag >> OPCODE_SHIFT) & OPCODE_MASK))?;

        let domain = &rest[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + domain_len];
        let redirect = if redirect_len > 0 {
            Some(&rest[RECORD_HEADER_SIZE + domain_len..total])
        } else {
            None
        };

        self.pos = start + total;
        Ok(RawRecord {
            opcode,
            action,
            domain,
            redirect,
        })
    }
}

impl<'a> Iterator for BatchReader<'a> {
    type Item = Result<RawRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.pos >= self.buf.len() {
            return None;
        }
        match self.read_record() {
            Ok(rec) => Some(Ok(rec)),
            Err(e) => {
                self.poisoned = true;
                Some(Err(e))
            }
        }
    }
}

/// Append one record in wire format to `out`.
///
/// Used by the journal, the batch generator and tests. Domains longer than
/// `u16::MAX` or redirects longer than `u8::MAX` are rejected.
pub fn encode_record(
    out: &mut Vec<u8>,
    opcode: Opcode,
    action: ControlAction,
    domain: &str,
    redirect: Option<&str>,
) -> Result<()> {
    if domain.is_empty() || domain.len() > u16::MAX as usize {
        return Err(Error::Config(format!(
            "domain length {} out of range",
            domain.len()
        )));
    }
    let redirect_len = redirect.map_or(0, str::len);
    if redirect_len > u8::MAX as usize {
        return Err(Error::Config(format!(
            "redirect length {} out of range",
            redirect_len
        )));
    }

    out.push(action.as_u8() | (opcode.as_u8() << OPCODE_SHIFT));
    out.extend_from_slice(&(domain.len() as u16).to_le_bytes());
    out.push(redirect_len as u8);
    out.extend_from_slice(domain.as_bytes());
    if let Some(r) = redirect {
        out.extend_from_slice(r.as_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(records: &[(Opcode, ControlAction, &str, Option<&str>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (op, act, dom, redi) in records {
            encode_record(&mut out, *op, *act, dom, *redi).unwrap();
        }
        out
    }

    #[test]
    fn test_decode_single_record() {
        let buf = batch(&[(
            Opcode::Add,
            ControlAction::Redirect,
            "example.com",
            Some("10.0.0.1"),
        )]);
        let mut reader = BatchReader::new(&buf);

        let rec = reader.next().unwrap().unwrap();
        assert_eq!(rec.opcode, Opcode::Add);
        assert_eq!(rec.action, ControlAction::Redirect);
        assert_eq!(rec.domain, b"example.com");
        assert_eq!(rec.redirect, Some(&b"10.0.0.1"[..]));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_decode_multiple_records() {
        let buf = batch(&[
            (Opcode::Add, ControlAction::Drop, "a.com", None),
            (Opcode::Delete, ControlAction::Drop, "b.com", None),
            (Opcode::Add, ControlAction::Deceive, "c.com", None),
        ]);
        let records: Vec<_> = BatchReader::new(&buf).map(Result::unwrap).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].domain, b"a.com");
        assert_eq!(records[1].opcode, Opcode::Delete);
        assert_eq!(records[2].action, ControlAction::Deceive);
    }

    #[test]
    fn test_truncated_header() {
        let mut buf = batch(&[(Opcode::Add, ControlAction::Drop, "a.com", None)]);
        buf.extend_from_slice(&[0x00, 0x05]); // header fragment
        let mut reader = BatchReader::new(&buf);

        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next().unwrap(),
            Err(Error::MalformedRecord { offset: 9 })
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_overrunning_length_poisons_rest_of_batch() {
        // Record 2 declares a domain length past the buffer end; record 3's
        // bytes must not be reinterpreted.
        let mut buf = batch(&[(Opcode::Add, ControlAction::Drop, "one.com", None)]);
        let bad_start = buf.len();
        buf.push(0x00); // Add/Drop
        buf.extend_from_slice(&1000u16.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(b"short");
        let tail = batch(&[(Opcode::Add, ControlAction::Drop, "three.com", None)]);
        buf.extend_from_slice(&tail);

        let mut reader = BatchReader::new(&buf);
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(Error::MalformedRecord { offset }) => assert_eq!(offset, bad_start),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut buf = Vec::new();
        encode_record(&mut buf, Opcode::Add, ControlAction::Drop, "a.com", None).unwrap();
        buf[0] |= 0b0001_0000;
        let mut reader = BatchReader::new(&buf);
        assert!(matches!(
            reader.next().unwrap(),
            Err(Error::InvalidControl(_))
        ));
    }

    #[test]
    fn test_invalid_control_value() {
        let mut buf = Vec::new();
        encode_record(&mut buf, Opcode::Add, ControlAction::Drop, "a.com", None).unwrap();
        buf[0] = (buf[0] & !0b11) | 3; // control = 3 is undefined
        let mut reader = BatchReader::new(&buf);
        assert!(matches!(
            reader.next().unwrap(),
            Err(Error::InvalidControl(3))
        ));
    }

    #[test]
    fn test_empty_batch() {
        assert!(BatchReader::new(&[]).next().is_none());
    }

    #[test]
    fn test_encode_rejects_oversize() {
        let mut out = Vec::new();
        let long = "x".repeat(300);
        assert!(encode_record(
            &mut out,
            Opcode::Add,
            ControlAction::Redirect,
            "a.com",
            Some(&long)
        )
        .is_err());
        assert!(encode_record(&mut out, Opcode::Add, ControlAction::Drop, "", None).is_err());
    }
}
