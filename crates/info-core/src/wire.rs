//! The 8-byte request/reply frame header: a small tagged header read with
//! `byteorder` ahead of an opaque payload slice.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const VERSION: u8 = 2;
pub const TYPE_INFO: u8 = 1;
pub const HEADER_LEN: usize = 8;

/// Parsed header for a frame on the wire: version byte, type byte, two
/// reserved bytes, then a 32-bit big-endian body length.
#[derive(Debug, Eq, PartialEq)]
pub struct Header {
    pub version: u8,
    pub kind: u8,
    pub body_len: u32,
}

impl Header {
    pub fn reply(body_len: u32) -> Header {
        Header { version: VERSION, kind: TYPE_INFO, body_len }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u8(self.version)?;
        w.write_u8(self.kind)?;
        w.write_u16::<BigEndian>(0)?; // reserved
        w.write_u32::<BigEndian>(self.body_len)?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Header> {
        let version = r.read_u8()?;
        let kind = r.read_u8()?;
        let _reserved = r.read_u16::<BigEndian>()?;
        let body_len = r.read_u32::<BigEndian>()?;
        Ok(Header { version, kind, body_len })
    }
}

/// Writes a complete reply frame (header + body) into `out`.
pub fn write_reply<W: Write>(mut out: W, body: &[u8]) -> io::Result<()> {
    Header::reply(body.len() as u32).write(&mut out)?;
    out.write_all(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut buf = Vec::new();
        Header::reply(42).write(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_LEN);

        let header = Header::read(&buf[..]).unwrap();
        assert_eq!(header.version, VERSION);
        assert_eq!(header.kind, TYPE_INFO);
        assert_eq!(header.body_len, 42);
    }

    #[test]
    fn write_reply_prefixes_body_with_header() {
        let mut buf = Vec::new();
        write_reply(&mut buf, b"hello").unwrap();

        assert_eq!(&buf[..HEADER_LEN], &[2, 1, 0, 0, 0, 0, 0, 5]);
        assert_eq!(&buf[HEADER_LEN..], b"hello");
    }
}
