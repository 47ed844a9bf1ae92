//! Decoding of the raw record stream.
//!
//! A blocking read hands back a buffer holding zero or more complete
//! records, each a fixed `inotify_event` header followed by `len` bytes
//! of NUL-padded name. The primitive never splits a record across two
//! reads, so a buffer that ends mid-record is an internal invariant
//! violation, not an error to recover from.

use std::ffi::{OsStr, OsString};
use std::mem;
use std::os::unix::ffi::OsStrExt;

use crate::flags::EventMask;
use crate::raw::Wd;

const HEADER_LEN: usize = mem::size_of::<libc::inotify_event>();

/// One decoded record, exactly as the kernel produced it.
#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub wd: Wd,
    pub mask: EventMask,
    pub cookie: u32,
    /// Child name the record is about, `None` for records about the
    /// watched object itself.
    pub name: Option<OsString>,
}

/// Iterate the records of one read buffer in arrival order.
pub(crate) fn records(buf: &[u8]) -> RecordIter<'_> {
    RecordIter { buf }
}

pub(crate) struct RecordIter<'a> {
    buf: &'a [u8],
}

impl Iterator for RecordIter<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.buf.is_empty() {
            return None;
        }
        assert!(
            self.buf.len() >= HEADER_LEN,
            "truncated record header in notification buffer"
        );
        // The buffer is byte-aligned, so the header must be read unaligned.
        let header = unsafe {
            self.buf
                .as_ptr()
                .cast::<libc::inotify_event>()
                .read_unaligned()
        };
        let total = HEADER_LEN + header.len as usize;
        assert!(
            self.buf.len() >= total,
            "truncated record name in notification buffer"
        );
        let name_field = &self.buf[HEADER_LEN..total];
        let end = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_field.len());
        let name = (end > 0).then(|| OsString::from(OsStr::from_bytes(&name_field[..end])));
        self.buf = &self.buf[total..];
        Some(RawRecord {
            wd: header.wd,
            mask: EventMask::from_bits_truncate(header.mask),
            cookie: header.cookie,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::records;
    use crate::flags::EventMask;

    fn record(wd: i32, mask: u32, cookie: u32, name: &[u8], pad: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&wd.to_ne_bytes());
        buf.extend_from_slice(&mask.to_ne_bytes());
        buf.extend_from_slice(&cookie.to_ne_bytes());
        buf.extend_from_slice(&((name.len() + pad) as u32).to_ne_bytes());
        buf.extend_from_slice(name);
        buf.extend(std::iter::repeat(0).take(pad));
        buf
    }

    #[test]
    fn must_decode_empty_buffer() {
        assert_eq!(records(&[]).count(), 0);
    }

    #[test]
    fn must_decode_nul_padded_name() {
        let buf = record(3, libc::IN_CREATE, 0, b"bar", 13);
        let decoded: Vec<_> = records(&buf).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].wd, 3);
        assert_eq!(decoded[0].mask, EventMask::CREATE);
        assert_eq!(decoded[0].cookie, 0);
        assert_eq!(decoded[0].name, Some(OsString::from("bar")));
    }

    #[test]
    fn must_decode_nameless_record() {
        let buf = record(7, libc::IN_DELETE_SELF, 0, b"", 0);
        let decoded: Vec<_> = records(&buf).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, None);
    }

    #[test]
    fn must_preserve_arrival_order() {
        let mut buf = record(1, libc::IN_MOVED_FROM, 42, b"old", 1);
        buf.extend(record(1, libc::IN_MOVED_TO, 42, b"new", 1));
        buf.extend(record(2, libc::IN_CREATE | libc::IN_ISDIR, 0, b"sub", 1));
        let decoded: Vec<_> = records(&buf).collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].name, Some(OsString::from("old")));
        assert_eq!(decoded[0].cookie, 42);
        assert_eq!(decoded[1].name, Some(OsString::from("new")));
        assert_eq!(decoded[1].cookie, 42);
        assert!(decoded[2].mask.contains(EventMask::CREATE | EventMask::ISDIR));
    }

    #[test]
    #[should_panic(expected = "truncated record")]
    fn must_reject_truncated_record() {
        let buf = record(1, libc::IN_CREATE, 0, b"bar", 1);
        let _ = records(&buf[..buf.len() - 2]).count();
    }
}
