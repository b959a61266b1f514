//! Append-only byte builder used to assemble every Info reply and ticker
//! frame: appenders never fail a small write, built around a single
//! growable `Vec<u8>` rather than a chunked ring, since a reply body is
//! built once and then flushed in full rather than streamed incrementally.

use std::fmt::Write as _;

/// A growable byte buffer with typed appenders. Preallocating `with_capacity`
/// bytes plays the role of an optional fixed backing buffer -- writes
/// within that capacity never reallocate, writes past it promote
/// transparently to a larger heap allocation, exactly as `Vec` already does.
#[derive(Default)]
pub struct DynBuf {
    data: Vec<u8>,
}

impl DynBuf {
    pub fn new() -> DynBuf {
        DynBuf { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> DynBuf {
        DynBuf { data: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn append_char(&mut self, c: u8) {
        self.data.push(c);
    }

    pub fn append_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    pub fn append_u64(&mut self, v: u64) {
        let _ = write!(self, "{}", v);
    }

    pub fn append_i64(&mut self, v: i64) {
        let _ = write!(self, "{}", v);
    }

    /// Hex-formatted unsigned value, lowercase, no `0x` prefix.
    pub fn append_u64_x(&mut self, v: u64) {
        let _ = write!(self, "{:x}", v);
    }

    pub fn append_bool(&mut self, v: bool) {
        self.append_str(if v { "true" } else { "false" });
    }

    /// Floating point with explicit decimal precision, matching the
    /// `avg_comp_sz / avg_orig_sz` style ratios the stats collector emits.
    pub fn append_f64(&mut self, v: f64, precision: usize) {
        let _ = write!(self, "{:.*}", precision, v);
    }

    /// Substitutes the literal `null` for an absent value.
    pub fn append_str_safe(&mut self, v: Option<&str>) {
        match v {
            Some(s) => self.append_str(s),
            None => self.append_str("null"),
        }
    }

    pub fn append_format(&mut self, args: std::fmt::Arguments) {
        let _ = self.write_fmt(args);
    }

    /// Appends a `key=value;` pair -- the canonical serialization unit of a
    /// reply body.
    pub fn append_pair(&mut self, key: &str, value: &str) {
        self.append_str(key);
        self.append_char(b'=');
        self.append_str(value);
        self.append_char(b';');
    }

    pub fn append_pair_u64(&mut self, key: &str, value: u64) {
        self.append_str(key);
        self.append_char(b'=');
        self.append_u64(value);
        self.append_char(b';');
    }

    pub fn append_pair_i64(&mut self, key: &str, value: i64) {
        self.append_str(key);
        self.append_char(b'=');
        self.append_i64(value);
        self.append_char(b';');
    }

    pub fn append_pair_bool(&mut self, key: &str, value: bool) {
        self.append_str(key);
        self.append_char(b'=');
        self.append_bool(value);
        self.append_char(b';');
    }

    pub fn append_pair_f64(&mut self, key: &str, value: f64, precision: usize) {
        self.append_str(key);
        self.append_char(b'=');
        self.append_f64(value, precision);
        self.append_char(b';');
    }

    /// Removes a single trailing byte if it matches `sentinel`. Used to chomp
    /// the final pair's trailing `;` before a reply is handed back.
    pub fn chomp(&mut self, sentinel: u8) {
        if self.data.last() == Some(&sentinel) {
            self.data.pop();
        }
    }
}

impl std::fmt::Write for DynBuf {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.data.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl std::io::Write for DynBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_form_is_key_eq_value_semicolon() {
        let mut buf = DynBuf::new();
        buf.append_pair("ns", "test");
        buf.append_pair_u64("objects", 42);
        buf.chomp(b';');

        assert_eq!(buf.as_slice(), b"ns=test;objects=42");
    }

    #[test]
    fn chomp_is_a_no_op_on_mismatched_sentinel() {
        let mut buf = DynBuf::new();
        buf.append_str("ok");
        buf.chomp(b';');

        assert_eq!(buf.as_slice(), b"ok");
    }

    #[test]
    fn safe_string_substitutes_null_for_absent_value() {
        let mut buf = DynBuf::new();
        buf.append_str_safe(None);

        assert_eq!(buf.as_slice(), b"null");
    }

    #[test]
    fn growth_past_initial_capacity_does_not_lose_data() {
        let mut buf = DynBuf::with_capacity(4);
        for i in 0..1000u64 {
            buf.append_pair_u64("k", i);
        }
        assert!(buf.len() > 4);
    }
}
