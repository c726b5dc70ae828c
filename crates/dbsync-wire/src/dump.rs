//! Hex dumps for trace logging.

use std::fmt;

/// Bytes shown before a dump is cut short.
const DUMP_LIMIT: usize = 96;

/// Displays a buffer as hex bytes, truncated after a fixed number of bytes.
///
/// ```
/// use dbsync_wire::HexDump;
///
/// assert_eq!(HexDump(b"ds:0:").to_string(), "64 73 3a 30 3a");
/// ```
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(DUMP_LIMIT)];
        for (i, byte) in shown.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > shown.len() {
            write!(f, " ..(+{} bytes)", self.0.len() - shown.len())?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_buffers_are_truncated() {
        let data = vec![0xabu8; DUMP_LIMIT + 4];
        let dump = HexDump(&data).to_string();
        assert!(dump.ends_with(" ..(+4 bytes)"));
        assert_eq!(dump.matches("ab").count(), DUMP_LIMIT);
    }
}
