pub mod io;

use std::fmt;

/// Hex rendering of raw bytes for log output.
pub struct BinaryData<'a>(pub &'a [u8]);

impl<'a> fmt::Display for BinaryData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl<'a> fmt::Debug for BinaryData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
