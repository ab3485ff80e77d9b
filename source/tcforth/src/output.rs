use alloc::string::String;

/// Text produced by the VM (`.`, `emit`, diagnostics, `ok.`), drained by
/// the host after each line.
pub struct OutputBuf {
    buf: String,
    capacity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputError {
    OutputFull,
}

impl OutputBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_str(&mut self, stir: &str) -> Result<(), OutputError> {
        if self.buf.len() + stir.len() > self.capacity {
            return Err(OutputError::OutputFull);
        }
        self.buf.push_str(stir);
        Ok(())
    }

    /// Format `args` and push the result in one piece. Nothing is written if
    /// it doesn't fit.
    pub fn push_fmt(&mut self, args: core::fmt::Arguments<'_>) -> Result<(), OutputError> {
        match args.as_str() {
            Some(s) => self.push_str(s),
            None => self.push_str(&alloc::fmt::format(args)),
        }
    }

    /// Push raw bytes. Non-UTF-8 input is replaced rather than rejected.
    pub fn push_bstr(&mut self, bstr: &[u8]) -> Result<(), OutputError> {
        match core::str::from_utf8(bstr) {
            Ok(s) => self.push_str(s),
            Err(_) => self.push_str(&String::from_utf8_lossy(bstr)),
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

impl core::fmt::Write for OutputBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.push_str(s).map_err(|_| core::fmt::Error)
    }
}

#[cfg(test)]
pub mod test {
    use super::{OutputBuf, OutputError};
    use core::fmt::Write;

    #[test]
    fn fills_up() {
        let mut out = OutputBuf::new(8);
        write!(&mut out, "{} ", 10).unwrap();
        out.push_bstr(b"ok.").unwrap();
        assert_eq!(out.as_str(), "10 ok.");
        assert_eq!(out.push_str("\n\n\n"), Err(OutputError::OutputFull));
        assert_eq!(out.as_str(), "10 ok.");
        out.clear();
        assert_eq!(out.as_str(), "");
    }

    #[test]
    fn formatted_pushes_keep_the_cause() {
        let mut out = OutputBuf::new(4);
        out.push_fmt(format_args!("{} ", 12)).unwrap();
        assert_eq!(
            out.push_fmt(format_args!("{} ", 345)),
            Err(OutputError::OutputFull)
        );
        // all or nothing
        assert_eq!(out.as_str(), "12 ");
    }
}
