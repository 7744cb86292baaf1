//! Process-wide diagnostic capture.
//!
//! Everything the worker would print outside of script execution lands here
//! instead of the real stdout/stderr, which the host never reads. The host
//! drains it with `get_debug_buffer`.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Default)]
struct Buffers {
    out: String,
    err: String,
}

/// Shared stdout/stderr capture buffers.
///
/// Clones share the same buffers, so one clone can be handed to the log
/// subscriber while the worker keeps another.
#[derive(Debug, Clone, Default)]
pub struct DebugBuffer {
    inner: Arc<Mutex<Buffers>>,
}

impl DebugBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        // A writer panicking mid-append leaves at worst a partial line.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append to the stdout channel.
    pub fn write_out(&self, text: &str) {
        self.lock().out.push_str(text);
    }

    /// Append to the stderr channel.
    pub fn write_err(&self, text: &str) {
        self.lock().err.push_str(text);
    }

    /// Take both channels, leaving them empty.
    pub fn drain(&self) -> (String, String) {
        let mut buffers = self.lock();
        (
            std::mem::take(&mut buffers.out),
            std::mem::take(&mut buffers.err),
        )
    }
}

/// Log sink writing into the stderr channel of a [`DebugBuffer`].
pub struct DebugWriter {
    buffer: DebugBuffer,
}

impl io::Write for DebugWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write_err(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DebugBuffer {
    type Writer = DebugWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DebugWriter {
            buffer: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_drain_empties_both_channels() {
        let buffer = DebugBuffer::new();
        buffer.write_out("hello\n");
        buffer.write_err("oops\n");
        assert_eq!(buffer.drain(), ("hello\n".to_string(), "oops\n".to_string()));
        assert_eq!(buffer.drain(), (String::new(), String::new()));
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = DebugBuffer::new();
        let mut writer = buffer.clone().make_writer();
        writer.write_all(b"log line\n").unwrap();
        let (out, err) = buffer.drain();
        assert!(out.is_empty());
        assert_eq!(err, "log line\n");
    }
}
