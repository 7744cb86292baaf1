//! Centralized protocol constants.
//!
//! Values here are part of the wire contract with the host; changing any of
//! them breaks compatibility with existing hosts.

/// Framing and process-level constants.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Second process argument that turns on startup debug tracing.
    pub const DEBUG_LITERAL: &'static str = "debug";
    /// The length prefix is a big-endian u32, so no frame can exceed this.
    pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;
    pub const LENGTH_PREFIX_SIZE: usize = 4;
}

/// CSV dialect and header inference constants.
pub struct DatasetConfig;

impl DatasetConfig {
    pub const NA_TOKEN: &'static str = "?";
    pub const NA_REGEX: &'static str = r"^\?$";
    pub const QUOTE: u8 = b'\'';
    pub const ESCAPE: u8 = b'\\';
    /// Date format reported to the host in attribute headers.
    pub const HEADER_DATE_FORMAT: &'static str = "yyyy-MM-dd HH:mm:ss";
    /// strftime rendering for timestamps in CSV bodies; the quotes are literal.
    pub const CSV_TIMESTAMP_FORMAT: &'static str = "\"%Y-%m-%d %H:%M:%S\"";
    pub const CSV_DATE_FORMAT: &'static str = "\"%Y-%m-%d\"";
    pub const READ_BATCH_SIZE: usize = 8192;
}

/// Shared memory handle constants.
pub struct SharedMemoryConfig;

impl SharedMemoryConfig {
    /// Name under which the open handle is reported.
    pub const HANDLE_SLOT_NAME: &'static str = "handle";
}

/// Script execution constants.
pub struct ScriptConfig;

impl ScriptConfig {
    pub const EXCEPTION_MARKER: &'static str = "Got an exception executing script";
}
