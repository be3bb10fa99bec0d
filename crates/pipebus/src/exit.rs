use std::fmt;
use std::io;

use pipebus_core::BusError;
use pipebus_transport::TransportError;

// Process exit codes; 64/124/125 follow sysexits and timeout conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Pair(source)
        | TransportError::Nonblocking { source, .. }
        | TransportError::Io(source) => io_error(context, source),
    }
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    match err {
        BusError::Io(source) => io_error(context, source),
        BusError::InvalidBufferSize { .. }
        | BusError::InvalidChunkLimit
        | BusError::PayloadTooLarge { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        BusError::ConnectionClosed | BusError::ShortWrite { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        BusError::AbnormalChunk { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        BusError::AllocationFailed { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
