use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod envinfo;
pub mod inspect;
pub mod pump;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pump messages through a loopback socket pair and verify delivery.
    Pump(PumpArgs),
    /// Build a framing header and print its diagnostic dump.
    Inspect(InspectArgs),
    /// Show version and build provenance.
    Version(VersionArgs),
    /// Report environment and protocol constants.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Pump(args) => pump::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct PumpArgs {
    /// Number of messages to pump.
    #[arg(long, default_value_t = 100)]
    pub count: usize,
    /// Payload size per message in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub size: usize,
    /// Chunk buffer capacity, header included.
    #[arg(long, default_value_t = 8 * 1024)]
    pub buffer_size: usize,
    /// Force the chunked path even for payloads that fit one record.
    #[arg(long)]
    pub chunked: bool,
    /// Use a datagram socket pair instead of a stream pair.
    #[arg(long)]
    pub datagram: bool,
}

#[derive(Args, Debug, Default)]
pub struct InspectArgs {
    /// Connection id.
    #[arg(long, default_value_t = 0)]
    pub fd: i64,
    /// Message id.
    #[arg(long, default_value_t = 0)]
    pub msg_id: u64,
    /// Total payload length.
    #[arg(long, default_value_t = 0)]
    pub len: u32,
    /// Origin reactor id.
    #[arg(long, default_value_t = 0)]
    pub reactor_id: i16,
    /// Message type tag.
    #[arg(long = "type", default_value_t = 0)]
    pub type_tag: u8,
    /// Auxiliary server id.
    #[arg(long, default_value_t = 0)]
    pub server_fd: u16,
    /// Extension flags.
    #[arg(long, default_value_t = 0)]
    pub ext_flags: u16,
    /// Mark the record as one chunk of a series.
    #[arg(long)]
    pub chunk: bool,
    /// Mark the record as the first of a series.
    #[arg(long)]
    pub begin: bool,
    /// Mark the record as the last of a series.
    #[arg(long)]
    pub end: bool,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
