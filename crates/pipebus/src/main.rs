mod cmd;
mod exit;
mod output;

use clap::{Parser, ValueEnum};

use crate::cmd::Command;
use crate::output::OutputFormat;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Diagnostics go to stderr so report output on stdout stays parseable.
fn init_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(name = "pipebus", version, about = "Message bus diagnostics CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pump_subcommand() {
        let cli = Cli::try_parse_from([
            "pipebus",
            "pump",
            "--count",
            "10",
            "--size",
            "4096",
            "--chunked",
        ])
        .expect("pump args should parse");

        let Command::Pump(args) = cli.command else {
            panic!("expected pump command");
        };
        assert_eq!(args.count, 10);
        assert_eq!(args.size, 4096);
        assert!(args.chunked);
        assert!(!args.datagram);
    }

    #[test]
    fn parses_inspect_subcommand_with_flags() {
        let cli = Cli::try_parse_from([
            "pipebus",
            "inspect",
            "--msg-id",
            "9",
            "--len",
            "100",
            "--type",
            "7",
            "--chunk",
            "--begin",
        ])
        .expect("inspect args should parse");

        let Command::Inspect(args) = cli.command else {
            panic!("expected inspect command");
        };
        assert_eq!(args.msg_id, 9);
        assert_eq!(args.type_tag, 7);
        assert!(args.chunk && args.begin && !args.end);
    }

    #[test]
    fn parses_global_log_level() {
        let cli = Cli::try_parse_from(["pipebus", "--log-level", "debug", "version"])
            .expect("log level should parse");
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }

    #[test]
    fn rejects_unknown_output_format() {
        let err = Cli::try_parse_from(["pipebus", "--format", "yaml", "version"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
