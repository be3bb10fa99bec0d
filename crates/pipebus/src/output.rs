use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipebus_wire::DataHead;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of one `pump` run.
#[derive(Serialize)]
pub struct PumpReport {
    pub schema_id: &'static str,
    pub transport: &'static str,
    pub messages: usize,
    pub payload_size: usize,
    pub buffer_size: usize,
    pub always_chunked: bool,
    pub total_bytes: usize,
    pub elapsed_ms: u128,
    pub throughput_mib_s: f64,
    pub abnormal_packets: u64,
}

pub const PUMP_REPORT_SCHEMA: &str =
    "https://schemas.3leaps.dev/pipebus/cli/v1/pump-report.schema.json";

pub fn print_report(report: &PumpReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "TRANSPORT",
                    "MESSAGES",
                    "PAYLOAD",
                    "BYTES",
                    "ELAPSED",
                    "THROUGHPUT",
                ])
                .add_row(vec![
                    report.transport.to_string(),
                    report.messages.to_string(),
                    report.payload_size.to_string(),
                    report.total_bytes.to_string(),
                    format!("{} ms", report.elapsed_ms),
                    format!("{:.1} MiB/s", report.throughput_mib_s),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "transport={} messages={} payload={} bytes={} elapsed={}ms throughput={:.1}MiB/s",
                report.transport,
                report.messages,
                report.payload_size,
                report.total_bytes,
                report.elapsed_ms,
                report.throughput_mib_s,
            );
        }
    }
}

/// Environment and protocol constants reported by `envinfo`.
#[derive(Serialize)]
pub struct EnvReport {
    pub schema_id: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub head_len: usize,
    pub default_buffer_size: usize,
    pub default_max_recv_chunk_count: usize,
    pub fallback_chunk_size: usize,
}

pub const ENV_REPORT_SCHEMA: &str =
    "https://schemas.3leaps.dev/pipebus/cli/v1/env-report.schema.json";

pub fn print_env(report: &EnvReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEY", "VALUE"]);
            for (key, value) in env_rows(report) {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = env_rows(report)
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn env_rows(report: &EnvReport) -> Vec<(&'static str, String)> {
    vec![
        ("os", report.os.to_string()),
        ("arch", report.arch.to_string()),
        ("head_len", report.head_len.to_string()),
        ("default_buffer_size", report.default_buffer_size.to_string()),
        (
            "default_max_recv_chunk_count",
            report.default_max_recv_chunk_count.to_string(),
        ),
        ("fallback_chunk_size", report.fallback_chunk_size.to_string()),
    ]
}

#[derive(Serialize)]
struct HeadOutput {
    fd: i64,
    msg_id: u64,
    len: u32,
    reactor_id: i16,
    type_tag: u8,
    flags: u8,
    server_fd: u16,
    ext_flags: u16,
    time: f64,
}

pub fn print_head(head: &DataHead, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = HeadOutput {
                fd: head.fd,
                msg_id: head.msg_id,
                len: head.len,
                reactor_id: head.reactor_id,
                type_tag: head.type_tag,
                flags: head.flags,
                server_fd: head.server_fd,
                ext_flags: head.ext_flags,
                time: head.time,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{}", head.dump());
        }
    }
}
