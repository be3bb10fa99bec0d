use pipebus_core::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_RECV_CHUNK_COUNT, FALLBACK_CHUNK_SIZE};
use pipebus_wire::HEAD_LEN;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_env, EnvReport, OutputFormat, ENV_REPORT_SCHEMA};

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let report = EnvReport {
        schema_id: ENV_REPORT_SCHEMA,
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        head_len: HEAD_LEN,
        default_buffer_size: DEFAULT_BUFFER_SIZE,
        default_max_recv_chunk_count: DEFAULT_MAX_RECV_CHUNK_COUNT,
        fallback_chunk_size: FALLBACK_CHUNK_SIZE,
    };
    print_env(&report, format);
    Ok(SUCCESS)
}
