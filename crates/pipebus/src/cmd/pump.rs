use std::time::{Duration, Instant};

use pipebus_core::{BusConfig, MessageBus, ReadStatus, SendData};
use pipebus_transport::{dgram_pair, stream_pair, BusSocket, DgramSocket, PipeSocket};
use tracing::debug;

use crate::cmd::PumpArgs;
use crate::exit::{
    bus_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::output::{print_report, OutputFormat, PumpReport, PUMP_REPORT_SCHEMA};

const PUMP_DEADLINE: Duration = Duration::from_secs(30);

/// Stream mode runs in lockstep, so one whole message must fit the kernel
/// socket buffer. Datagram mode has no such bound.
const MAX_STREAM_PAYLOAD: usize = 128 * 1024;

pub fn run(args: PumpArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.datagram && args.size > MAX_STREAM_PAYLOAD {
        return Err(CliError::new(
            USAGE,
            format!("--size above {MAX_STREAM_PAYLOAD} requires --datagram"),
        ));
    }

    let config = BusConfig {
        buffer_size: args.buffer_size,
        always_chunked_transfer: args.chunked,
        ..BusConfig::default()
    };

    let payload: Vec<u8> = (0..args.size).map(|i| (i % 251) as u8).collect();
    let started = Instant::now();

    let abnormal = if args.datagram {
        let (tx, rx) = dgram_pair().map_err(|err| transport_error("socket pair", err))?;
        pump_dgram(&config, tx, rx, args.count, &payload)?
    } else {
        let (tx, rx) = stream_pair().map_err(|err| transport_error("socket pair", err))?;
        pump_stream(&config, tx, rx, args.count, &payload)?
    };

    let elapsed = started.elapsed();
    let total_bytes = args.count * args.size;
    let throughput_mib_s = if elapsed.as_secs_f64() > 0.0 {
        total_bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
    } else {
        0.0
    };

    let report = PumpReport {
        schema_id: PUMP_REPORT_SCHEMA,
        transport: if args.datagram { "dgram" } else { "stream" },
        messages: args.count,
        payload_size: args.size,
        buffer_size: args.buffer_size,
        always_chunked: args.chunked,
        total_bytes,
        elapsed_ms: elapsed.as_millis(),
        throughput_mib_s,
        abnormal_packets: abnormal,
    };
    print_report(&report, format);

    Ok(SUCCESS)
}

/// Lockstep pump over a stream pair: each message is written whole, then
/// drained, so the reader never observes a torn record.
fn pump_stream(
    config: &BusConfig,
    tx: PipeSocket,
    rx: PipeSocket,
    count: usize,
    payload: &[u8],
) -> CliResult<u64> {
    let mut sender =
        MessageBus::with_config(config.clone()).map_err(|err| bus_error("sender bus", err))?;
    let mut receiver =
        MessageBus::with_config(config.clone()).map_err(|err| bus_error("receiver bus", err))?;

    let outbound = bytes::Bytes::copy_from_slice(payload);
    for n in 0..count {
        sender
            .write(&tx, &SendData::new(1, outbound.clone()))
            .map_err(|err| bus_error("send", err))?;
        receive_one(&mut receiver, &rx, false, payload, n)?;
    }

    debug!(count, "stream pump complete");
    Ok(receiver.abnormal_packet_count())
}

/// Concurrent pump over a datagram pair: records are atomic, so the writer
/// thread and the polling reader overlap freely.
fn pump_dgram(
    config: &BusConfig,
    tx: DgramSocket,
    rx: DgramSocket,
    count: usize,
    payload: &[u8],
) -> CliResult<u64> {
    let mut sender =
        MessageBus::with_config(config.clone()).map_err(|err| bus_error("sender bus", err))?;
    let mut receiver =
        MessageBus::with_config(config.clone()).map_err(|err| bus_error("receiver bus", err))?;

    let outbound = bytes::Bytes::copy_from_slice(payload);
    let writer = std::thread::spawn(move || -> Result<(), pipebus_core::BusError> {
        for _ in 0..count {
            sender.write(&tx, &SendData::new(1, outbound.clone()))?;
        }
        Ok(())
    });

    for n in 0..count {
        receive_one(&mut receiver, &rx, true, payload, n)?;
    }

    debug!(count, "dgram pump complete");

    match writer.join() {
        Ok(result) => result.map_err(|err| bus_error("send", err))?,
        Err(_) => return Err(CliError::new(INTERNAL, "writer thread panicked")),
    }

    Ok(receiver.abnormal_packet_count())
}

fn receive_one(
    receiver: &mut MessageBus,
    rx: &dyn BusSocket,
    datagram: bool,
    expected: &[u8],
    index: usize,
) -> CliResult<()> {
    let deadline = Instant::now() + PUMP_DEADLINE;
    loop {
        let status = if datagram {
            receiver.read_with_buffer(rx)
        } else {
            receiver.read(rx)
        }
        .map_err(|err| bus_error("receive", err))?;

        match status {
            ReadStatus::Ready(_) => {
                let packet = receiver.get_packet();
                if packet.bytes() != expected {
                    return Err(CliError::new(
                        DATA_INVALID,
                        format!(
                            "payload mismatch on message {index}: got {} bytes, expected {}",
                            packet.len(),
                            expected.len()
                        ),
                    ));
                }
                // Detach reassembled storage so the pool stays flat.
                let _ = receiver.move_packet();
                return Ok(());
            }
            ReadStatus::Idle => {
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("pump stalled on message {index}"),
                    ));
                }
                std::thread::sleep(Duration::from_micros(200));
            }
        }
    }
}
