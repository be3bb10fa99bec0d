use pipebus_wire::HEAD_LEN;

use crate::error::{BusError, Result};

/// Default capacity of one chunk buffer: header plus payload fits the
/// kernel's pipe atomic-write region.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default fairness limit: chunks consumed per `read` invocation before the
/// bus yields back to the event loop.
pub const DEFAULT_MAX_RECV_CHUNK_COUNT: usize = 1024;

/// Hard floor for the writer's per-chunk payload size after the kernel
/// rejects a record as too large.
pub const FALLBACK_CHUNK_SIZE: usize = 8 * 1024;

/// Tunables for one bus instance.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of one chunk buffer, header included.
    /// Lower bound `HEAD_LEN + 1`.
    pub buffer_size: usize,
    /// Use the chunked path even when a payload fits in one record.
    pub always_chunked_transfer: bool,
    /// Fairness limit per `read` invocation.
    pub max_recv_chunk_count: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            always_chunked_transfer: false,
            max_recv_chunk_count: DEFAULT_MAX_RECV_CHUNK_COUNT,
        }
    }
}

impl BusConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.buffer_size <= HEAD_LEN {
            return Err(BusError::InvalidBufferSize {
                size: self.buffer_size,
                min: HEAD_LEN + 1,
            });
        }
        if self.max_recv_chunk_count == 0 {
            return Err(BusError::InvalidChunkLimit);
        }
        Ok(())
    }

    /// Largest payload slice that fits in one record at the current
    /// buffer size.
    pub fn max_chunk_payload(&self) -> usize {
        self.buffer_size - HEAD_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_buffer_smaller_than_header() {
        let cfg = BusConfig {
            buffer_size: HEAD_LEN,
            ..BusConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(BusError::InvalidBufferSize { .. })
        ));
    }

    #[test]
    fn rejects_zero_chunk_limit() {
        let cfg = BusConfig {
            max_recv_chunk_count: 0,
            ..BusConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BusError::InvalidChunkLimit)));
    }

    #[test]
    fn max_chunk_payload_excludes_header() {
        let cfg = BusConfig {
            buffer_size: 128,
            ..BusConfig::default()
        };
        assert_eq!(cfg.max_chunk_payload(), 128 - HEAD_LEN);
    }
}
