use std::time::Duration;

use crate::bus::DEFAULT_BUS_CAPACITY;

/// Default size of a single uplink read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default deadline for send-and-wait commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Uplink processor tuning.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Bytes requested from the transport per read.
    pub read_chunk_size: usize,
    /// Initial capacity of the reassembly buffer.
    pub initial_buffer_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            initial_buffer_capacity: 2 * DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Printer session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Events buffered per subscriber before it lags.
    pub bus_capacity: usize,
    /// Deadline applied to every send-and-wait command.
    pub command_timeout: Duration,
    pub processor: ProcessorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_BUS_CAPACITY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            processor: ProcessorConfig::default(),
        }
    }
}
