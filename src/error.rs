use thiserror::Error;

/// Why a line from the receiver was not turned into a reading
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("line is not valid UTF-8")]
    NotText,
    #[error("expected 7 tokens, got {0}")]
    TokenCount(usize),
    #[error("line does not start with OK: {0:?}")]
    NotOk(String),
    #[error("unsupported protocol family: {0:?}")]
    UnsupportedFamily(String),
    #[error("payload byte {index} is not an unsigned 8-bit value: {token:?}")]
    InvalidByte { index: usize, token: String },
    #[error("unsupported sensor type {sensor_type} from sensor {device_id} (type byte {type_byte})")]
    UnsupportedSensorType {
        device_id: u8,
        sensor_type: u8,
        type_byte: u8,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("evict threshold ({evict_after:?}) must exceed reachable threshold ({reachable_after:?})")]
    Staleness {
        reachable_after: std::time::Duration,
        evict_after: std::time::Duration,
    },
    #[error("read interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("line source closed and reopening is disabled")]
    SourceClosed,
    #[error(transparent)]
    Source(#[from] SourceError),
}
