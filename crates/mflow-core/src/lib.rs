//! Core types for the mflow stream-processing node runtime: typed messages,
//! the htype-keyed codec registry, configuration, and throughput statistics.

mod codec;
mod config;
mod error;
mod message;
mod statistics;

pub use codec::{
    ArrayHandler, DHeaderHandler, DImageHandler, DSeriesEndHandler, HandlerError, MessageHandler,
    RawHandler, Registry, RegistryBuilder, RegistryError,
};
pub use config::{
    config_search_paths, load_instance_entry, Config, ConfigError, InstanceEntry,
    DEFAULT_CONNECT_ADDRESS, DEFAULT_DATA_QUEUE_LENGTH, DEFAULT_IPC_POLL_TIMEOUT_MILLIS,
    DEFAULT_IPC_TIMEOUT_SECS, DEFAULT_N_RECEIVING_THREADS, DEFAULT_RECEIVE_TIMEOUT_MILLIS,
    DEFAULT_REST_HOST, DEFAULT_REST_PORT, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_STARTUP_TIMEOUT_SECS, DEFAULT_ZMQ_QUEUE_LENGTH,
};
pub use error::NodeError;
pub use message::{
    MalformedFrame, Message, MessageData, ParameterMap, ParameterValue, RawFrame,
    ShapeDtypeUnavailable,
};
pub use statistics::{Statistics, StatisticsSample, StatisticsSnapshot, DEFAULT_STATISTICS_BUFFER_LENGTH};
