//! Crate-level error types.

use std::path::PathBuf;

/// Errors raised by the device layer (discovery, open/close, configuration, channel control).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no device driver available for {0}")]
    DriverUnavailable(String),

    #[error("device not connected")]
    NotConnected,

    #[error("device already open")]
    AlreadyOpen,

    #[error("device is sampling; stop the measurement first")]
    Busy,

    #[error("invalid channel divider {0} (expected 1, 2, 4 or 8)")]
    InvalidDivider(u32),

    #[error("channel index {index} out of range (device has {count} channels)")]
    InvalidChannel { index: usize, count: usize },

    #[error("device reported error {code:#06x}: {message}")]
    Device { code: u16, message: String },
}

/// Errors raised while opening, running or closing a stream writer.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("stream already open")]
    AlreadyOpen,

    #[error("no enabled channels to stream")]
    NoChannels,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stream writer thread panicked")]
    WriterPanicked,
}

impl StreamError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised by the presentation layer.
#[derive(thiserror::Error, Debug)]
pub enum PresentError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("event loop failed: {0}")]
    EventLoop(String),

    #[error("cannot start plot forwarder: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<eframe::Error> for PresentError {
    fn from(error: eframe::Error) -> Self {
        Self::EventLoop(error.to_string())
    }
}

/// Errors raised while loading or saving a [`SessionConfig`](crate::config::SessionConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("HOME env var not set")]
    NoHome,

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Present(#[from] PresentError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The device-layer error carried by this error, if any.
    ///
    /// Stream and presentation errors that merely wrap a device failure count as device errors.
    pub fn as_device_error(&self) -> Option<&DeviceError> {
        match self {
            Self::Device(error)
            | Self::Stream(StreamError::Device(error))
            | Self::Present(PresentError::Device(error)) => Some(error),
            _ => None,
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_are_classified() {
        let wrapped: Error = StreamError::Device(DeviceError::Busy).into();
        assert_eq!(wrapped.as_device_error(), Some(&DeviceError::Busy));
        let wrapped: Error = PresentError::Device(DeviceError::NotConnected).into();
        assert_eq!(wrapped.as_device_error(), Some(&DeviceError::NotConnected));
    }

    #[test]
    fn test_forwarder_spawn_failure_is_not_a_device_error() {
        let spawn = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads left");
        let error: Error = PresentError::Spawn(spawn).into();
        assert!(error.as_device_error().is_none());
        assert!(error.to_string().contains("plot forwarder"));
    }
}
