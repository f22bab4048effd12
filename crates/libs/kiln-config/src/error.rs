//! Configuration error types.

/// Configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error(transparent)]
    IO(#[from] std::io::Error),

    /// TOML deserialization failed.
    #[error(transparent)]
    Deserialization(#[from] toml::de::Error),

    /// A required environment variable is not set.
    #[error("{0} is missing. Set the {0} environment variable")]
    MissingVar(&'static str),

    /// An environment variable holds a value that can't be used.
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The default build directory could not be derived from the executable path.
    #[error("Couldn't locate the worker executable to derive the build directory - {0}")]
    ExecutableDir(std::io::Error),
}
