use std::{fmt, io};

/// Crate-wide `Result` type using [`StreamError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Top-level error type for a streaming run.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum StreamError {
    /// Configuration errors.
    Config(ConfigError),

    /// Consumer process errors.
    Consumer(ConsumerError),

    /// Scan pipeline errors.
    Scan(ScanError),

    /// Data source errors (connect, query, fetch).
    DataSource(sqlx::Error),

    /// I/O errors.
    Io(io::Error),

    /// The run was cancelled by an interrupt or terminate signal.
    Cancelled,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config or credentials file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Consumer process errors.
#[derive(Debug)]
pub enum ConsumerError {
    /// The consumer executable could not be located on the search path.
    NotFound(String),

    /// The consumer could not be started for another reason.
    SpawnFailed { program: String, source: io::Error },

    /// The consumer closed its input before the stream was complete.
    InputClosed(String),

    /// The consumer exited with a non-zero status after all input was sent.
    Exited { code: i32, rows_streamed: u64 },
}

/// Scan pipeline errors.
#[derive(Debug)]
pub enum ScanError {
    /// A row field contains a byte that would corrupt the record framing.
    Encoding { field: &'static str, value: String },

    /// The sink was used after it was finalized.
    SinkFinalized,
}

impl StreamError {
    /// Process exit status that reports this error to the operator.
    ///
    /// A consumer that failed on its own propagates its code; everything
    /// else exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            StreamError::Consumer(ConsumerError::Exited { code, .. }) => *code,
            _ => 1,
        }
    }

    /// Shorthand for an invalid configuration value.
    pub fn invalid_value(field: impl Into<String>, value: impl fmt::Display) -> Self {
        StreamError::Config(ConfigError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
        })
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Config(e) => write!(f, "Configuration error: {e}"),
            StreamError::Consumer(e) => write!(f, "{e}"),
            StreamError::Scan(e) => write!(f, "Scan error: {e}"),
            StreamError::DataSource(e) => write!(f, "Data source error: {e}"),
            StreamError::Io(e) => write!(f, "I/O error: {e}"),
            StreamError::Cancelled => write!(f, "Cancelled by signal"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "File not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerError::NotFound(program) => write!(f, "{program} not found in PATH"),
            ConsumerError::SpawnFailed { program, source } => {
                write!(f, "Failed to start {program}: {source}")
            }
            ConsumerError::InputClosed(msg) => write!(f, "Consumer input closed: {msg}"),
            ConsumerError::Exited {
                code,
                rows_streamed,
            } => write!(
                f,
                "Consumer exited with {code} after receiving {rows_streamed} rows"
            ),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Encoding { field, value } => {
                write!(f, "Field '{field}' contains a tab or line break: {value:?}")
            }
            ScanError::SinkFinalized => write!(f, "Sink already finalized"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::DataSource(e) => Some(e),
            StreamError::Io(e) => Some(e),
            StreamError::Consumer(ConsumerError::SpawnFailed { source, .. }) => Some(source),
            _ => None,
        }
    }
}
impl std::error::Error for ConfigError {}
impl std::error::Error for ConsumerError {}
impl std::error::Error for ScanError {}

/* ========================= Conversions to StreamError ========================= */

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::Io(err)
    }
}

impl From<sqlx::Error> for StreamError {
    fn from(err: sqlx::Error) -> Self {
        StreamError::DataSource(err)
    }
}

impl From<ConfigError> for StreamError {
    fn from(err: ConfigError) -> Self {
        StreamError::Config(err)
    }
}

impl From<ConsumerError> for StreamError {
    fn from(err: ConsumerError) -> Self {
        StreamError::Consumer(err)
    }
}

impl From<ScanError> for StreamError {
    fn from(err: ScanError) -> Self {
        StreamError::Scan(err)
    }
}

impl From<toml::de::Error> for StreamError {
    fn from(err: toml::de::Error) -> Self {
        StreamError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}
