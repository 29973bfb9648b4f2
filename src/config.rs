//! Validated configuration for both roles.
//!
//! The CLI in `main.rs` parses raw arguments into these types; library users
//! and tests build them directly.  Anything that fails validation here is a
//! startup error: no transfer is attempted with a bad configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// Default wait for one round of acknowledgments.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(1);
/// Default number of FIN transmissions before the sender gives up.
pub const DEFAULT_FIN_RETRIES: u32 = 10;
/// Default receiver idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time the receiver keeps answering FINs after closing.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(2);
/// Prefix of the receiver's output file name.
pub const OUTPUT_PREFIX: &str = "n_";

/// Configuration errors; all of them are fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("probability must be between 0 and 1 inclusive, got {0}")]
    ProbabilityOutOfRange(f64),
    #[error("invalid probability {0:?}")]
    InvalidProbability(String),
    #[error("window size must be positive")]
    ZeroWindow,
    #[error("chunk size must be between 1 and {max}, got {got}")]
    ChunkSize { got: usize, max: usize },
    #[error("file name must not be empty")]
    EmptyFileName,
    #[error("file name of {0} bytes does not fit in a request packet")]
    FileNameTooLong(usize),
}

/// A probability in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Probability(f64);

impl Probability {
    pub const NEVER: Probability = Probability(0.0);
    pub const ALWAYS: Probability = Probability(1.0);

    pub fn new(p: f64) -> Result<Self, ConfigError> {
        // NaN fails the range check as well.
        if (0.0..=1.0).contains(&p) {
            Ok(Self(p))
        } else {
            Err(ConfigError::ProbabilityOutOfRange(p))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl FromStr for Probability {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p: f64 = s
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidProbability(s.to_string()))?;
        Self::new(p)
    }
}

impl std::fmt::Display for Probability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fault model applied to every impaired send.
#[derive(Debug, Clone, Default)]
pub struct ImpairmentConfig {
    /// Probability that a send is silently suppressed.
    pub loss: Probability,
    /// Probability that a send goes out with the corrupt flag set.
    pub corrupt: Probability,
    /// Seed for reproducible fault sequences; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl ImpairmentConfig {
    pub fn new(loss: Probability, corrupt: Probability) -> Self {
        Self {
            loss,
            corrupt,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Sender (server) role configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub bind: SocketAddr,
    /// Number of chunks transmitted per round.
    pub window: usize,
    /// Bytes per data chunk, at most [`MAX_PAYLOAD`].
    pub chunk_size: usize,
    /// Directory requested file names are resolved against.
    pub root: PathBuf,
    pub round_timeout: Duration,
    /// FIN transmissions before the session is released without a FIN-ACK.
    pub fin_retries: u32,
    /// Consecutive rounds without progress before a transfer is abandoned.
    pub max_stalled_rounds: Option<u32>,
    pub impairment: ImpairmentConfig,
}

impl SenderConfig {
    pub fn new(bind: SocketAddr, window: usize, impairment: ImpairmentConfig) -> Self {
        Self {
            bind,
            window,
            chunk_size: MAX_PAYLOAD,
            root: PathBuf::from("."),
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            fin_retries: DEFAULT_FIN_RETRIES,
            max_stalled_rounds: None,
            impairment,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(ConfigError::ChunkSize {
                got: self.chunk_size,
                max: MAX_PAYLOAD,
            });
        }
        Ok(())
    }
}

/// Receiver (client) role configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    pub file_name: String,
    /// Where the received bytes are written.
    pub output: PathBuf,
    /// Longest wait for any packet; `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub linger: Duration,
    pub impairment: ImpairmentConfig,
}

impl ReceiverConfig {
    /// Build a configuration writing to `n_<file_name>` in the working directory.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        file_name: impl Into<String>,
        impairment: ImpairmentConfig,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            host: host.into(),
            port,
            output: default_output_path(&file_name),
            file_name,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            linger: DEFAULT_LINGER,
            impairment,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_name.is_empty() {
            return Err(ConfigError::EmptyFileName);
        }
        if self.file_name.len() > MAX_PAYLOAD {
            return Err(ConfigError::FileNameTooLong(self.file_name.len()));
        }
        Ok(())
    }
}

/// `n_<base name>` in the working directory.
pub fn default_output_path(file_name: &str) -> PathBuf {
    let base = std::path::Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    PathBuf::from(format!("{OUTPUT_PREFIX}{base}"))
}
