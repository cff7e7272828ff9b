//! Store and tree configuration.
//!
//! Configuration can be built in code or loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `BLOCKTREE_FAN_OUT`: Maximum entries per node (default: as many as fit in a block)
//! - `BLOCKTREE_GROWTH_BLOCKS`: Blocks added each time the file grows (default: `16`)
//! - `BLOCKTREE_MAX_BLOCKS`: Hard limit on allocated blocks (default: unlimited)
//!
//! # Invariants
//!
//! - `growth_blocks` is at least 1
//! - `max_blocks`, when set, counts the header block

use crate::store::BlockIndex;

const FAN_OUT_VAR: &str = "BLOCKTREE_FAN_OUT";
const GROWTH_BLOCKS_VAR: &str = "BLOCKTREE_GROWTH_BLOCKS";
const MAX_BLOCKS_VAR: &str = "BLOCKTREE_MAX_BLOCKS";

/// Configuration for a memory-mapped block store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of blocks the backing file grows by when it runs out of room.
    pub growth_blocks: u64,
    /// Allocation limit; allocating past it fails with `StorageExhausted`.
    pub max_blocks: Option<BlockIndex>,
}

/// Configuration for opening a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeConfig {
    /// Entries per node. `None` uses the fan-out recorded in an existing
    /// file, or the largest fan-out that fits in a block for a new one.
    pub fan_out: Option<usize>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default file growth chunk.
    pub const DEFAULT_GROWTH_BLOCKS: u64 = 16;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let growth_blocks = parse_var::<u64>(&lookup, GROWTH_BLOCKS_VAR)?
            .unwrap_or(Self::DEFAULT_GROWTH_BLOCKS);
        if growth_blocks == 0 {
            return Err(ConfigError::InvalidValue {
                name: GROWTH_BLOCKS_VAR.to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let max_blocks = parse_var::<u64>(&lookup, MAX_BLOCKS_VAR)?;
        if max_blocks == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: MAX_BLOCKS_VAR.to_string(),
                message: "must leave room for the header block".to_string(),
            });
        }

        Ok(Self {
            growth_blocks,
            max_blocks,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            growth_blocks: Self::DEFAULT_GROWTH_BLOCKS,
            max_blocks: None,
        }
    }
}

impl TreeConfig {
    /// Configuration with an explicit fan-out.
    #[must_use]
    pub const fn with_fan_out(fan_out: usize) -> Self {
        Self {
            fan_out: Some(fan_out),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// The fan-out is range-checked against the key and record types when
    /// the tree is opened, not here.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            fan_out: parse_var::<usize>(&lookup, FAN_OUT_VAR)?,
        })
    }
}

/// Parse an optional numeric variable.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a valid non-negative integer"),
            }),
        None => Ok(None),
    }
}
