use std::fmt;

use clap::ValueEnum;

/// How a change reaches the local cache and the remote store.
#[derive(Debug, Clone, Copy, Hash, ValueEnum, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Both writes run as detached tasks, failures are only logged.
    #[default]
    Independent,
    /// Local write first, then remote, the first failure is returned.
    WriteThrough,
}

impl SyncPolicy {
    pub fn waits(&self) -> bool {
        *self == Self::WriteThrough
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::WriteThrough => write!(f, "write-through"),
        }
    }
}
