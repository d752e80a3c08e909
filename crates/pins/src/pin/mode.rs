use std::fmt;
use std::str::FromStr;

use crate::linked_data::Cid;

use super::pinner::PinError;

/// Filter for pin-status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Direct,
    Recursive,
    Indirect,
    All,
}

impl FromStr for PinMode {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "recursive" => Ok(Self::Recursive),
            "indirect" => Ok(Self::Indirect),
            "all" => Ok(Self::All),
            other => Err(PinError::InvalidPinType(other.to_string())),
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Recursive => "recursive",
            Self::Indirect => "indirect",
            Self::All => "all",
        };
        f.write_str(s)
    }
}

/// Why a key counts as pinned, or that it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinReason {
    Direct,
    Recursive,
    /// Reachable from the given recursively pinned root.
    Indirect { via: Cid },
    NotPinned,
}

impl fmt::Display for PinReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("pinned directly"),
            Self::Recursive => f.write_str("pinned recursively"),
            Self::Indirect { via } => write!(f, "pinned indirectly through {via}"),
            Self::NotPinned => f.write_str("not pinned"),
        }
    }
}

/// Answer to a pin-status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinStatus {
    pub pinned: bool,
    pub reason: PinReason,
}

impl PinStatus {
    pub(crate) fn pinned(reason: PinReason) -> Self {
        Self {
            pinned: true,
            reason,
        }
    }

    pub(crate) fn not_pinned() -> Self {
        Self {
            pinned: false,
            reason: PinReason::NotPinned,
        }
    }
}
