//! Storage tiers
//!
//! A block resides in exactly one tier at any moment. Tier migrations and
//! multi-tier operations acquire tier locks in the fixed order
//! HOT → WARM → COLD; nothing ever acquires them in reverse.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tier a data block lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Copy-on-write, read-optimized recent data.
    Hot,
    /// Balanced middle tier.
    Warm,
    /// Merge-on-read, write-optimized old data.
    Cold,
}

impl Tier {
    /// All tiers in lock-acquisition (and scan) order.
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    /// Short name, used in block file names.
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    /// Parse a tier from its short name.
    pub fn from_name(name: &str) -> Option<Tier> {
        match name {
            "hot" => Some(Tier::Hot),
            "warm" => Some(Tier::Warm),
            "cold" => Some(Tier::Cold),
            _ => None,
        }
    }

    /// The tier blocks get promoted to, if any.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
