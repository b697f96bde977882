//! Rate limit tier configuration.
//!
//! Tiers are evaluated in the order they are written, not in order of
//! window length. A tier may be written with its window in seconds or as a
//! named unit:
//!
//! ```yaml
//! tiers:
//!   - window: 1
//!     max_requests: 10
//!   - window: minute
//!     max_requests: 10
//!   - window_secs: 3600
//!     max_requests: 300
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TollgateError};

/// Named window lengths accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn as_secs(&self) -> u64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3600,
            TimeUnit::Day => 86400,
        }
    }
}

/// One (window duration, request ceiling) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Window length in seconds
    #[serde(alias = "window", deserialize_with = "deserialize_window")]
    pub window_secs: u64,
    /// Requests admitted per window
    pub max_requests: u64,
}

impl Tier {
    pub const fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WindowSpec {
    Seconds(u64),
    Unit(TimeUnit),
}

fn deserialize_window<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match WindowSpec::deserialize(deserializer)? {
        WindowSpec::Seconds(secs) => secs,
        WindowSpec::Unit(unit) => unit.as_secs(),
    })
}

/// Tiers used when none are configured: 10/s, 10/min, 300/h.
pub const DEFAULT_TIERS: [Tier; 3] = [Tier::new(1, 10), Tier::new(60, 10), Tier::new(3600, 300)];

/// A validated, ordered, non-empty list of tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierSet {
    tiers: Vec<Tier>,
}

impl TierSet {
    /// Build a tier set, rejecting empty lists and zero durations or limits.
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(TollgateError::Config(
                "at least one rate limit tier is required".to_string(),
            ));
        }

        for (index, tier) in tiers.iter().enumerate() {
            if tier.window_secs == 0 {
                return Err(TollgateError::Config(format!(
                    "tier {} has a zero-length window",
                    index
                )));
            }
            if tier.max_requests == 0 {
                return Err(TollgateError::Config(format!(
                    "tier {} admits zero requests",
                    index
                )));
            }
        }

        Ok(Self { tiers })
    }

    /// Load tiers from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit tiers");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse tiers from YAML, either a bare list or a `tiers:` mapping.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Wrapped {
            tiers: TierSet,
        }

        let parse_error =
            |e: serde_yaml::Error| TollgateError::Config(format!("Failed to parse rate limit tiers: {}", e));

        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;
        if value.is_mapping() {
            serde_yaml::from_value::<Wrapped>(value)
                .map(|wrapped| wrapped.tiers)
                .map_err(parse_error)
        } else {
            serde_yaml::from_value(value).map_err(parse_error)
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tier> {
        self.tiers.iter()
    }

    pub fn as_slice(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierSet {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }
}

impl TryFrom<Vec<Tier>> for TierSet {
    type Error = TollgateError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<TierSet> for Vec<Tier> {
    fn from(set: TierSet) -> Self {
        set.tiers
    }
}

impl<'a> IntoIterator for &'a TierSet {
    type Item = &'a Tier;
    type IntoIter = std::slice::Iter<'a, Tier>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiers.iter()
    }
}
