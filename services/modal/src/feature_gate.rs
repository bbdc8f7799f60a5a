//! Pilot gate for the managed modal path
//!
//! The gate is a pure decision over an injected [`GateConfig`]. Loading the
//! configuration from the environment happens once, at the edge.

use config::{Config, ConfigError, Environment};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::custom_id::Feature;

/// Guild allow-list entry that admits every guild
pub const ALL_GUILDS: &str = "*";

/// Raw gate settings
///
/// # Environment Variables
/// - `MODAL_PROTOCOL_ENABLED`: global switch (default: false)
/// - `MODAL_PILOT_FEATURES`: comma separated feature names
/// - `MODAL_PILOT_GUILDS`: comma separated guild ids, `*` for all guilds
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub protocol_enabled: bool,
    #[serde(deserialize_with = "comma_list")]
    pub pilot_features: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub pilot_guilds: Vec<String>,
}

impl GateConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("MODAL"))
            .build()?
            .try_deserialize()
    }
}

/// Accepts a comma separated string, a bare number or a sequence of either.
/// Environment values arrive as strings, and guild ids are numeric.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    struct CommaList;

    impl<'de> Visitor<'de> for CommaList {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a comma separated string or a list")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::new();
            while let Some(entry) = seq.next_element::<Entry>()? {
                entries.push(match entry {
                    Entry::Text(text) => text,
                    Entry::Signed(number) => number.to_string(),
                    Entry::Unsigned(number) => number.to_string(),
                });
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(CommaList)
}

/// Decides whether the protocol handles events for a feature and guild
#[derive(Debug, Clone)]
pub struct FeatureGate {
    enabled: bool,
    features: HashSet<Feature>,
    all_guilds: bool,
    guilds: HashSet<String>,
}

impl FeatureGate {
    pub fn new(config: GateConfig) -> Self {
        let mut features = HashSet::new();
        for name in config.pilot_features.iter().map(|name| name.trim()) {
            if name.is_empty() {
                continue;
            }
            match name.parse::<Feature>() {
                Ok(feature) => {
                    features.insert(feature);
                }
                Err(e) => warn!("Ignoring pilot feature: {}", e),
            }
        }

        let guilds: HashSet<String> = config
            .pilot_guilds
            .iter()
            .map(|guild| guild.trim().to_string())
            .filter(|guild| !guild.is_empty())
            .collect();

        Self {
            enabled: config.protocol_enabled,
            features,
            all_guilds: guilds.contains(ALL_GUILDS),
            guilds,
        }
    }

    /// A gate that admits nothing
    pub fn disabled() -> Self {
        Self::new(GateConfig::default())
    }

    pub fn is_enabled(&self, feature: Feature, guild_id: Option<&str>) -> bool {
        if !self.enabled || !self.features.contains(&feature) {
            return false;
        }

        self.all_guilds || guild_id.is_some_and(|guild| self.guilds.contains(guild))
    }
}
