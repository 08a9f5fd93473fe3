use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

pub mod protocol;

pub use protocol::{is_valid_username, BattleOutcome, ParseError, Reply, Request, Verb};

/// How long the server blocks on a receive before running maintenance.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Idle time after which a session is evicted.
pub const SESSION_TTL: Duration = Duration::from_secs(15);
/// How often a logged-in client touches its session.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound on battle turns (10 exchanges per side).
pub const MAX_BATTLE_TURNS: u32 = 20;
/// Health given to an account the first time it selects stats.
pub const DEFAULT_HEALTH: u32 = 2;
/// Largest datagram either side expects to read.
pub const MAX_DATAGRAM_SIZE: usize = 4096;
pub const DEFAULT_PORT: u16 = 9999;

/// The four values a player picks on the stat-selection screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSelection {
    pub sword_damage: u32,
    pub shield_defense: u32,
    pub slaying_strength: u32,
    pub healing_strength: u32,
}

/// Progression stats stored per account, plus current health.
///
/// Field names on disk follow the account file written by earlier
/// server versions, so existing databases keep loading. Those versions
/// also stored the values as strings (`"sword_damage": "5"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    #[serde(deserialize_with = "stat_value")]
    pub sword_damage: u32,
    #[serde(deserialize_with = "stat_value")]
    pub shield_defense: u32,
    #[serde(rename = "slaying_potion_strength", deserialize_with = "stat_value")]
    pub slaying_strength: u32,
    #[serde(rename = "healing_potion_strength", deserialize_with = "stat_value")]
    pub healing_strength: u32,
    #[serde(default = "default_health", deserialize_with = "stat_value")]
    pub health: u32,
}

fn default_health() -> u32 {
    DEFAULT_HEALTH
}

/// Reads a stat written either as a number or as a numeric string
///
/// Only self-describing formats can carry the string form; binary formats
/// read a plain `u32`.
fn stat_value<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u32),
        Text(String),
    }

    if !deserializer.is_human_readable() {
        return u32::deserialize(deserializer);
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid stat value '{}'", text))),
    }
}

impl StatBlock {
    pub fn new(selection: StatSelection, health: u32) -> Self {
        Self {
            sword_damage: selection.sword_damage,
            shield_defense: selection.shield_defense,
            slaying_strength: selection.slaying_strength,
            healing_strength: selection.healing_strength,
            health,
        }
    }

    pub fn selection(&self) -> StatSelection {
        StatSelection {
            sword_damage: self.sword_damage,
            shield_defense: self.shield_defense,
            slaying_strength: self.slaying_strength,
            healing_strength: self.healing_strength,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

impl fmt::Display for StatSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.sword_damage, self.shield_defense, self.slaying_strength, self.healing_strength
        )
    }
}

/// Wire order is fixed: sword, shield, slaying, healing, health.
impl fmt::Display for StatBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.selection(), self.health)
    }
}

/// Parses `n` comma separated non-negative integers.
pub(crate) fn parse_csv_values(input: &str, n: usize) -> Result<Vec<u32>, String> {
    let values: Vec<&str> = input.split(',').map(str::trim).collect();
    if values.len() != n {
        return Err(format!(
            "Expected {} comma-separated values, got {}",
            n,
            values.len()
        ));
    }

    values
        .into_iter()
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| format!("Invalid stat value '{}'", v))
        })
        .collect()
}

impl std::str::FromStr for StatSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = parse_csv_values(s, 4)?;
        Ok(StatSelection {
            sword_damage: v[0],
            shield_defense: v[1],
            slaying_strength: v[2],
            healing_strength: v[3],
        })
    }
}

impl std::str::FromStr for StatBlock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = parse_csv_values(s, 5)?;
        Ok(StatBlock {
            sword_damage: v[0],
            shield_defense: v[1],
            slaying_strength: v[2],
            healing_strength: v[3],
            health: v[4],
        })
    }
}
