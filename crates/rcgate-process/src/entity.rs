//! Products the managed client can launch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A product whose processes the gateway may need to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Entity {
    #[serde(rename = "valorant")]
    Valorant,
    #[serde(rename = "bacon")]
    LegendsOfRuneterra,
    #[serde(rename = "league_of_legends")]
    LeagueOfLegends,
}

impl Entity {
    /// Every entity in the catalog.
    pub const ALL: [Entity; 3] = [
        Entity::Valorant,
        Entity::LegendsOfRuneterra,
        Entity::LeagueOfLegends,
    ];

    /// The product id the managed client uses.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Valorant => "valorant",
            Self::LegendsOfRuneterra => "bacon",
            Self::LeagueOfLegends => "league_of_legends",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Entity {
    type Err = EntityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity| entity.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| EntityParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown entity: {0}")]
pub struct EntityParseError(String);
