//! Tile taxonomy for the belief map.

use serde::{Deserialize, Serialize};

/// Classified state of one map cell.
///
/// The ordinal matters: every tile at or above [`Tile::Inaccessible`] blocks
/// movement, which is what the path planner keys on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tile {
    #[default]
    Unknown = 0,
    Accessible = 1,
    Door = 2,
    Gravel = 3,
    Inaccessible = 4,
    Mountain = 5,
    WeaponShopkeeper = 6,
    ItemShopkeeper = 7,
    PotionShopkeeper = 8,
    Banker = 9,
    Blacksmith = 10,
    Player = 11,
}

impl Tile {
    /// Whether the planner must route around this cell.
    pub fn is_blocking(&self) -> bool {
        (*self as u8) >= (Tile::Inaccessible as u8)
    }

    pub fn is_walkable(&self) -> bool {
        !self.is_blocking()
    }

    /// Non-player characters; the dynamic obstacles that may vacate a cell.
    pub fn is_actor(&self) -> bool {
        matches!(
            self,
            Tile::WeaponShopkeeper
                | Tile::ItemShopkeeper
                | Tile::PotionShopkeeper
                | Tile::Banker
                | Tile::Blacksmith
        )
    }

    /// Single-character glyph for map dumps.
    pub fn display_char(&self) -> char {
        match self {
            Tile::Unknown => '?',
            Tile::Accessible => '.',
            Tile::Door => '+',
            Tile::Gravel => ':',
            Tile::Inaccessible => '#',
            Tile::Mountain => '^',
            Tile::WeaponShopkeeper => 'w',
            Tile::ItemShopkeeper => 'i',
            Tile::PotionShopkeeper => 'p',
            Tile::Banker => 'b',
            Tile::Blacksmith => 's',
            Tile::Player => '@',
        }
    }
}
