//! Column presentation hints
//!
//! The low byte of a column's native format word. Carried through schema
//! export and load, never consulted by the record codec.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Format {
    #[default]
    None,
    Ip,
    Unsigned,
    DateTime,
    Percent,
    Hsv,
    Texture,
    Color,
    FriendlyDate,
    FriendlySs2000,
    FriendlyCpr,
    Kbytes,
    Mbytes,
    Flags,
    Unknown(u8),
}

impl Format {
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Format::None,
            1 => Format::Ip,
            2 => Format::Unsigned,
            3 => Format::DateTime,
            4 => Format::Percent,
            5 => Format::Hsv,
            6 => Format::Texture,
            7 => Format::Color,
            8 => Format::FriendlyDate,
            9 => Format::FriendlySs2000,
            10 => Format::FriendlyCpr,
            11 => Format::Kbytes,
            12 => Format::Mbytes,
            13 => Format::Flags,
            other => Format::Unknown(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Format::None => 0,
            Format::Ip => 1,
            Format::Unsigned => 2,
            Format::DateTime => 3,
            Format::Percent => 4,
            Format::Hsv => 5,
            Format::Texture => 6,
            Format::Color => 7,
            Format::FriendlyDate => 8,
            Format::FriendlySs2000 => 9,
            Format::FriendlyCpr => 10,
            Format::Kbytes => 11,
            Format::Mbytes => 12,
            Format::Flags => 13,
            Format::Unknown(id) => id,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Format::None
    }
}
