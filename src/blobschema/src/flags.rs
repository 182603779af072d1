//! Column flag word and storage mode derivation
//!
//! The native type word is 64 bits wide. The low byte holds the token id,
//! bits 8..48 are capability flags, bits 48..56 a token-scoped sub-id and
//! the top byte the bit width of packed bit columns.

use crate::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capability bits of a schema column
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default)]
    pub struct ColumnFlags: u64 {
        const REDUNDANTNAME = 1 << 8;
        const STRUCTPARAM = 1 << 9;
        const PRIMARY_KEY = 1 << 10;
        const INDIRECT = 1 << 11;
        const FIXED_ARRAY = 1 << 12;
        const EARRAY = 1 << 13;
        const ALWAYS_ALLOC = 1 << 14;
        const NON_NULL_REF = 1 << 15;
        const POOL_STRING = 1 << 16;
        const ESTRING = 1 << 17;
        const FLATEMBED = 1 << 18;
        const NO_TEXT_SAVE = 1 << 19;
        const NO_NETSEND = 1 << 20;
        const USEDFIELD = 1 << 21;
        const PERSIST = 1 << 22;
        const PARSETABLE_INFO = 1 << 23;
        const UNOWNED = 1 << 24;
        const KEY = 1 << 25;
        const GLOBAL_NAME = 1 << 26;
        const SERVER_ONLY = 1 << 27;
        const CLIENT_ONLY = 1 << 28;
        const SELF_ONLY = 1 << 29;
        const SUBSCRIBE = 1 << 30;
        const VOLATILE_REF = 1 << 31;
        const NO_INDEX = 1 << 32;
        const NO_WRITE = 1 << 33;
        const INHERITANCE_STRUCT = 1 << 34;
        const SPECIAL_DEFAULT = 1 << 35;
        const NO_LOG = 1 << 36;
        const EDIT_ONLY = 1 << 37;
        const NO_DIFF = 1 << 38;
        const SORT_KEY = 1 << 39;
    }
}

/// Mask of the token id inside a native type word
pub const TOKEN_MASK: u64 = 0xFF;

const SUB_ID_SHIFT: u32 = 48;
const BIT_WIDTH_SHIFT: u32 = 56;

impl ColumnFlags {
    /// Flags that select the storage mode (implied by a canonical type name)
    pub const STORAGE: ColumnFlags = ColumnFlags::INDIRECT
        .union(ColumnFlags::FIXED_ARRAY)
        .union(ColumnFlags::EARRAY);

    /// Split a native type word into token id and flags
    pub fn from_type_word(word: u64) -> (u8, ColumnFlags) {
        (
            (word & TOKEN_MASK) as u8,
            ColumnFlags::from_bits_retain(word & !TOKEN_MASK),
        )
    }

    /// Width of a packed bit column (top byte)
    pub fn bit_width(&self) -> u8 {
        (self.bits() >> BIT_WIDTH_SHIFT) as u8
    }

    /// Token-scoped sub-id (second byte from the top)
    pub fn sub_id(&self) -> u8 {
        (self.bits() >> SUB_ID_SHIFT) as u8
    }

    pub fn with_bit_width(self, width: u8) -> Self {
        let bits = (self.bits() & !(0xFFu64 << BIT_WIDTH_SHIFT)) | ((width as u64) << BIT_WIDTH_SHIFT);
        ColumnFlags::from_bits_retain(bits)
    }

    pub fn with_sub_id(self, sub_id: u8) -> Self {
        let bits = (self.bits() & !(0xFFu64 << SUB_ID_SHIFT)) | ((sub_id as u64) << SUB_ID_SHIFT);
        ColumnFlags::from_bits_retain(bits)
    }

    /// Named capability flags, excluding the storage selectors
    pub fn capability_names(&self) -> Vec<&'static str> {
        self.iter_names()
            .filter(|(_, flag)| !ColumnFlags::STORAGE.contains(*flag))
            .map(|(name, _)| name)
            .collect()
    }

    /// Parse a capability flag name as written in schema files
    pub fn from_flag_name(name: &str) -> Option<ColumnFlags> {
        ColumnFlags::from_name(name)
    }
}

/// How a column's values are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMode {
    DirectValue,
    DirectFixedArray,
    DirectArray,
    IndirectValue,
    IndirectFixedArray,
    IndirectArray,
}

impl StorageMode {
    pub const ALL: [StorageMode; 6] = [
        StorageMode::DirectValue,
        StorageMode::DirectFixedArray,
        StorageMode::DirectArray,
        StorageMode::IndirectValue,
        StorageMode::IndirectFixedArray,
        StorageMode::IndirectArray,
    ];

    /// Derive the single active storage mode from column flags
    pub fn from_flags(flags: ColumnFlags) -> Result<Self> {
        let indirect = flags.contains(ColumnFlags::INDIRECT);
        let fixed = flags.contains(ColumnFlags::FIXED_ARRAY);
        let earray = flags.contains(ColumnFlags::EARRAY);

        match (indirect, fixed, earray) {
            (_, true, true) => Err(Error::InvalidSchema(
                "FIXED_ARRAY and EARRAY are mutually exclusive".to_string(),
            )),
            (false, false, false) => Ok(StorageMode::DirectValue),
            (false, true, false) => Ok(StorageMode::DirectFixedArray),
            (false, false, true) => Ok(StorageMode::DirectArray),
            (true, false, false) => Ok(StorageMode::IndirectValue),
            (true, true, false) => Ok(StorageMode::IndirectFixedArray),
            (true, false, true) => Ok(StorageMode::IndirectArray),
        }
    }

    /// Flags that select this mode
    pub fn flags(self) -> ColumnFlags {
        match self {
            StorageMode::DirectValue => ColumnFlags::empty(),
            StorageMode::DirectFixedArray => ColumnFlags::FIXED_ARRAY,
            StorageMode::DirectArray => ColumnFlags::EARRAY,
            StorageMode::IndirectValue => ColumnFlags::INDIRECT,
            StorageMode::IndirectFixedArray => ColumnFlags::INDIRECT | ColumnFlags::FIXED_ARRAY,
            StorageMode::IndirectArray => ColumnFlags::INDIRECT | ColumnFlags::EARRAY,
        }
    }

    /// Position of this mode in a compatibility mask / canonical name table
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn mask_bit(self) -> u8 {
        1 << self.index()
    }

    pub fn is_fixed_array(self) -> bool {
        matches!(
            self,
            StorageMode::DirectFixedArray | StorageMode::IndirectFixedArray
        )
    }

    pub fn is_variable_array(self) -> bool {
        matches!(self, StorageMode::DirectArray | StorageMode::IndirectArray)
    }

    pub fn is_array(self) -> bool {
        self.is_fixed_array() || self.is_variable_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_from_flags() {
        assert_eq!(
            StorageMode::from_flags(ColumnFlags::empty()).unwrap(),
            StorageMode::DirectValue
        );
        assert_eq!(
            StorageMode::from_flags(ColumnFlags::INDIRECT | ColumnFlags::EARRAY).unwrap(),
            StorageMode::IndirectArray
        );
        assert_eq!(
            StorageMode::from_flags(ColumnFlags::FIXED_ARRAY | ColumnFlags::KEY).unwrap(),
            StorageMode::DirectFixedArray
        );
        assert!(StorageMode::from_flags(ColumnFlags::FIXED_ARRAY | ColumnFlags::EARRAY).is_err());
    }

    #[test]
    fn test_storage_mode_flags_inverse() {
        for mode in StorageMode::ALL {
            assert_eq!(StorageMode::from_flags(mode.flags()).unwrap(), mode);
        }
    }

    #[test]
    fn test_type_word_split() {
        let word = (7u64 << 56) | (3u64 << 48) | ColumnFlags::EARRAY.bits() | 23;
        let (token, flags) = ColumnFlags::from_type_word(word);
        assert_eq!(token, 23);
        assert_eq!(flags.bit_width(), 7);
        assert_eq!(flags.sub_id(), 3);
        assert!(flags.contains(ColumnFlags::EARRAY));
    }

    #[test]
    fn test_bit_width_roundtrip() {
        let flags = ColumnFlags::KEY.with_bit_width(12).with_sub_id(5);
        assert_eq!(flags.bit_width(), 12);
        assert_eq!(flags.sub_id(), 5);
        assert!(flags.contains(ColumnFlags::KEY));
        assert_eq!(flags.with_bit_width(3).bit_width(), 3);
    }

    #[test]
    fn test_capability_names_skip_storage() {
        let flags = ColumnFlags::INDIRECT | ColumnFlags::KEY | ColumnFlags::NO_LOG;
        assert_eq!(flags.capability_names(), vec!["KEY", "NO_LOG"]);
        assert_eq!(
            ColumnFlags::from_flag_name("POOL_STRING"),
            Some(ColumnFlags::POOL_STRING)
        );
        assert_eq!(ColumnFlags::from_flag_name("NOT_A_FLAG"), None);
    }
}
