//! Token catalog
//!
//! Every column names one of a fixed set of token kinds. A token knows which
//! storage modes it supports, the canonical type name used for each mode in
//! schema files, and what the two parameter slots of a column mean for it.

use crate::flags::{ColumnFlags, StorageMode};
use crate::{Error, Result};

/// Token kinds, indexed by their native id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Ignore,
    Start,
    End,
    Byte,
    Int16,
    Int32,
    Int64,
    Float,
    String,
    CurrentFile,
    Timestamp,
    LineNumber,
    Boolean,
    BooleanFlag,
    QuatPyr,
    MatPyr,
    Filename,
    Reference,
    FunctionCall,
    Structure,
    Polymorph,
    StashTable,
    Bit,
    MultiValue,
    Command,
}

/// What a column parameter slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    None,
    DefaultValue,
    DefaultString,
    NumberOfElements,
    StringLength,
    Size,
    StaticDefineList,
    Subtable,
    PolymorphTable,
    DictionaryName,
    CommandString,
}

impl ParameterKind {
    /// Slot holds a pointer to a string in native memory
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ParameterKind::DefaultString | ParameterKind::DictionaryName | ParameterKind::CommandString
        )
    }

    /// Slot holds a pointer to another parse table
    pub fn is_table(self) -> bool {
        matches!(self, ParameterKind::Subtable | ParameterKind::PolymorphTable)
    }

    /// Slot holds a plain integer
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ParameterKind::DefaultValue
                | ParameterKind::NumberOfElements
                | ParameterKind::StringLength
                | ParameterKind::Size
        )
    }
}

type Names = [Option<&'static str>; 6];

// Columns: DirectValue, DirectFixedArray, DirectArray, IndirectValue,
// IndirectFixedArray, IndirectArray
const fn direct(value: &'static str, fixed: &'static str, array: &'static str) -> Names {
    [Some(value), Some(fixed), Some(array), None, None, None]
}

const fn only(value: &'static str) -> Names {
    [Some(value), None, None, None, None, None]
}

impl Token {
    pub const ALL: [Token; 25] = [
        Token::Ignore,
        Token::Start,
        Token::End,
        Token::Byte,
        Token::Int16,
        Token::Int32,
        Token::Int64,
        Token::Float,
        Token::String,
        Token::CurrentFile,
        Token::Timestamp,
        Token::LineNumber,
        Token::Boolean,
        Token::BooleanFlag,
        Token::QuatPyr,
        Token::MatPyr,
        Token::Filename,
        Token::Reference,
        Token::FunctionCall,
        Token::Structure,
        Token::Polymorph,
        Token::StashTable,
        Token::Bit,
        Token::MultiValue,
        Token::Command,
    ];

    /// Look up a token by native id. Id 13 is a retired slot.
    pub fn from_id(id: u8) -> Result<Token> {
        let token = match id {
            0 => Token::Ignore,
            1 => Token::Start,
            2 => Token::End,
            3 => Token::Byte,
            4 => Token::Int16,
            5 => Token::Int32,
            6 => Token::Int64,
            7 => Token::Float,
            8 => Token::String,
            9 => Token::CurrentFile,
            10 => Token::Timestamp,
            11 => Token::LineNumber,
            12 => Token::Boolean,
            14 => Token::BooleanFlag,
            15 => Token::QuatPyr,
            16 => Token::MatPyr,
            17 => Token::Filename,
            18 => Token::Reference,
            19 => Token::FunctionCall,
            20 => Token::Structure,
            21 => Token::Polymorph,
            22 => Token::StashTable,
            23 => Token::Bit,
            24 => Token::MultiValue,
            25 => Token::Command,
            _ => return Err(Error::InvalidToken(id)),
        };
        Ok(token)
    }

    pub fn id(self) -> u8 {
        match self {
            Token::Ignore => 0,
            Token::Start => 1,
            Token::End => 2,
            Token::Byte => 3,
            Token::Int16 => 4,
            Token::Int32 => 5,
            Token::Int64 => 6,
            Token::Float => 7,
            Token::String => 8,
            Token::CurrentFile => 9,
            Token::Timestamp => 10,
            Token::LineNumber => 11,
            Token::Boolean => 12,
            Token::BooleanFlag => 14,
            Token::QuatPyr => 15,
            Token::MatPyr => 16,
            Token::Filename => 17,
            Token::Reference => 18,
            Token::FunctionCall => 19,
            Token::Structure => 20,
            Token::Polymorph => 21,
            Token::StashTable => 22,
            Token::Bit => 23,
            Token::MultiValue => 24,
            Token::Command => 25,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Token::Ignore => "Ignore",
            Token::Start => "Start",
            Token::End => "End",
            Token::Byte => "Byte",
            Token::Int16 => "Int16",
            Token::Int32 => "Int32",
            Token::Int64 => "Int64",
            Token::Float => "Float",
            Token::String => "String",
            Token::CurrentFile => "CurrentFile",
            Token::Timestamp => "Timestamp",
            Token::LineNumber => "LineNumber",
            Token::Boolean => "Boolean",
            Token::BooleanFlag => "BooleanFlag",
            Token::QuatPyr => "QuatPyr",
            Token::MatPyr => "MatPyr",
            Token::Filename => "Filename",
            Token::Reference => "Reference",
            Token::FunctionCall => "FunctionCall",
            Token::Structure => "Structure",
            Token::Polymorph => "Polymorph",
            Token::StashTable => "StashTable",
            Token::Bit => "Bit",
            Token::MultiValue => "MultiValue",
            Token::Command => "Command",
        }
    }

    /// Canonical type names, one slot per storage mode
    pub fn canonical_names(self) -> Names {
        match self {
            Token::Ignore => only("IGNORE"),
            Token::Start => only("START"),
            Token::End => only("END"),
            Token::Byte => direct("U8", "U8_FIXEDARRAY", "U8_EARRAY"),
            Token::Int16 => direct("INT16", "INT16_FIXEDARRAY", "INT16_EARRAY"),
            Token::Int32 => direct("INT", "INT_FIXEDARRAY", "INT_EARRAY"),
            Token::Int64 => direct("INT64", "INT64_FIXEDARRAY", "INT64_EARRAY"),
            Token::Float => direct("F32", "F32_FIXEDARRAY", "F32_EARRAY"),
            Token::String => [
                Some("FIXEDSTR"),
                None,
                None,
                Some("STRING"),
                Some("STRING_FIXEDARRAY"),
                Some("STRING_EARRAY"),
            ],
            Token::CurrentFile => [None, None, None, Some("CURRENTFILE"), None, None],
            Token::Timestamp => only("TIMESTAMP"),
            Token::LineNumber => only("LINENUM"),
            Token::Boolean => direct("BOOL", "BOOL_FIXEDARRAY", "BOOL_EARRAY"),
            Token::BooleanFlag => only("BOOLFLAG"),
            Token::QuatPyr => [Some("QUATPYR"), Some("QUATPYR_FIXEDARRAY"), None, None, None, None],
            Token::MatPyr => only("MATPYR"),
            Token::Filename => [None, None, None, Some("FILENAME"), None, Some("FILENAME_EARRAY")],
            Token::Reference => [Some("REFERENCE"), None, Some("REFERENCE_EARRAY"), None, None, None],
            Token::FunctionCall => [None, None, None, None, None, Some("FUNCTIONCALL")],
            Token::Structure => [
                Some("EMBEDDEDSTRUCT"),
                Some("EMBEDDEDSTRUCT_FIXEDARRAY"),
                None,
                Some("OPTIONALSTRUCT"),
                None,
                Some("STRUCT"),
            ],
            Token::Polymorph => [None, None, None, Some("OPTIONALPOLYMORPH"), None, Some("POLYMORPH")],
            Token::StashTable => [None, None, None, Some("STASHTABLE"), None, None],
            Token::Bit => only("BIT"),
            Token::MultiValue => [
                Some("MULTIVAL"),
                Some("MULTIVAL_FIXEDARRAY"),
                None,
                None,
                None,
                Some("MULTIVAL_EARRAY"),
            ],
            Token::Command => only("COMMAND"),
        }
    }

    /// Bit mask over [`StorageMode::index`] of supported modes
    pub fn storage_compatibility(self) -> u8 {
        self.canonical_names()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.is_some())
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    pub fn supports(self, mode: StorageMode) -> bool {
        self.storage_compatibility() & mode.mask_bit() != 0
    }

    pub fn canonical_name(self, mode: StorageMode) -> Option<&'static str> {
        self.canonical_names()[mode.index()]
    }

    /// Resolve a canonical type name back to token and storage mode
    pub fn from_canonical_name(name: &str) -> Result<(Token, StorageMode)> {
        for token in Token::ALL {
            for mode in StorageMode::ALL {
                if token.canonical_name(mode) == Some(name) {
                    return Ok((token, mode));
                }
            }
        }
        Err(Error::UnknownTypeName(name.to_string()))
    }

    /// Whether columns of this token occupy bytes in a record stream
    pub fn carries_data(self) -> bool {
        !matches!(
            self,
            Token::Ignore | Token::Start | Token::End | Token::Command
        )
    }

    /// Interpret parameter slot 0 or 1 under the given flags
    pub fn parameter_kind(self, flags: ColumnFlags, slot: usize) -> ParameterKind {
        let fixed = flags.contains(ColumnFlags::FIXED_ARRAY);
        let earray = flags.contains(ColumnFlags::EARRAY);
        let indirect = flags.contains(ColumnFlags::INDIRECT);

        let count_or = |otherwise: ParameterKind| {
            if fixed {
                ParameterKind::NumberOfElements
            } else if earray {
                ParameterKind::None
            } else {
                otherwise
            }
        };

        match (self, slot) {
            (Token::Ignore | Token::End | Token::FunctionCall | Token::StashTable, _) => {
                ParameterKind::None
            }
            (Token::Start, 0) => ParameterKind::Size,
            (Token::Start, _) => ParameterKind::None,
            (Token::Command, 0) => ParameterKind::CommandString,
            (Token::Command, _) => ParameterKind::None,
            (Token::String | Token::CurrentFile | Token::Filename, 0) => {
                if indirect {
                    count_or(ParameterKind::DefaultString)
                } else {
                    count_or(ParameterKind::StringLength)
                }
            }
            (Token::Reference, 0) => count_or(ParameterKind::None),
            (Token::Reference, _) => ParameterKind::DictionaryName,
            (Token::Structure, 0) => count_or(ParameterKind::Size),
            (Token::Structure, _) => ParameterKind::Subtable,
            (Token::Polymorph, 0) => count_or(ParameterKind::Size),
            (Token::Polymorph, _) => ParameterKind::PolymorphTable,
            (Token::QuatPyr | Token::MatPyr | Token::MultiValue, 0) => count_or(ParameterKind::None),
            (Token::QuatPyr | Token::MatPyr | Token::MultiValue, _) => ParameterKind::None,
            (_, 0) => count_or(ParameterKind::DefaultValue),
            (_, _) => ParameterKind::StaticDefineList,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
