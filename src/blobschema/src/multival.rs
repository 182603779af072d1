//! Multi-value expression opcodes
//!
//! Each multi-value element begins with a four-character mnemonic that
//! selects an operand width of 0, 4 or 8 bytes.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Operand carried after an opcode mnemonic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Int32,
    UInt32,
    Float32,
    Int64,
    UInt64,
    Float64,
}

impl Operand {
    /// Encoded size in bytes
    pub fn size(self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Int32 | Operand::UInt32 | Operand::Float32 => 4,
            Operand::Int64 | Operand::UInt64 | Operand::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub mnemonic: &'static str,
    pub name: &'static str,
    pub operand: Operand,
}

const fn op(mnemonic: &'static str, name: &'static str, operand: Operand) -> Opcode {
    Opcode {
        mnemonic,
        name,
        operand,
    }
}

static OPCODES: phf::Map<&'static str, Opcode> = phf::phf_map! {
    "NOP_" => op("NOP_", "Nop", Operand::None),
    "S032" => op("S032", "Int", Operand::Int32),
    "U032" => op("U032", "UInt", Operand::UInt32),
    "S064" => op("S064", "Int64", Operand::Int64),
    "U064" => op("U064", "UInt64", Operand::UInt64),
    "F032" => op("F032", "Float", Operand::Float32),
    "F064" => op("F064", "Double", Operand::Float64),
    "STR_" => op("STR_", "StringRef", Operand::UInt32),
    "VAR_" => op("VAR_", "Variable", Operand::UInt32),
    "SVAR" => op("SVAR", "StoreVariable", Operand::UInt32),
    "FUNC" => op("FUNC", "Call", Operand::UInt32),
    "JMP_" => op("JMP_", "Jump", Operand::Int32),
    "JZ__" => op("JZ__", "JumpIfZero", Operand::Int32),
    "RET_" => op("RET_", "Return", Operand::None),
    "ADD_" => op("ADD_", "Add", Operand::None),
    "SUB_" => op("SUB_", "Subtract", Operand::None),
    "MUL_" => op("MUL_", "Multiply", Operand::None),
    "DIV_" => op("DIV_", "Divide", Operand::None),
    "MOD_" => op("MOD_", "Modulo", Operand::None),
    "NEG_" => op("NEG_", "Negate", Operand::None),
    "AND_" => op("AND_", "And", Operand::None),
    "OR__" => op("OR__", "Or", Operand::None),
    "NOT_" => op("NOT_", "Not", Operand::None),
    "EQ__" => op("EQ__", "Equal", Operand::None),
    "NE__" => op("NE__", "NotEqual", Operand::None),
    "LT__" => op("LT__", "Less", Operand::None),
    "LE__" => op("LE__", "LessEqual", Operand::None),
    "GT__" => op("GT__", "Greater", Operand::None),
    "GE__" => op("GE__", "GreaterEqual", Operand::None),
    "BAND" => op("BAND", "BitAnd", Operand::None),
    "BOR_" => op("BOR_", "BitOr", Operand::None),
    "BXOR" => op("BXOR", "BitXor", Operand::None),
    "BNOT" => op("BNOT", "BitNot", Operand::None),
    "STMT" => op("STMT", "Statement", Operand::Int32),
    "LINE" => op("LINE", "LineNumber", Operand::UInt32),
    "END_" => op("END_", "End", Operand::None),
};

/// Display name -> opcode
static BY_NAME: Lazy<HashMap<&'static str, &'static Opcode>> =
    Lazy::new(|| OPCODES.values().map(|op| (op.name, op)).collect());

/// Look up an opcode by its four-character mnemonic
pub fn opcode_by_mnemonic(mnemonic: &str) -> Option<&'static Opcode> {
    OPCODES.get(mnemonic)
}

/// Look up an opcode by its display name
pub fn opcode_by_name(name: &str) -> Option<&'static Opcode> {
    BY_NAME.get(name).copied()
}
