//! Binary record codec
//!
//! Walks a table's columns in declared order, reading or writing one field
//! occurrence per column according to its token and storage mode. Decoding
//! produces a [`Node`] tree; encoding consumes the same shape.

use crate::bits::{field_max, BitRunReader, BitRunWriter};
use crate::cursor::{ByteReader, ByteWriter};
use crate::flags::StorageMode;
use crate::multival::{opcode_by_mnemonic, opcode_by_name, Operand};
use crate::node::Node;
use crate::schema::{Column, Schema, Table, TableId};
use crate::token::Token;
use crate::{Error, Result};

/// Largest element count accepted for a counted array
pub const MAX_ARRAY_ELEMENTS: u32 = 1 << 24;

/// Deepest structure/polymorph/call nesting accepted
pub const MAX_DEPTH: usize = 128;

const ITEM: &str = "item";
const POLYMORPH: &str = "polymorph";
const OPCODE: &str = "opcode";
const CALL: &str = "call";
const ENTRY: &str = "entry";

/// Elements always emitted as a named child of their column node
fn is_wrapped(token: Token) -> bool {
    matches!(token, Token::Polymorph | Token::MultiValue | Token::FunctionCall)
}

fn invalid(column: &Column, value: &str) -> Error {
    Error::InvalidValue {
        column: column.display_name().to_string(),
        value: value.to_string(),
    }
}

fn missing(column: &Column) -> Error {
    Error::MissingField(column.display_name().to_string())
}

fn format_f32(value: f32) -> String {
    if value.is_nan() {
        format!("nan:0x{:08x}", value.to_bits())
    } else {
        value.to_string()
    }
}

fn format_f64(value: f64) -> String {
    if value.is_nan() {
        format!("nan:0x{:016x}", value.to_bits())
    } else {
        value.to_string()
    }
}

fn parse_f32(column: &Column, text: &str) -> Result<f32> {
    if let Some(hex) = text.trim().strip_prefix("nan:0x") {
        return u32::from_str_radix(hex, 16)
            .map(f32::from_bits)
            .map_err(|_| invalid(column, text));
    }
    text.trim().parse().map_err(|_| invalid(column, text))
}

fn parse_f64(column: &Column, text: &str) -> Result<f64> {
    if let Some(hex) = text.trim().strip_prefix("nan:0x") {
        return u64::from_str_radix(hex, 16)
            .map(f64::from_bits)
            .map_err(|_| invalid(column, text));
    }
    text.trim().parse().map_err(|_| invalid(column, text))
}

/// Decimal or `0x` hex, optionally negative
fn parse_int_literal(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn format_bool(value: u8) -> String {
    match value {
        0 => "false".to_string(),
        1 => "true".to_string(),
        other => other.to_string(),
    }
}

fn read_count(column: &Column, reader: &mut ByteReader) -> Result<usize> {
    let count = reader.read_u32()?;
    if count > MAX_ARRAY_ELEMENTS {
        return Err(Error::ArrayTooLarge {
            column: column.display_name().to_string(),
            count,
        });
    }
    Ok(count as usize)
}

fn write_count(column: &Column, writer: &mut ByteWriter, count: usize) -> Result<()> {
    if count > MAX_ARRAY_ELEMENTS as usize {
        return Err(Error::ArrayTooLarge {
            column: column.display_name().to_string(),
            count: u32::try_from(count).unwrap_or(u32::MAX),
        });
    }
    writer.write_u32(count as u32)
}

fn text<'n>(column: &Column, node: &'n Node) -> Result<&'n str> {
    node.value().ok_or_else(|| missing(column))
}

/// First child not yet consumed whose name matches
fn take_child<'n>(node: &'n Node, used: &mut [bool], name: &str) -> Option<&'n Node> {
    let index = node
        .children
        .iter()
        .enumerate()
        .position(|(i, child)| !used[i] && child.name == name)?;
    used[index] = true;
    Some(&node.children[index])
}

/// Decodes and encodes records against a schema
pub struct RecordCodec<'a> {
    schema: &'a Schema,
}

impl<'a> RecordCodec<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Decode one record of `table` starting at the reader's position
    pub fn decode_record(&self, table: TableId, reader: &mut ByteReader) -> Result<Node> {
        let mut node = Node::new(self.schema.table(table)?.name.clone());
        self.decode_columns(table, reader, &mut node, 0)?;
        Ok(node)
    }

    /// Encode one record of `table` from its decoded tree
    pub fn encode_record(&self, table: TableId, node: &Node, writer: &mut ByteWriter) -> Result<()> {
        self.encode_columns(table, node, writer, 0)
    }

    fn subtable(&self, column: &Column) -> Result<&'a Table> {
        let sub = column.subtable.ok_or_else(|| {
            Error::InvalidSchema(format!("'{}' has no subtable", column.display_name()))
        })?;
        self.schema.table(sub.table)
    }

    fn int_text(&self, column: &Column, value: i64) -> String {
        column
            .static_define_list
            .as_deref()
            .and_then(|list| self.schema.define_name(list, value))
            .unwrap_or_else(|| value.to_string())
    }

    fn parse_int(&self, column: &Column, text: &str) -> Result<i64> {
        if let Some(value) = parse_int_literal(text) {
            return Ok(value);
        }
        column
            .static_define_list
            .as_deref()
            .and_then(|list| self.schema.define_value(list, text.trim()))
            .ok_or_else(|| invalid(column, text))
    }

    fn bits_text(&self, column: &Column, value: u64) -> String {
        match column.static_define_list.as_deref() {
            Some(list) => self
                .schema
                .define_name(list, value as i64)
                .unwrap_or_else(|| value.to_string()),
            None => value.to_string(),
        }
    }

    fn parse_bits(&self, column: &Column, text: &str) -> Result<u64> {
        let value = match text.trim().parse::<u64>() {
            Ok(value) => value,
            Err(_) => self.parse_int(column, text)? as u64,
        };
        if value > field_max(column.bit_width()) {
            return Err(invalid(column, text));
        }
        Ok(value)
    }

    fn check_depth(depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::NestingTooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------

    fn decode_columns(
        &self,
        table: TableId,
        reader: &mut ByteReader,
        out: &mut Node,
        depth: usize,
    ) -> Result<()> {
        Self::check_depth(depth)?;
        let table = self.schema.table(table)?;
        let mut run: Option<BitRunReader> = None;

        for column in &table.columns {
            if !column.occupies_stream() {
                continue;
            }

            if column.token() == Token::Bit {
                let value = run
                    .get_or_insert_with(BitRunReader::new)
                    .read(reader, column.offset, column.bit_width())?;
                out.push(Node::text(column.display_name(), self.bits_text(column, value)));
                continue;
            }
            run = None;

            if let Some(node) = self.decode_column(column, reader, depth)? {
                out.push(node);
            }
        }

        Ok(())
    }

    /// Decode one column occurrence; `None` when an optional value is absent
    fn decode_column(
        &self,
        column: &Column,
        reader: &mut ByteReader,
        depth: usize,
    ) -> Result<Option<Node>> {
        let name = column.display_name();

        let count = match column.storage() {
            StorageMode::DirectValue => return self.decode_single(column, reader, depth).map(Some),
            StorageMode::IndirectValue => {
                if reader.read_u32()? == 0 {
                    return Ok(None);
                }
                return self.decode_single(column, reader, depth).map(Some);
            }
            StorageMode::DirectFixedArray | StorageMode::IndirectFixedArray => column.fixed_count()?,
            StorageMode::DirectArray | StorageMode::IndirectArray => read_count(column, reader)?,
        };

        let mut node = Node::new(name);
        for _ in 0..count {
            node.push(self.decode_element(column, reader, ITEM, depth)?);
        }
        Ok(Some(node))
    }

    fn decode_single(&self, column: &Column, reader: &mut ByteReader, depth: usize) -> Result<Node> {
        let name = column.display_name();
        let element = self.decode_element(column, reader, name, depth)?;
        if is_wrapped(column.token()) {
            Ok(Node::new(name).with_child(element))
        } else {
            Ok(element)
        }
    }

    fn decode_element(
        &self,
        column: &Column,
        reader: &mut ByteReader,
        name: &str,
        depth: usize,
    ) -> Result<Node> {
        let node = match column.token() {
            Token::Byte => Node::text(name, self.int_text(column, reader.read_u8()? as i64)),
            Token::Int16 => Node::text(name, self.int_text(column, reader.read_i16()? as i64)),
            Token::Int32 => Node::text(name, self.int_text(column, reader.read_i32()? as i64)),
            Token::Int64 => Node::text(name, self.int_text(column, reader.read_i64()?)),
            Token::Float => Node::text(name, format_f32(reader.read_f32()?)),
            Token::Boolean | Token::BooleanFlag => Node::text(name, format_bool(reader.read_u8()?)),
            Token::Timestamp | Token::LineNumber => Node::text(name, reader.read_u32()?.to_string()),
            Token::String | Token::CurrentFile | Token::Filename | Token::Reference => {
                Node::text(name, reader.read_string()?)
            }
            Token::QuatPyr | Token::MatPyr => {
                let values = [reader.read_f32()?, reader.read_f32()?, reader.read_f32()?];
                let parts: Vec<String> = values.iter().map(|v| format_f32(*v)).collect();
                Node::text(name, parts.join(" "))
            }
            Token::Structure => {
                let sub = column.subtable.ok_or_else(|| {
                    Error::InvalidSchema(format!("'{}' has no subtable", column.display_name()))
                })?;
                let mut node = Node::new(name);
                self.decode_columns(sub.table, reader, &mut node, depth + 1)?;
                node
            }
            Token::StashTable => {
                let count = read_count(column, reader)?;
                let mut node = Node::new(name);
                for _ in 0..count {
                    let key = reader.read_string()?;
                    let value = reader.read_string()?;
                    node.push(Node::text(ENTRY, value).with_attr("key", key));
                }
                node
            }
            Token::Polymorph => self.decode_polymorph(column, reader, depth)?,
            Token::MultiValue => self.decode_multival(reader)?,
            Token::FunctionCall => self.decode_call(column, reader, depth)?,
            Token::Bit | Token::Ignore | Token::Start | Token::End | Token::Command => {
                return Err(Error::InvalidSchema(format!(
                    "'{}': {} has no element encoding",
                    column.display_name(),
                    column.token()
                )))
            }
        };
        Ok(node)
    }

    fn decode_polymorph(&self, column: &Column, reader: &mut ByteReader, depth: usize) -> Result<Node> {
        let table = self.subtable(column)?;
        let index = reader.read_i32()?;
        let target = usize::try_from(index)
            .ok()
            .and_then(|i| table.columns.get(i))
            .ok_or_else(|| Error::PolymorphIndex {
                column: column.display_name().to_string(),
                index,
                count: table.columns.len(),
            })?;

        let mut node = Node::new(POLYMORPH).with_attr("name", target.display_name());
        match self.decode_column(target, reader, depth + 1)? {
            Some(inner) => {
                node.value = inner.value;
                node.children = inner.children;
            }
            None => node.attributes.push(("absent".to_string(), "true".to_string())),
        }
        Ok(node)
    }

    fn decode_multival(&self, reader: &mut ByteReader) -> Result<Node> {
        let raw = reader.read_bytes(4)?;
        let opcode = std::str::from_utf8(raw)
            .ok()
            .and_then(opcode_by_mnemonic)
            .ok_or_else(|| match std::str::from_utf8(raw) {
                Ok(s) => Error::UnknownOpcode(s.to_string()),
                Err(_) => Error::UnknownOpcode(format!("{:02x?}", raw)),
            })?;

        let value = match opcode.operand {
            Operand::None => None,
            Operand::Int32 => Some(reader.read_i32()?.to_string()),
            Operand::UInt32 => Some(reader.read_u32()?.to_string()),
            Operand::Float32 => Some(format_f32(reader.read_f32()?)),
            Operand::Int64 => Some(reader.read_i64()?.to_string()),
            Operand::UInt64 => Some(reader.read_u64()?.to_string()),
            Operand::Float64 => Some(format_f64(reader.read_f64()?)),
        };

        let mut node = Node::new(OPCODE).with_attr("type", opcode.name);
        node.value = value;
        Ok(node)
    }

    fn decode_call(&self, column: &Column, reader: &mut ByteReader, depth: usize) -> Result<Node> {
        Self::check_depth(depth)?;
        let name = reader.read_string()?;
        let argc = read_count(column, reader)?;
        let mut node = Node::new(CALL).with_attr("name", name);
        for _ in 0..argc {
            node.push(self.decode_call(column, reader, depth + 1)?);
        }
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    fn encode_columns(
        &self,
        table: TableId,
        node: &Node,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        Self::check_depth(depth)?;
        let table = self.schema.table(table)?;
        let mut used = vec![false; node.children.len()];
        let mut run = BitRunWriter::new();

        for column in &table.columns {
            if !column.occupies_stream() {
                continue;
            }
            let child = take_child(node, &mut used, column.display_name());

            if column.token() == Token::Bit {
                let child = child.ok_or_else(|| missing(column))?;
                let value = self.parse_bits(column, text(column, child)?)?;
                run.write(column.offset, column.bit_width(), value)?;
                continue;
            }
            if !run.is_empty() {
                run.flush(writer)?;
            }

            self.encode_column(column, child, writer, depth)?;
        }

        if !run.is_empty() {
            run.flush(writer)?;
        }
        Ok(())
    }

    fn encode_column(
        &self,
        column: &Column,
        node: Option<&Node>,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        match column.storage() {
            StorageMode::DirectValue => {
                let node = node.ok_or_else(|| missing(column))?;
                self.encode_single(column, node, writer, depth)
            }
            StorageMode::IndirectValue => match node {
                None => writer.write_u32(0),
                Some(node) => {
                    writer.write_u32(1)?;
                    self.encode_single(column, node, writer, depth)
                }
            },
            StorageMode::DirectFixedArray | StorageMode::IndirectFixedArray => {
                let node = node.ok_or_else(|| missing(column))?;
                let expected = column.fixed_count()?;
                if node.children.len() != expected {
                    return Err(Error::ArrayLength {
                        column: column.display_name().to_string(),
                        expected,
                        actual: node.children.len(),
                    });
                }
                for item in &node.children {
                    self.encode_element(column, item, writer, depth)?;
                }
                Ok(())
            }
            StorageMode::DirectArray | StorageMode::IndirectArray => {
                let items = node.map(|n| n.children.as_slice()).unwrap_or(&[]);
                write_count(column, writer, items.len())?;
                for item in items {
                    self.encode_element(column, item, writer, depth)?;
                }
                Ok(())
            }
        }
    }

    fn encode_single(
        &self,
        column: &Column,
        node: &Node,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        if is_wrapped(column.token()) {
            let element = node.children.first().ok_or_else(|| missing(column))?;
            self.encode_element(column, element, writer, depth)
        } else {
            self.encode_element(column, node, writer, depth)
        }
    }

    fn encode_element(
        &self,
        column: &Column,
        node: &Node,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        match column.token() {
            Token::Byte => {
                let raw = text(column, node)?;
                let value = u8::try_from(self.parse_int(column, raw)?).map_err(|_| invalid(column, raw))?;
                writer.write_u8(value)
            }
            Token::Int16 => {
                let raw = text(column, node)?;
                let value = i16::try_from(self.parse_int(column, raw)?).map_err(|_| invalid(column, raw))?;
                writer.write_i16(value)
            }
            Token::Int32 => {
                let raw = text(column, node)?;
                let value = i32::try_from(self.parse_int(column, raw)?).map_err(|_| invalid(column, raw))?;
                writer.write_i32(value)
            }
            Token::Int64 => {
                let value = self.parse_int(column, text(column, node)?)?;
                writer.write_i64(value)
            }
            Token::Float => writer.write_f32(parse_f32(column, text(column, node)?)?),
            Token::Boolean | Token::BooleanFlag => {
                let raw = text(column, node)?;
                let value = match raw.trim() {
                    "false" => 0,
                    "true" => 1,
                    other => parse_int_literal(other)
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or_else(|| invalid(column, raw))?,
                };
                writer.write_u8(value)
            }
            Token::Timestamp | Token::LineNumber => {
                let raw = text(column, node)?;
                let value = raw.trim().parse::<u32>().map_err(|_| invalid(column, raw))?;
                writer.write_u32(value)
            }
            Token::String | Token::CurrentFile | Token::Filename | Token::Reference => {
                writer.write_string(text(column, node)?)
            }
            Token::QuatPyr | Token::MatPyr => {
                let raw = text(column, node)?;
                let parts: Vec<&str> = raw.split_whitespace().collect();
                if parts.len() != 3 {
                    return Err(invalid(column, raw));
                }
                for part in parts {
                    writer.write_f32(parse_f32(column, part)?)?;
                }
                Ok(())
            }
            Token::Structure => {
                let sub = column.subtable.ok_or_else(|| {
                    Error::InvalidSchema(format!("'{}' has no subtable", column.display_name()))
                })?;
                self.encode_columns(sub.table, node, writer, depth + 1)
            }
            Token::StashTable => {
                write_count(column, writer, node.children.len())?;
                for entry in &node.children {
                    let key = entry.attr("key").ok_or_else(|| missing(column))?;
                    writer.write_string(key)?;
                    writer.write_string(entry.value().unwrap_or(""))?;
                }
                Ok(())
            }
            Token::Polymorph => self.encode_polymorph(column, node, writer, depth),
            Token::MultiValue => self.encode_multival(column, node, writer),
            Token::FunctionCall => self.encode_call(column, node, writer, depth),
            Token::Bit | Token::Ignore | Token::Start | Token::End | Token::Command => {
                Err(Error::InvalidSchema(format!(
                    "'{}': {} has no element encoding",
                    column.display_name(),
                    column.token()
                )))
            }
        }
    }

    fn encode_polymorph(
        &self,
        column: &Column,
        node: &Node,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        let table = self.subtable(column)?;
        let target_name = node.attr("name").ok_or_else(|| missing(column))?;
        let index = table
            .columns
            .iter()
            .position(|c| c.display_name() == target_name)
            .ok_or_else(|| invalid(column, target_name))?;
        writer.write_i32(index as i32)?;

        let target = &table.columns[index];
        if node.attr("absent") == Some("true") {
            self.encode_column(target, None, writer, depth + 1)
        } else {
            self.encode_column(target, Some(node), writer, depth + 1)
        }
    }

    fn encode_multival(&self, column: &Column, node: &Node, writer: &mut ByteWriter) -> Result<()> {
        let type_name = node.attr("type").ok_or_else(|| missing(column))?;
        let opcode =
            opcode_by_name(type_name).ok_or_else(|| Error::UnknownOpcode(type_name.to_string()))?;
        writer.write_bytes(opcode.mnemonic.as_bytes())?;

        let operand = || node.value().map(str::trim).ok_or_else(|| missing(column));
        match opcode.operand {
            Operand::None => Ok(()),
            Operand::Int32 => {
                let raw = operand()?;
                writer.write_i32(raw.parse().map_err(|_| invalid(column, raw))?)
            }
            Operand::UInt32 => {
                let raw = operand()?;
                writer.write_u32(raw.parse().map_err(|_| invalid(column, raw))?)
            }
            Operand::Float32 => writer.write_f32(parse_f32(column, operand()?)?),
            Operand::Int64 => {
                let raw = operand()?;
                writer.write_i64(raw.parse().map_err(|_| invalid(column, raw))?)
            }
            Operand::UInt64 => {
                let raw = operand()?;
                writer.write_u64(raw.parse().map_err(|_| invalid(column, raw))?)
            }
            Operand::Float64 => writer.write_f64(parse_f64(column, operand()?)?),
        }
    }

    fn encode_call(
        &self,
        column: &Column,
        node: &Node,
        writer: &mut ByteWriter,
        depth: usize,
    ) -> Result<()> {
        Self::check_depth(depth)?;
        let name = node.attr("name").ok_or_else(|| missing(column))?;
        writer.write_string(name)?;
        write_count(column, writer, node.children.len())?;
        for arg in &node.children {
            self.encode_call(column, arg, writer, depth + 1)?;
        }
        Ok(())
    }
}
