//! Parse table export
//!
//! Walks each named parse table's column array up to the sentinel column
//! (token 0 with an empty name) and rebuilds it as a [`Schema`]. Subtables
//! whose address belongs to a named table become external references;
//! anything else is exported inline under a `Parent.Column` name. An
//! inline table reached a second time is promoted to a top-level table and
//! referenced by name from then on.

use super::ExportError;
use crate::memory::layout::{native_size, read_native, ParseColumn32, ParseColumn64};
use crate::memory::source::MemorySource;
use crate::memory::stash::read_stash_pointers;
use blobschema::format_string;
use blobschema::{
    resolve_aliases, Column, ColumnFlags, Format, Parameter, ParameterKind, Schema, TableId,
    Token,
};
use std::collections::{HashMap, HashSet};

/// Upper bound on columns in one table
const MAX_COLUMNS: usize = 4096;

struct InlineTable {
    id: TableId,
    /// Column that owns the table; `None` once promoted
    owner: Option<(TableId, usize)>,
}

struct Exporter<'a> {
    source: &'a dyn MemorySource,
    enum_names: &'a HashMap<usize, String>,
    schema: Schema,
    named: HashMap<usize, TableId>,
    inline: HashMap<usize, InlineTable>,
    used_names: HashSet<String>,
}

impl<'a> Exporter<'a> {
    fn unique_name(&mut self, base: String) -> String {
        let mut name = base.clone();
        let mut n = 2;
        while self.used_names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.used_names.insert(name.clone());
        name
    }

    fn export_table(&mut self, id: TableId, address: usize) -> Result<(), ExportError> {
        let stride = native_size::<ParseColumn32>(self.source.pointer_width());
        let table_name = self.schema.table(id)?.name.clone();

        for index in 0..MAX_COLUMNS {
            let raw = read_native::<ParseColumn32>(self.source, address + index * stride)?;
            let (token_id, flags) = ColumnFlags::from_type_word(raw.type_word);
            let name = self.source.read_string_ptr(raw.name as usize)?;

            if token_id == 0 && name.as_deref().unwrap_or("").is_empty() {
                let table = self.schema.table_mut(id)?;
                for warning in resolve_aliases(table) {
                    tracing::warn!(
                        table = %warning.table,
                        column = %warning.column,
                        chosen = ?warning.chosen,
                        candidates = warning.candidates,
                        "ambiguous alias target"
                    );
                }
                tracing::debug!(table = %table_name, columns = index, "exported table");
                return Ok(());
            }

            let token = Token::from_id(token_id)?;
            let column = self.build_column(&table_name, name, token, flags, &raw)?;
            let column_index = self.schema.table(id)?.columns.len();
            self.schema.table_mut(id)?.columns.push(column);

            let table_param = [raw.param0, raw.param1]
                .into_iter()
                .enumerate()
                .find(|(slot, _)| token.parameter_kind(flags, *slot).is_table())
                .map(|(_, value)| value as usize);

            match table_param {
                Some(0) => {
                    if matches!(token, Token::Structure | Token::Polymorph) {
                        tracing::warn!(
                            table = %table_name,
                            column = index,
                            "structure column without a subtable"
                        );
                    }
                }
                Some(sub) => self.link_subtable(id, column_index, sub)?,
                None => {}
            }
        }

        Err(ExportError::Consistency(format!(
            "parse table '{}' has no sentinel within {} columns",
            table_name, MAX_COLUMNS
        )))
    }

    fn build_column(
        &self,
        table_name: &str,
        name: Option<String>,
        token: Token,
        flags: ColumnFlags,
        raw: &ParseColumn64,
    ) -> Result<Column, ExportError> {
        let mut column = Column::new(name.filter(|n| !n.is_empty()), token, flags)?
            .with_offset(raw.offset);

        for (slot, value) in [raw.param0, raw.param1].into_iter().enumerate() {
            let kind = column.parameter_kind(slot);
            let parameter = if kind.is_integer() {
                Parameter::Int(value as u32 as i32)
            } else if kind.is_string() {
                self.source
                    .read_string_ptr(value as usize)?
                    .map(Parameter::Text)
                    .unwrap_or_default()
            } else if kind == ParameterKind::StaticDefineList && value != 0 {
                match self.enum_names.get(&(value as usize)) {
                    Some(list) => {
                        column.static_define_list = Some(list.clone());
                        Parameter::None
                    }
                    None => {
                        tracing::debug!(
                            table = %table_name,
                            column = %column.display_name(),
                            "static define list {:#x} is not a named enum",
                            value
                        );
                        Parameter::Pointer(value)
                    }
                }
            } else {
                Parameter::None
            };
            column = column.with_parameter(slot, parameter);
        }

        column.format = Format::from_id((raw.format & 0xFF) as u8);
        if let Some(text) = self.source.read_string_ptr(raw.format_string as usize)? {
            match format_string::parse(&text) {
                Ok(strings) => column.format_strings = strings,
                Err(e) => {
                    tracing::warn!(
                        table = %table_name,
                        column = %column.display_name(),
                        "unparseable format string: {e}"
                    );
                    column.format_string_error = Some(format!("{}: {}", e, text));
                }
            }
        }

        Ok(column)
    }

    /// Point column `column_index` of `owner` at the table at `address`
    fn link_subtable(
        &mut self,
        owner: TableId,
        column_index: usize,
        address: usize,
    ) -> Result<(), ExportError> {
        if let Some(&id) = self.named.get(&address) {
            self.set_subtable(owner, column_index, id, true)?;
            return Ok(());
        }

        if let Some(inline) = self.inline.get_mut(&address) {
            let id = inline.id;
            let first = inline.owner.take();
            if let Some((first_owner, first_column)) = first {
                tracing::debug!(
                    table = %self.schema.table(id)?.name,
                    "promoting shared inline table"
                );
                self.set_subtable(first_owner, first_column, id, true)?;
            }
            self.set_subtable(owner, column_index, id, true)?;
            return Ok(());
        }

        let owner_table = self.schema.table(owner)?;
        let base = format!(
            "{}.{}",
            owner_table.name,
            owner_table.columns[column_index].display_name()
        );
        let name = self.unique_name(base);
        let id = self.schema.reserve_table(name);
        self.inline.insert(
            address,
            InlineTable {
                id,
                owner: Some((owner, column_index)),
            },
        );
        self.set_subtable(owner, column_index, id, false)?;
        self.export_table(id, address)
    }

    fn set_subtable(
        &mut self,
        owner: TableId,
        column_index: usize,
        table: TableId,
        external: bool,
    ) -> Result<(), ExportError> {
        let table_ref = self.schema.table_mut(owner)?;
        if let Some(column) = table_ref.columns.get_mut(column_index) {
            column.subtable = Some(blobschema::SubtableRef { table, external });
        }
        Ok(())
    }
}

/// Export every parse table named in the root stash table.
///
/// `enum_names` maps static define list addresses to exported enum names.
pub fn export_parse_tables(
    source: &dyn MemorySource,
    root: usize,
    enum_names: &HashMap<usize, String>,
) -> Result<Schema, ExportError> {
    let mut stash = read_stash_pointers(source, root)?;
    stash.sort_by(|a, b| a.name.cmp(&b.name));
    stash.dedup_by(|a, b| a.name == b.name && a.value == b.value);

    let mut exporter = Exporter {
        source,
        enum_names,
        schema: Schema::new(),
        named: HashMap::new(),
        inline: HashMap::new(),
        used_names: HashSet::new(),
    };

    let mut roots = Vec::with_capacity(stash.len());
    for entry in &stash {
        if !exporter.used_names.insert(entry.name.clone()) {
            return Err(ExportError::Consistency(format!(
                "parse table '{}' is registered twice at different addresses",
                entry.name
            )));
        }
        let id = exporter.schema.reserve_table(entry.name.clone());
        exporter.named.entry(entry.value).or_insert(id);
        roots.push((id, entry.value));
    }

    for (id, address) in roots {
        if address == 0 {
            tracing::warn!(table = %exporter.schema.table(id)?.name, "null parse table");
            continue;
        }
        exporter.export_table(id, address)?;
    }

    let mut schema = exporter.schema;
    schema.validate()?;
    tracing::info!(count = schema.table_count(), "exported parse tables");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::testing::Image;
    use crate::memory::source::PointerWidth;
    use blobschema::{StorageMode, SubtableDef};

    struct Col {
        name: Option<&'static str>,
        token: Token,
        flags: ColumnFlags,
        offset: u32,
        params: [u64; 2],
        format_string: Option<&'static str>,
    }

    fn col(name: &'static str, token: Token, flags: ColumnFlags) -> Col {
        Col {
            name: Some(name),
            token,
            flags,
            offset: 0,
            params: [0, 0],
            format_string: None,
        }
    }

    fn table(image: &Image, columns: &[Col]) -> usize {
        let mut wide: Vec<ParseColumn64> = columns
            .iter()
            .map(|c| ParseColumn64 {
                name: c.name.map(|n| image.string(n) as u64).unwrap_or(0),
                type_word: u64::from(c.token.id()) | c.flags.bits(),
                offset: c.offset,
                param0: c.params[0],
                param1: c.params[1],
                format: 0,
                format_string: c.format_string.map(|f| image.string(f) as u64).unwrap_or(0),
            })
            .collect();
        wide.push(ParseColumn64 {
            name: 0,
            type_word: 0,
            offset: 0,
            param0: 0,
            param1: 0,
            format: 0,
            format_string: 0,
        });
        image.structs::<ParseColumn32>(&wide, |w| ParseColumn32 {
            name: w.name as u32,
            type_word: w.type_word,
            offset: w.offset,
            param0: w.param0 as u32,
            param1: w.param1 as u32,
            format: w.format,
            format_string: w.format_string as u32,
        })
    }

    /// Table storage is reserved before columns are known, so self
    /// references can be written after the fact
    fn patch_param1(image: &Image, table_at: usize, column: usize, value: usize) {
        let (stride, at) = if image.is_narrow() { (40, 24) } else { (56, 32) };
        let address = table_at + column * stride + at;
        image.source.put_pointer(address, value);
    }

    #[test]
    fn test_scalar_columns_both_widths() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let image = Image::new(width);
            let mut count = col("Count", Token::Int32, ColumnFlags::empty());
            count.offset = 8;
            count.params = [0xFFFF_FFFF, 0];
            let mut values = col("Values", Token::Float, ColumnFlags::FIXED_ARRAY);
            values.offset = 12;
            values.params = [3, 0];
            let mut name = col("Name", Token::String, ColumnFlags::INDIRECT);
            name.params = [image.string("unnamed") as u64, 0];
            name.format_string = Some("MaxLength = 64, Hint = \"name\"");

            let power = table(&image, &[name, count, values]);
            let root = image.stash(&[("Power", power)]);

            let schema = export_parse_tables(&image.source, root, &HashMap::new()).unwrap();
            let id = schema.table_by_name("Power").unwrap();
            let parsed = schema.table(id).unwrap();
            assert_eq!(parsed.columns.len(), 3);

            let name = parsed.column("Name").unwrap();
            assert_eq!(name.storage(), StorageMode::IndirectValue);
            assert_eq!(name.parameters[0], Parameter::Text("unnamed".to_string()));
            assert_eq!(name.format_strings.get("MaxLength"), Some("64"));
            assert_eq!(name.format_strings.get("Hint"), Some("name"));

            let count = parsed.column("Count").unwrap();
            assert_eq!(count.offset, 8);
            assert_eq!(count.parameters[0], Parameter::Int(-1));

            let values = parsed.column("Values").unwrap();
            assert_eq!(values.fixed_count().unwrap(), 3);
        }
    }

    #[test]
    fn test_subtables_inline_and_external() {
        let image = Image::new(PointerWidth::Bits64);
        let cost = table(&image, &[col("Amount", Token::Float, ColumnFlags::empty())]);
        let effect = table(&image, &[col("Magnitude", Token::Float, ColumnFlags::empty())]);

        let mut cost_col = col("Cost", Token::Structure, ColumnFlags::empty());
        cost_col.params = [4, cost as u64];
        let mut effects = col("Effects", Token::Structure, ColumnFlags::INDIRECT | ColumnFlags::EARRAY);
        effects.params = [8, effect as u64];
        let power = table(&image, &[cost_col, effects]);
        let root = image.stash(&[("Power", power), ("Effect", effect)]);

        let schema = export_parse_tables(&image.source, root, &HashMap::new()).unwrap();
        let file = schema.to_file().unwrap();
        let names: Vec<&str> = file.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Effect", "Power"]);

        let power = &file.tables[1];
        match &power.columns[0].subtable {
            Some(SubtableDef::Inline(inline)) => {
                assert_eq!(inline.name, "Power.Cost");
                assert_eq!(inline.columns[0].name.as_deref(), Some("Amount"));
            }
            other => panic!("expected inline subtable, got {:?}", other),
        }
        assert_eq!(
            power.columns[1].subtable,
            Some(SubtableDef::External {
                external: "Effect".to_string()
            })
        );
    }

    #[test]
    fn test_self_reference_and_promotion() {
        let image = Image::new(PointerWidth::Bits64);
        let mut next = col("Next", Token::Structure, ColumnFlags::INDIRECT);
        next.params = [8, 0];
        let node = table(&image, &[col("Value", Token::Int32, ColumnFlags::empty()), next]);
        patch_param1(&image, node, 1, node);

        let mut head = col("Head", Token::Structure, ColumnFlags::INDIRECT);
        head.params = [8, node as u64];
        let mut tail = col("Tail", Token::Structure, ColumnFlags::INDIRECT);
        tail.params = [8, node as u64];
        let list = table(&image, &[head, tail]);
        let root = image.stash(&[("List", list)]);

        let schema = export_parse_tables(&image.source, root, &HashMap::new()).unwrap();
        let file = schema.to_file().unwrap();
        let names: Vec<&str> = file.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["List", "List.Head"]);

        let external = Some(SubtableDef::External {
            external: "List.Head".to_string(),
        });
        assert_eq!(file.tables[0].columns[0].subtable, external);
        assert_eq!(file.tables[0].columns[1].subtable, external);
        assert_eq!(file.tables[1].columns[1].subtable, external);

        // The persisted form loads back
        let reloaded = Schema::from_file(&file).unwrap();
        assert_eq!(reloaded.table_count(), 2);
    }

    #[test]
    fn test_static_define_list_and_bad_format_string() {
        let image = Image::new(PointerWidth::Bits64);
        let define_list = image.alloc(16);
        let mut kind = col("Kind", Token::Int32, ColumnFlags::empty());
        kind.params = [0, define_list as u64];
        kind.format_string = Some("Key = \"unterminated");
        let mut other = col("Other", Token::Int32, ColumnFlags::empty());
        other.params = [0, 0x1234];
        let power = table(&image, &[kind, other]);
        let root = image.stash(&[("Power", power)]);

        let enum_names = HashMap::from([(define_list, "PowerKind".to_string())]);
        let schema = export_parse_tables(&image.source, root, &enum_names).unwrap();
        let parsed = schema.table(schema.table_by_name("Power").unwrap()).unwrap();

        let kind = parsed.column("Kind").unwrap();
        assert_eq!(kind.static_define_list.as_deref(), Some("PowerKind"));
        assert!(kind.format_strings.is_empty());
        assert!(kind.format_string_error.is_some());

        let other = parsed.column("Other").unwrap();
        assert_eq!(other.static_define_list, None);
        assert_eq!(other.parameters[1], Parameter::Pointer(0x1234));
    }

    #[test]
    fn test_aliases_and_invalid_token() {
        let image = Image::new(PointerWidth::Bits64);
        let mut kind = col("Kind", Token::Int32, ColumnFlags::empty());
        kind.offset = 4;
        let mut old = col("OldKind", Token::Int32, ColumnFlags::REDUNDANTNAME);
        old.offset = 4;
        let power = table(&image, &[kind, old]);
        let root = image.stash(&[("Power", power)]);

        let schema = export_parse_tables(&image.source, root, &HashMap::new()).unwrap();
        let parsed = schema.table(schema.table_by_name("Power").unwrap()).unwrap();
        assert_eq!(parsed.column("OldKind").unwrap().alias_of, Some(0));

        let image = Image::new(PointerWidth::Bits64);
        let bad_table = table(&image, &[col("Bad", Token::Int32, ColumnFlags::empty())]);
        // Overwrite the type word with the unused token 13
        image.source.put_u64(bad_table + 8, 13);
        let root = image.stash(&[("Bad", bad_table)]);
        assert!(matches!(
            export_parse_tables(&image.source, root, &HashMap::new()),
            Err(ExportError::Schema(blobschema::Error::InvalidToken(13)))
        ));
    }
}
