//! Persisted schema format
//!
//! Exporters write a [`SchemaFile`] and converters read it back. Tables are
//! listed by name; a column's subtable is either an inline table definition
//! owned by that column or an `external` reference to a named table.

use crate::flags::{ColumnFlags, StorageMode};
use crate::format::Format;
use crate::format_string::FormatStrings;
use crate::schema::{resolve_aliases, Column, Enumeration, Parameter, Schema, Table, TableId};
use crate::token::Token;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

fn is_zero(value: &u8) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub enums: Vec<Enumeration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubtableDef {
    External { external: String },
    Inline(Box<TableDef>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Canonical token + storage name, e.g. `INT_EARRAY`
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bit_width: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sub_id: u8,
    #[serde(default, skip_serializing_if = "Parameter::is_none")]
    pub parameter0: Parameter,
    #[serde(default, skip_serializing_if = "Parameter::is_none")]
    pub parameter1: Parameter,
    #[serde(default, skip_serializing_if = "Format::is_none")]
    pub format: Format,
    #[serde(default, skip_serializing_if = "FormatStrings::is_empty")]
    pub format_strings: FormatStrings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtable: Option<SubtableDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_define_list: Option<String>,
}

impl ColumnDef {
    fn from_column(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            type_name: column.canonical_type().to_string(),
            flags: column
                .flags()
                .capability_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            offset: column.offset,
            bit_width: column.flags().bit_width(),
            sub_id: column.flags().sub_id(),
            parameter0: column.parameters[0].clone(),
            parameter1: column.parameters[1].clone(),
            format: column.format,
            format_strings: column.format_strings.clone(),
            format_string_error: column.format_string_error.clone(),
            subtable: None,
            static_define_list: column.static_define_list.clone(),
        }
    }

    fn column_flags(&self, mode: StorageMode) -> Result<ColumnFlags> {
        let mut flags = mode.flags();
        for name in &self.flags {
            let flag = ColumnFlags::from_flag_name(name).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "column '{}' has unknown flag '{}'",
                    self.name.as_deref().unwrap_or(""),
                    name
                ))
            })?;
            flags |= flag;
        }

        if StorageMode::from_flags(flags)? != mode {
            return Err(Error::InvalidSchema(format!(
                "column '{}': flags contradict type {}",
                self.name.as_deref().unwrap_or(""),
                self.type_name
            )));
        }
        Ok(flags.with_bit_width(self.bit_width).with_sub_id(self.sub_id))
    }
}

struct Loader<'f> {
    schema: Schema,
    top_level: HashMap<&'f str, TableId>,
}

impl<'f> Loader<'f> {
    fn build_table(&mut self, id: TableId, def: &'f TableDef) -> Result<()> {
        let mut columns = Vec::with_capacity(def.columns.len());
        for column_def in &def.columns {
            columns.push(self.build_column(column_def)?);
        }

        let table = self.schema.table_mut(id)?;
        table.columns = columns;
        for warning in resolve_aliases(table) {
            tracing::warn!(
                table = %warning.table,
                column = %warning.column,
                chosen = ?warning.chosen,
                candidates = warning.candidates,
                "ambiguous alias target"
            );
        }
        Ok(())
    }

    fn build_column(&mut self, def: &'f ColumnDef) -> Result<Column> {
        let (token, mode) = Token::from_canonical_name(&def.type_name)?;
        let mut column = Column::new(def.name.clone(), token, def.column_flags(mode)?)?
            .with_offset(def.offset)
            .with_parameter(0, def.parameter0.clone())
            .with_parameter(1, def.parameter1.clone());
        column.format = def.format;
        column.format_strings = def.format_strings.clone();
        column.format_string_error = def.format_string_error.clone();
        column.static_define_list = def.static_define_list.clone();

        match &def.subtable {
            None => {}
            Some(SubtableDef::External { external }) => {
                let id = self
                    .top_level
                    .get(external.as_str())
                    .copied()
                    .ok_or_else(|| Error::UnknownTable(external.clone()))?;
                column = column.with_subtable(id, true);
            }
            Some(SubtableDef::Inline(inline)) => {
                let id = self.schema.reserve_table(inline.name.clone());
                self.build_table(id, inline)?;
                column = column.with_subtable(id, false);
            }
        }

        Ok(column)
    }
}

impl Schema {
    /// Build and validate a schema from its persisted form
    pub fn from_file(file: &SchemaFile) -> Result<Schema> {
        let mut loader = Loader {
            schema: Schema::new(),
            top_level: HashMap::new(),
        };

        // Register every top-level name first so references may point forward
        let mut ids = Vec::with_capacity(file.tables.len());
        for def in &file.tables {
            let id = loader.schema.reserve_table(def.name.clone());
            if loader.top_level.insert(def.name.as_str(), id).is_some() {
                return Err(Error::InvalidSchema(format!("duplicate table '{}'", def.name)));
            }
            ids.push(id);
        }

        for (id, def) in ids.into_iter().zip(&file.tables) {
            loader.build_table(id, def)?;
        }

        let mut schema = loader.schema;
        schema.enums = file.enums.clone();
        schema.validate()?;
        Ok(schema)
    }

    /// Convert to the persisted form.
    ///
    /// Tables owned inline by a column are nested under it; every other
    /// table is written at the top level.
    pub fn to_file(&self) -> Result<SchemaFile> {
        let mut owned = HashSet::new();
        for (_, table) in self.tables() {
            for column in &table.columns {
                if let Some(sub) = column.subtable.filter(|s| !s.external) {
                    if !owned.insert(sub.table) {
                        return Err(Error::InvalidSchema(format!(
                            "table '{}' is owned inline more than once",
                            self.table(sub.table)?.name
                        )));
                    }
                }
            }
        }

        let mut tables = Vec::new();
        let mut visiting = HashSet::new();
        for (id, _) in self.tables() {
            if !owned.contains(&id) {
                tables.push(self.table_def(id, &mut visiting)?);
            }
        }

        Ok(SchemaFile {
            tables,
            enums: self.enums.clone(),
        })
    }

    fn table_def(&self, id: TableId, visiting: &mut HashSet<TableId>) -> Result<TableDef> {
        let table: &Table = self.table(id)?;
        if !visiting.insert(id) {
            return Err(Error::InvalidSchema(format!(
                "table '{}' contains itself inline",
                table.name
            )));
        }

        let mut columns = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let mut def = ColumnDef::from_column(column);
            def.subtable = match column.subtable {
                None => None,
                Some(sub) if sub.external => Some(SubtableDef::External {
                    external: self.table(sub.table)?.name.clone(),
                }),
                Some(sub) => Some(SubtableDef::Inline(Box::new(
                    self.table_def(sub.table, visiting)?,
                ))),
            };
            columns.push(def);
        }

        visiting.remove(&id);
        Ok(TableDef {
            name: table.name.clone(),
            columns,
        })
    }
}
