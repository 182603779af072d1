//! Parse schema model
//!
//! A [`Schema`] is an arena of [`Table`]s addressed by [`TableId`], plus the
//! enumerations columns reference through their static define list. Tables
//! refer to each other by id so recursive record types need no ownership
//! cycles.

use crate::bits::{field_end, MAX_BIT_WIDTH, MAX_RUN_BITS};
use crate::flags::{ColumnFlags, StorageMode};
use crate::format::Format;
use crate::format_string::FormatStrings;
use crate::token::{ParameterKind, Token};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Handle of a table inside a [`Schema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub usize);

/// Link from a column to the table describing its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtableRef {
    pub table: TableId,
    /// Referenced by name rather than owned inline by the column
    pub external: bool,
}

/// Raw column parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    #[default]
    None,
    Int(i32),
    Pointer(u64),
    Text(String),
}

impl Parameter {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Parameter::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Parameter::None
    }
}

/// One field of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: Option<String>,
    token: Token,
    flags: ColumnFlags,
    storage: StorageMode,
    pub offset: u32,
    pub parameters: [Parameter; 2],
    pub format: Format,
    pub format_strings: FormatStrings,
    /// Set when the native format string could not be parsed
    pub format_string_error: Option<String>,
    pub subtable: Option<SubtableRef>,
    /// Name of the enumeration integer values are rendered with
    pub static_define_list: Option<String>,
    /// Index of the column a REDUNDANTNAME column aliases
    pub alias_of: Option<usize>,
    pub alias_ambiguous: bool,
}

impl Column {
    /// Create a column, rejecting storage modes the token does not support
    pub fn new(name: Option<String>, token: Token, flags: ColumnFlags) -> Result<Self> {
        let storage = StorageMode::from_flags(flags)?;
        if !token.supports(storage) {
            return Err(Error::UnsupportedStorage {
                column: name.clone().unwrap_or_default(),
                token: token.name(),
                storage,
            });
        }

        Ok(Self {
            name,
            token,
            flags,
            storage,
            offset: 0,
            parameters: [Parameter::None, Parameter::None],
            format: Format::None,
            format_strings: FormatStrings::default(),
            format_string_error: None,
            subtable: None,
            static_define_list: None,
            alias_of: None,
            alias_ambiguous: false,
        })
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_parameter(mut self, slot: usize, parameter: Parameter) -> Self {
        self.parameters[slot] = parameter;
        self
    }

    pub fn with_subtable(mut self, table: TableId, external: bool) -> Self {
        self.subtable = Some(SubtableRef { table, external });
        self
    }

    pub fn with_static_define_list(mut self, name: impl Into<String>) -> Self {
        self.static_define_list = Some(name.into());
        self
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn canonical_type(&self) -> &'static str {
        // Column::new guarantees the token supports the storage mode
        self.token.canonical_name(self.storage).unwrap_or("IGNORE")
    }

    pub fn parameter_kind(&self, slot: usize) -> ParameterKind {
        self.token.parameter_kind(self.flags, slot)
    }

    pub fn is_alias(&self) -> bool {
        self.flags.contains(ColumnFlags::REDUNDANTNAME)
    }

    /// Whether the column contributes bytes to a record stream
    pub fn occupies_stream(&self) -> bool {
        self.token.carries_data() && !self.is_alias()
    }

    pub fn bit_width(&self) -> u32 {
        self.flags.bit_width() as u32
    }

    /// Element count of a fixed array column
    pub fn fixed_count(&self) -> Result<usize> {
        match self.parameters[0].as_int() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(Error::InvalidSchema(format!(
                "fixed array '{}' has no element count",
                self.display_name()
            ))),
        }
    }
}

/// An ordered list of columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumValueType {
    Int,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Int(i32),
    Text(String),
}

impl std::fmt::Display for EnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnumValue::Int(v) => write!(f, "{}", v),
            EnumValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub name: String,
    pub value: EnumValue,
}

impl EnumEntry {
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value: EnumValue::Int(value),
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: EnumValue::Text(value.into()),
        }
    }
}

/// Named list of values used to render integer columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    pub name: String,
    pub value_type: EnumValueType,
    #[serde(default)]
    pub entries: Vec<EnumEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Other names exported for the same native table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Enumeration {
    pub fn new(name: impl Into<String>, value_type: EnumValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            entries: Vec::new(),
            parent: None,
            aliases: Vec::new(),
        }
    }

    /// Order entries: numerically for int enums, ordinally for string enums,
    /// ties broken by name
    pub fn sort_entries(&mut self) {
        self.entries.sort_by(|a, b| {
            let by_value = match (&a.value, &b.value) {
                (EnumValue::Int(x), EnumValue::Int(y)) => x.cmp(y),
                (EnumValue::Text(x), EnumValue::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
                (EnumValue::Int(_), EnumValue::Text(_)) => std::cmp::Ordering::Less,
                (EnumValue::Text(_), EnumValue::Int(_)) => std::cmp::Ordering::Greater,
            };
            by_value.then_with(|| a.name.cmp(&b.name))
        });
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Tables and enumerations of one export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    tables: Vec<Table>,
    pub enums: Vec<Enumeration>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) -> TableId {
        self.tables.push(table);
        TableId(self.tables.len() - 1)
    }

    /// Reserve a slot for a table whose columns are filled in later
    pub fn reserve_table(&mut self, name: impl Into<String>) -> TableId {
        self.add_table(Table::new(name))
    }

    pub fn table(&self, id: TableId) -> Result<&Table> {
        self.tables
            .get(id.0)
            .ok_or_else(|| Error::UnknownTable(format!("#{}", id.0)))
    }

    pub fn table_mut(&mut self, id: TableId) -> Result<&mut Table> {
        self.tables
            .get_mut(id.0)
            .ok_or_else(|| Error::UnknownTable(format!("#{}", id.0)))
    }

    pub fn table_by_name(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .map(TableId)
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableId, &Table)> {
        self.tables.iter().enumerate().map(|(i, t)| (TableId(i), t))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn add_enum(&mut self, enumeration: Enumeration) {
        self.enums.push(enumeration);
    }

    /// Find an enumeration by name or alias
    pub fn enumeration(&self, name: &str) -> Option<&Enumeration> {
        self.enums.iter().find(|e| e.answers_to(name))
    }

    /// Entries of an enumeration with its parents folded in: the child's
    /// entries first, then parent entries the child does not override
    pub fn flattened_entries(&self, name: &str) -> Result<Vec<EnumEntry>> {
        let mut entries: Vec<EnumEntry> = Vec::new();
        let mut seen_names = HashSet::new();
        let mut visited = HashSet::new();
        let mut current = Some(name.to_string());

        while let Some(enum_name) = current {
            let enumeration = self
                .enumeration(&enum_name)
                .ok_or_else(|| Error::InvalidSchema(format!("unknown enumeration '{}'", enum_name)))?;
            if !visited.insert(enumeration.name.clone()) {
                return Err(Error::InvalidSchema(format!(
                    "enumeration '{}' has a cyclic parent chain",
                    name
                )));
            }
            for entry in &enumeration.entries {
                if seen_names.insert(entry.name.clone()) {
                    entries.push(entry.clone());
                }
            }
            current = enumeration.parent.clone();
        }

        Ok(entries)
    }

    /// Name for an integer value in a static define list
    pub fn define_name(&self, list: &str, value: i64) -> Option<String> {
        self.flattened_entries(list)
            .ok()?
            .into_iter()
            .find(|e| matches!(e.value, EnumValue::Int(v) if v as i64 == value))
            .map(|e| e.name)
    }

    /// Integer value for a name in a static define list
    pub fn define_value(&self, list: &str, name: &str) -> Option<i64> {
        self.flattened_entries(list)
            .ok()?
            .into_iter()
            .find(|e| e.name == name)
            .and_then(|e| match e.value {
                EnumValue::Int(v) => Some(v as i64),
                EnumValue::Text(_) => None,
            })
    }

    /// Structural checks every loaded or exported schema must pass
    pub fn validate(&self) -> Result<()> {
        for table in &self.tables {
            self.validate_table(table)?;
        }
        for enumeration in &self.enums {
            if let Some(parent) = &enumeration.parent {
                if self.enumeration(parent).is_none() {
                    return Err(Error::InvalidSchema(format!(
                        "enumeration '{}' has unknown parent '{}'",
                        enumeration.name, parent
                    )));
                }
            }
            self.flattened_entries(&enumeration.name)?;
        }
        Ok(())
    }

    fn validate_table(&self, table: &Table) -> Result<()> {
        for column in &table.columns {
            let context = || format!("{}.{}", table.name, column.display_name());

            if let Some(sub) = column.subtable {
                if sub.table.0 >= self.tables.len() {
                    return Err(Error::InvalidSchema(format!(
                        "{} references a missing subtable",
                        context()
                    )));
                }
            } else if matches!(column.token(), Token::Structure | Token::Polymorph)
                && !column.is_alias()
            {
                return Err(Error::InvalidSchema(format!("{} has no subtable", context())));
            }

            if column.storage().is_fixed_array() {
                column.fixed_count()?;
            }

            if !column.occupies_stream() {
                continue;
            }

            if column.token() == Token::Bit {
                let width = column.bit_width();
                if width == 0 || width > MAX_BIT_WIDTH {
                    return Err(Error::InvalidSchema(format!(
                        "{} has bit width {}",
                        context(),
                        width
                    )));
                }
                if field_end(column.offset, width).is_err() {
                    return Err(Error::InvalidSchema(format!(
                        "{} at bit {} with width {} is beyond a {}-bit run",
                        context(),
                        column.offset,
                        width,
                        MAX_RUN_BITS
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A REDUNDANTNAME column whose alias target could not be chosen uniquely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasWarning {
    pub table: String,
    pub column: String,
    pub chosen: Option<String>,
    pub candidates: usize,
}

/// Link every REDUNDANTNAME column to the column it aliases.
///
/// The target is the first other non-alias column with the same offset and
/// token. For bit columns a candidate with an equal `parameters[0]` wins.
/// When more than one candidate remains, the first is used and the column is
/// flagged as ambiguous.
pub fn resolve_aliases(table: &mut Table) -> Vec<AliasWarning> {
    let mut warnings = Vec::new();

    for i in 0..table.columns.len() {
        if !table.columns[i].is_alias() {
            continue;
        }
        let alias = &table.columns[i];

        let candidates: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(j, c)| {
                *j != i && !c.is_alias() && c.offset == alias.offset && c.token() == alias.token()
            })
            .map(|(j, _)| j)
            .collect();

        let preferred: Vec<usize> = if alias.token() == Token::Bit {
            let same_param: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&j| table.columns[j].parameters[0] == alias.parameters[0])
                .collect();
            if same_param.is_empty() {
                candidates
            } else {
                same_param
            }
        } else {
            candidates
        };

        let chosen = preferred.first().copied();
        let ambiguous = preferred.len() > 1;

        if ambiguous || chosen.is_none() {
            warnings.push(AliasWarning {
                table: table.name.clone(),
                column: alias.display_name().to_string(),
                chosen: chosen.map(|j| table.columns[j].display_name().to_string()),
                candidates: preferred.len(),
            });
        }

        let column = &mut table.columns[i];
        column.alias_of = chosen;
        column.alias_ambiguous = ambiguous;
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str, offset: u32) -> Column {
        Column::new(Some(name.to_string()), Token::Int32, ColumnFlags::empty())
            .unwrap()
            .with_offset(offset)
    }

    fn bit(name: &str, offset: u32, width: u8) -> Column {
        Column::new(
            Some(name.to_string()),
            Token::Bit,
            ColumnFlags::empty().with_bit_width(width),
        )
        .unwrap()
        .with_offset(offset)
    }

    fn alias(column: Column) -> Column {
        let flags = column.flags() | ColumnFlags::REDUNDANTNAME;
        let mut aliased = Column::new(column.name.clone(), column.token(), flags).unwrap();
        aliased.offset = column.offset;
        aliased.parameters = column.parameters.clone();
        aliased
    }

    #[test]
    fn test_column_rejects_unsupported_storage() {
        let err = Column::new(Some("P".into()), Token::Polymorph, ColumnFlags::empty()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedStorage {
                storage: StorageMode::DirectValue,
                ..
            }
        ));
        assert!(Column::new(None, Token::Int32, ColumnFlags::FIXED_ARRAY | ColumnFlags::EARRAY).is_err());
    }

    #[test]
    fn test_column_canonical_type() {
        let col = Column::new(None, Token::Structure, ColumnFlags::INDIRECT | ColumnFlags::EARRAY).unwrap();
        assert_eq!(col.canonical_type(), "STRUCT");
        assert_eq!(col.parameter_kind(1), ParameterKind::Subtable);
    }

    #[test]
    fn test_alias_first_match() {
        let mut table = Table::new("T")
            .with_column(int("A", 4))
            .with_column(int("B", 8))
            .with_column(alias(int("Old", 8)));

        let warnings = resolve_aliases(&mut table);
        assert!(warnings.is_empty());
        assert_eq!(table.columns[2].alias_of, Some(1));
        assert!(!table.columns[2].alias_ambiguous);
    }

    #[test]
    fn test_alias_ignores_other_aliases() {
        let mut table = Table::new("T")
            .with_column(alias(int("X", 0)))
            .with_column(int("A", 0))
            .with_column(alias(int("Y", 0)));

        resolve_aliases(&mut table);
        assert_eq!(table.columns[0].alias_of, Some(1));
        assert_eq!(table.columns[2].alias_of, Some(1));
    }

    #[test]
    fn test_alias_bit_prefers_equal_parameter() {
        let mut table = Table::new("T")
            .with_column(bit("Lo", 0, 4).with_parameter(0, Parameter::Int(1)))
            .with_column(bit("Hi", 0, 4).with_parameter(0, Parameter::Int(2)))
            .with_column(alias(bit("HiAlias", 0, 4).with_parameter(0, Parameter::Int(2))));

        let warnings = resolve_aliases(&mut table);
        assert!(warnings.is_empty());
        assert_eq!(table.columns[2].alias_of, Some(1));
    }

    #[test]
    fn test_alias_ambiguity_flagged() {
        let mut table = Table::new("T")
            .with_column(int("A", 0))
            .with_column(int("B", 0))
            .with_column(alias(int("C", 0)));

        let warnings = resolve_aliases(&mut table);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].chosen.as_deref(), Some("A"));
        assert_eq!(warnings[0].candidates, 2);
        assert_eq!(table.columns[2].alias_of, Some(0));
        assert!(table.columns[2].alias_ambiguous);
    }

    #[test]
    fn test_alias_without_target() {
        let mut table = Table::new("T")
            .with_column(int("A", 0))
            .with_column(alias(int("Lost", 12)));

        let warnings = resolve_aliases(&mut table);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].chosen, None);
        assert_eq!(table.columns[1].alias_of, None);
    }

    #[test]
    fn test_flattened_entries() {
        let mut schema = Schema::new();
        let mut parent = Enumeration::new("Base", EnumValueType::Int);
        parent.entries = vec![EnumEntry::int("None", 0), EnumEntry::int("Fire", 1)];
        let mut child = Enumeration::new("Derived", EnumValueType::Int);
        child.entries = vec![EnumEntry::int("Fire", 10), EnumEntry::int("Ice", 2)];
        child.parent = Some("Base".to_string());
        child.aliases = vec!["DerivedAlias".to_string()];
        schema.add_enum(parent);
        schema.add_enum(child);

        let flat = schema.flattened_entries("Derived").unwrap();
        let names: Vec<&str> = flat.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Fire", "Ice", "None"]);
        assert_eq!(flat[0].value, EnumValue::Int(10));

        assert_eq!(schema.define_name("DerivedAlias", 0).as_deref(), Some("None"));
        assert_eq!(schema.define_value("Derived", "Ice"), Some(2));
        assert_eq!(schema.define_value("Derived", "Water"), None);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_cyclic_parent_rejected() {
        let mut schema = Schema::new();
        let mut a = Enumeration::new("A", EnumValueType::Int);
        a.parent = Some("B".into());
        let mut b = Enumeration::new("B", EnumValueType::Int);
        b.parent = Some("A".into());
        schema.add_enum(a);
        schema.add_enum(b);
        assert!(schema.flattened_entries("A").is_err());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_sort_entries() {
        let mut e = Enumeration::new("E", EnumValueType::Int);
        e.entries = vec![
            EnumEntry::int("B", 10),
            EnumEntry::int("A", -1),
            EnumEntry::int("C", 2),
            EnumEntry::int("Alias", 2),
        ];
        e.sort_entries();
        let names: Vec<&str> = e.entries.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, vec!["A", "Alias", "C", "B"]);

        let mut s = Enumeration::new("S", EnumValueType::String);
        s.entries = vec![EnumEntry::text("x", "b"), EnumEntry::text("y", "B")];
        s.sort_entries();
        assert_eq!(s.entries[0].name, "y");
    }

    #[test]
    fn test_validate_bit_run_overflow() {
        let mut schema = Schema::new();
        schema.add_table(
            Table::new("Bits")
                .with_column(bit("A", 0, 64))
                .with_column(bit("B", 100, 30)),
        );
        assert!(matches!(schema.validate(), Err(Error::InvalidSchema(_))));

        let mut schema = Schema::new();
        schema.add_table(Table::new("Bits").with_column(bit("Zero", 0, 0)));
        assert!(schema.validate().is_err());

        let mut schema = Schema::new();
        schema.add_table(Table::new("Bits").with_column(bit("Far", u32::MAX, 8)));
        assert!(matches!(schema.validate(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_validate_missing_subtable() {
        let mut schema = Schema::new();
        let col = Column::new(Some("S".into()), Token::Structure, ColumnFlags::empty()).unwrap();
        schema.add_table(Table::new("T").with_column(col.clone()));
        assert!(schema.validate().is_err());

        let mut schema = Schema::new();
        schema.add_table(Table::new("T").with_column(col.with_subtable(TableId(7), true)));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_fixed_array_needs_count() {
        let mut schema = Schema::new();
        let col = Column::new(Some("F".into()), Token::Float, ColumnFlags::FIXED_ARRAY).unwrap();
        schema.add_table(Table::new("T").with_column(col.clone()));
        assert!(schema.validate().is_err());

        let mut schema = Schema::new();
        schema.add_table(Table::new("T").with_column(col.with_parameter(0, Parameter::Int(3))));
        assert!(schema.validate().is_ok());
    }
}
