//! Bank schemas: the ordered, typed columns of a named bank.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ColumnType {
    /// Single-letter code used in bank descriptors (`"sector/I"`).
    pub fn code(self) -> char {
        match self {
            ColumnType::Byte => 'B',
            ColumnType::Short => 'S',
            ColumnType::Int => 'I',
            ColumnType::Long => 'L',
            ColumnType::Float => 'F',
            ColumnType::Double => 'D',
        }
    }

    pub fn from_code(code: &str) -> Option<ColumnType> {
        match code {
            "B" => Some(ColumnType::Byte),
            "S" => Some(ColumnType::Short),
            "I" => Some(ColumnType::Int),
            "L" => Some(ColumnType::Long),
            "F" => Some(ColumnType::Float),
            "D" => Some(ColumnType::Double),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ColumnType::Float | ColumnType::Double)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Byte => "byte",
            ColumnType::Short => "short",
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
        };
        f.write_str(name)
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub ty: ColumnType,
}

/// Column layout of a bank.
///
/// Column names are unique within a schema and keep their declaration
/// order. Banks created at run time (for example by a creator algorithm)
/// carry `group`/`item` of zero unless [`Schema::with_ids`] is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    group: i32,
    item: i32,
    entries: Vec<Entry>,
    lookup: HashMap<String, usize>,
}

impl Schema {
    pub fn new(name: impl Into<String>, entries: Vec<Entry>) -> Result<Schema> {
        let name = name.into();
        if entries.is_empty() {
            return Err(Error::InvalidSchema {
                bank: name,
                reason: "a bank needs at least one column".to_string(),
            });
        }
        let mut lookup = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.name.is_empty() {
                return Err(Error::InvalidSchema {
                    bank: name,
                    reason: format!("column {i} has an empty name"),
                });
            }
            if lookup.insert(entry.name.clone(), i).is_some() {
                return Err(Error::InvalidSchema {
                    bank: name,
                    reason: format!("column '{}' is declared twice", entry.name),
                });
            }
        }
        Ok(Schema {
            name,
            group: 0,
            item: 0,
            entries,
            lookup,
        })
    }

    /// Build a schema from a descriptor such as `"sector/I,pindex/S"`.
    pub fn parse(name: impl Into<String>, descriptor: &str) -> Result<Schema> {
        let name = name.into();
        let mut entries = Vec::new();
        for part in descriptor.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((column, code)) = part.split_once('/') else {
                return Err(Error::InvalidSchema {
                    bank: name,
                    reason: format!("'{part}' is not of the form name/TYPE"),
                });
            };
            let Some(ty) = ColumnType::from_code(code.trim()) else {
                return Err(Error::InvalidSchema {
                    bank: name,
                    reason: format!("column '{column}' has unknown type '{code}'"),
                });
            };
            entries.push(Entry {
                name: column.trim().to_string(),
                ty,
            });
        }
        Schema::new(name, entries)
    }

    pub fn with_ids(mut self, group: i32, item: i32) -> Schema {
        self.group = group;
        self.item = item;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> i32 {
        self.group
    }

    pub fn item(&self) -> i32 {
        self.item
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position and type of a column.
    pub fn column(&self, name: &str) -> Option<(usize, ColumnType)> {
        self.lookup.get(name).map(|&i| (i, self.entries[i].ty))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// The `"a/I,b/F"` form accepted by [`Schema::parse`].
    pub fn descriptor(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}/{}", e.name, e.ty.code()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let schema = Schema::parse("REC::Particle::Sector", "sector/I, pindex/S").unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.column("sector"), Some((0, ColumnType::Int)));
        assert_eq!(schema.column("pindex"), Some((1, ColumnType::Short)));
        assert!(!schema.has_column("pid"));
        assert_eq!(schema.descriptor(), "sector/I,pindex/S");
    }

    #[test]
    fn test_parse_rejects_bad_descriptors() {
        assert!(matches!(
            Schema::parse("X", "sector"),
            Err(Error::InvalidSchema { .. })
        ));
        assert!(matches!(
            Schema::parse("X", "sector/Q"),
            Err(Error::InvalidSchema { .. })
        ));
        assert!(matches!(
            Schema::parse("X", ""),
            Err(Error::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Schema::parse("X", "a/I,a/F").unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_ids() {
        let schema = Schema::parse("X", "a/I").unwrap().with_ids(300, 31);
        assert_eq!((schema.group(), schema.item()), (300, 31));
    }
}
