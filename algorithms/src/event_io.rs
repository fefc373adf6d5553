//! JSON event files.
//!
//! An event file is a JSON array of events. Each event maps a bank name to
//! an object of column name to values, one value per row:
//!
//! ```json
//! [{"REC::Particle": {"pid": [11, 211], "px": [0.1, -0.3]}}]
//! ```
//!
//! Reading an event into a [`BankList`] resets every bank first; banks
//! absent from the event stay empty and columns absent from a bank are
//! zero. Writing takes only the active rows of each bank.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bankseq::{Bank, BankList, ColumnType, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, thiserror::Error)]
pub enum EventIoError {
    #[error("cannot read event file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse event file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bank '{bank}': column '{column}' has {found} values, expected {expected}")]
    Ragged {
        bank: String,
        column: String,
        found: usize,
        expected: usize,
    },

    #[error("bank '{bank}': column '{column}' row {row}: {value} is not a valid {ty}")]
    BadValue {
        bank: String,
        column: String,
        row: usize,
        value: Json,
        ty: ColumnType,
    },

    #[error("cannot write event: {0}")]
    Write(#[from] io::Error),

    #[error(transparent)]
    Engine(#[from] bankseq::Error),
}

/// Bank name to column name to one value per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    pub banks: BTreeMap<String, BTreeMap<String, Vec<Json>>>,
}

pub fn read_events(path: &Path) -> Result<Vec<Event>, EventIoError> {
    let text = fs::read_to_string(path).map_err(|source| EventIoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_events(path, &text)
}

pub fn parse_events(path: &Path, text: &str) -> Result<Vec<Event>, EventIoError> {
    serde_json::from_str(text).map_err(|source| EventIoError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Event {
    /// Load this event into `banks`.
    pub fn fill(&self, banks: &mut BankList) -> Result<(), EventIoError> {
        banks.clear_rows();
        for index in 0..banks.len() {
            let bank = banks.get_mut(index)?;
            let Some(columns) = self.banks.get(bank.name()) else {
                continue;
            };
            fill_bank(bank, columns)?;
        }
        for name in self.banks.keys() {
            if banks.index_of(name).is_none() {
                log::debug!("event bank '{name}' is not in the bank list; ignored");
            }
        }
        Ok(())
    }

    /// Snapshot the active rows of every bank.
    pub fn from_banks(banks: &BankList) -> Result<Event, EventIoError> {
        let mut event = Event::default();
        for bank in banks.iter() {
            let rows = bank.row_list();
            let mut columns = BTreeMap::new();
            for entry in bank.schema().entries() {
                let values = rows
                    .iter()
                    .map(|&row| bank.get_value(&entry.name, row).map(to_json))
                    .collect::<bankseq::Result<Vec<_>>>()?;
                columns.insert(entry.name.clone(), values);
            }
            event.banks.insert(bank.name().to_string(), columns);
        }
        Ok(event)
    }
}

fn fill_bank(bank: &mut Bank, columns: &BTreeMap<String, Vec<Json>>) -> Result<(), EventIoError> {
    let name = bank.name().to_string();
    let rows = columns.values().map(Vec::len).next().unwrap_or(0);
    if let Some((column, values)) = columns.iter().find(|(_, values)| values.len() != rows) {
        return Err(EventIoError::Ragged {
            bank: name,
            column: column.clone(),
            found: values.len(),
            expected: rows,
        });
    }

    bank.set_rows(rows);
    for (column, values) in columns {
        let (_, ty) = bank
            .schema()
            .column(column)
            .ok_or_else(|| bankseq::Error::ColumnNotFound {
                bank: name.clone(),
                column: column.clone(),
            })?;
        for (row, json) in values.iter().enumerate() {
            let value = to_value(json, ty).ok_or_else(|| EventIoError::BadValue {
                bank: name.clone(),
                column: column.clone(),
                row,
                value: json.clone(),
                ty,
            })?;
            bank.set_scalar(column, row, value)?;
        }
    }
    Ok(())
}

fn to_value(json: &Json, ty: ColumnType) -> Option<Value> {
    Some(match ty {
        ColumnType::Byte => Value::Byte(i8::try_from(json.as_i64()?).ok()?),
        ColumnType::Short => Value::Short(i16::try_from(json.as_i64()?).ok()?),
        ColumnType::Int => Value::Int(i32::try_from(json.as_i64()?).ok()?),
        ColumnType::Long => Value::Long(json.as_i64()?),
        ColumnType::Float => Value::Float(json.as_f64()? as f32),
        ColumnType::Double => Value::Double(json.as_f64()?),
    })
}

fn to_json(value: Value) -> Json {
    match value {
        Value::Byte(v) => v.into(),
        Value::Short(v) => v.into(),
        Value::Int(v) => v.into(),
        Value::Long(v) => v.into(),
        Value::Float(v) => f64::from(v).into(),
        Value::Double(v) => v.into(),
    }
}

/// Write one event as a single JSON line.
pub fn write_event(out: &mut impl Write, event: &Event) -> Result<(), EventIoError> {
    serde_json::to_writer(&mut *out, event).map_err(io::Error::from)?;
    writeln!(out)?;
    Ok(())
}
