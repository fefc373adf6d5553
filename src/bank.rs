//! Columnar banks with a row-selection list.
//!
//! A [`Bank`] owns one vector per schema column. Filtering never deletes
//! rows: it narrows the bank's selection, which [`Bank::row_list`] reports
//! until the next [`Bank::set_rows`] or [`Bank::reset`].

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry;
use crate::schema::{ColumnType, Schema};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single cell value, tagged with its storage type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Byte(_) => ColumnType::Byte,
            Value::Short(_) => ColumnType::Short,
            Value::Int(_) => ColumnType::Int,
            Value::Long(_) => ColumnType::Long,
            Value::Float(_) => ColumnType::Float,
            Value::Double(_) => ColumnType::Double,
        }
    }

    /// Widened integer value; `None` for floating-point cells.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(v.into()),
            Value::Short(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::Long(v) => Some(v),
            Value::Float(_) | Value::Double(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Byte(v) => v.into(),
            Value::Short(v) => v.into(),
            Value::Int(v) => v.into(),
            Value::Long(v) => v as f64,
            Value::Float(v) => v.into(),
            Value::Double(v) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Storage of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl ColumnData {
    fn with_type(ty: ColumnType) -> ColumnData {
        match ty {
            ColumnType::Byte => ColumnData::Byte(Vec::new()),
            ColumnType::Short => ColumnData::Short(Vec::new()),
            ColumnType::Int => ColumnData::Int(Vec::new()),
            ColumnType::Long => ColumnData::Long(Vec::new()),
            ColumnType::Float => ColumnData::Float(Vec::new()),
            ColumnType::Double => ColumnData::Double(Vec::new()),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Byte(_) => ColumnType::Byte,
            ColumnData::Short(_) => ColumnType::Short,
            ColumnData::Int(_) => ColumnType::Int,
            ColumnData::Long(_) => ColumnType::Long,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Double(_) => ColumnType::Double,
        }
    }

    fn resize(&mut self, rows: usize) {
        match self {
            ColumnData::Byte(v) => v.resize(rows, 0),
            ColumnData::Short(v) => v.resize(rows, 0),
            ColumnData::Int(v) => v.resize(rows, 0),
            ColumnData::Long(v) => v.resize(rows, 0),
            ColumnData::Float(v) => v.resize(rows, 0.0),
            ColumnData::Double(v) => v.resize(rows, 0.0),
        }
    }

    fn fill_zero(&mut self) {
        match self {
            ColumnData::Byte(v) => v.fill(0),
            ColumnData::Short(v) => v.fill(0),
            ColumnData::Int(v) => v.fill(0),
            ColumnData::Long(v) => v.fill(0),
            ColumnData::Float(v) => v.fill(0.0),
            ColumnData::Double(v) => v.fill(0.0),
        }
    }

    fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Byte(v) => Value::Byte(v[row]),
            ColumnData::Short(v) => Value::Short(v[row]),
            ColumnData::Int(v) => Value::Int(v[row]),
            ColumnData::Long(v) => Value::Long(v[row]),
            ColumnData::Float(v) => Value::Float(v[row]),
            ColumnData::Double(v) => Value::Double(v[row]),
        }
    }

    /// Store `value` at `row`. Returns false, leaving the column as it
    /// was, when the tags disagree.
    fn set(&mut self, row: usize, value: Value) -> bool {
        match (self, value) {
            (ColumnData::Byte(c), Value::Byte(v)) => c[row] = v,
            (ColumnData::Short(c), Value::Short(v)) => c[row] = v,
            (ColumnData::Int(c), Value::Int(v)) => c[row] = v,
            (ColumnData::Long(c), Value::Long(v)) => c[row] = v,
            (ColumnData::Float(c), Value::Float(v)) => c[row] = v,
            (ColumnData::Double(c), Value::Double(v)) => c[row] = v,
            _ => return false,
        }
        true
    }
}

/// Rust primitive types that can be stored in a bank column.
pub trait Scalar: Copy + PartialEq + fmt::Debug + 'static {
    const TYPE: ColumnType;

    fn from_value(value: Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn slice(data: &ColumnData) -> Option<&[Self]>;
    fn slice_mut(data: &mut ColumnData) -> Option<&mut [Self]>;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const TYPE: ColumnType = ColumnType::$variant;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn slice(data: &ColumnData) -> Option<&[Self]> {
                match data {
                    ColumnData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut ColumnData) -> Option<&mut [Self]> {
                match data {
                    ColumnData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_scalar!(i8, Byte);
impl_scalar!(i16, Short);
impl_scalar!(i32, Int);
impl_scalar!(i64, Long);
impl_scalar!(f32, Float);
impl_scalar!(f64, Double);

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// A named table of typed columns for one event.
///
/// ```
/// use bankseq::{Bank, Schema};
/// use std::sync::Arc;
///
/// let schema = Arc::new(Schema::parse("REC::Particle", "pid/I").unwrap());
/// let mut bank = Bank::new(schema);
/// bank.set_rows(3);
/// for (row, pid) in [11, 211, 13].into_iter().enumerate() {
///     bank.put("pid", row, pid).unwrap();
/// }
/// bank.apply_selection(|row| row != 2);
/// assert_eq!(bank.row_list(), vec![0, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct Bank {
    schema: Arc<Schema>,
    columns: Vec<ColumnData>,
    rows: usize,
    selection: Option<Vec<usize>>,
}

impl Bank {
    /// An empty bank (zero rows) with the given schema.
    pub fn new(schema: Arc<Schema>) -> Bank {
        let columns = schema
            .entries()
            .iter()
            .map(|e| ColumnData::with_type(e.ty))
            .collect();
        Bank {
            schema,
            columns,
            rows: 0,
            selection: None,
        }
    }

    /// An empty bank whose schema comes from the compiled registry.
    pub fn from_registry(name: &str) -> Result<Bank> {
        Ok(Bank::new(registry::schema(name)?))
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Total row count, active or not.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Resize to `rows` rows. Every cell is zeroed and the selection is
    /// cleared, as at the start of a new event.
    pub fn set_rows(&mut self, rows: usize) {
        for column in &mut self.columns {
            column.fill_zero();
            column.resize(rows);
        }
        self.rows = rows;
        self.selection = None;
    }

    pub fn reset(&mut self) {
        self.set_rows(0);
    }

    // -----------------------------------------------------------------------
    // Cell access
    // -----------------------------------------------------------------------

    fn locate(&self, column: &str, expected: Option<ColumnType>) -> Result<usize> {
        let (index, found) =
            self.schema
                .column(column)
                .ok_or_else(|| Error::ColumnNotFound {
                    bank: self.name().to_string(),
                    column: column.to_string(),
                })?;
        if let Some(expected) = expected
            && expected != found
        {
            return Err(Error::TypeMismatch {
                bank: self.name().to_string(),
                column: column.to_string(),
                expected,
                found,
            });
        }
        Ok(index)
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows {
            return Err(Error::RowOutOfRange {
                bank: self.name().to_string(),
                row,
                rows: self.rows,
            });
        }
        Ok(())
    }

    /// Read one cell, requiring its stored type to be `expected`.
    pub fn get_scalar(&self, column: &str, row: usize, expected: ColumnType) -> Result<Value> {
        let index = self.locate(column, Some(expected))?;
        self.check_row(row)?;
        Ok(self.columns[index].value(row))
    }

    /// Overwrite one cell. The value's tag must match the column type.
    pub fn set_scalar(&mut self, column: &str, row: usize, value: Value) -> Result<()> {
        let expected = value.column_type();
        let index = self.locate(column, Some(expected))?;
        self.check_row(row)?;
        if !self.columns[index].set(row, value) {
            return Err(Error::TypeMismatch {
                bank: self.name().to_string(),
                column: column.to_string(),
                expected,
                found: self.columns[index].column_type(),
            });
        }
        Ok(())
    }

    /// Read one cell of whatever type the column stores.
    pub fn get_value(&self, column: &str, row: usize) -> Result<Value> {
        let index = self.locate(column, None)?;
        self.check_row(row)?;
        Ok(self.columns[index].value(row))
    }

    pub fn get<T: Scalar>(&self, column: &str, row: usize) -> Result<T> {
        let value = self.get_scalar(column, row, T::TYPE)?;
        // get_scalar has already checked the tag
        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            bank: self.name().to_string(),
            column: column.to_string(),
            expected: T::TYPE,
            found: value.column_type(),
        })
    }

    pub fn put<T: Scalar>(&mut self, column: &str, row: usize, value: T) -> Result<()> {
        self.set_scalar(column, row, value.into_value())
    }

    /// Read any integer column widened to `i64`.
    pub fn get_i64(&self, column: &str, row: usize) -> Result<i64> {
        let value = self.get_value(column, row)?;
        value.as_i64().ok_or_else(|| Error::TypeMismatch {
            bank: self.name().to_string(),
            column: column.to_string(),
            expected: ColumnType::Long,
            found: value.column_type(),
        })
    }

    /// A whole column, indexed by row (active or not).
    pub fn column<T: Scalar>(&self, column: &str) -> Result<&[T]> {
        let index = self.locate(column, Some(T::TYPE))?;
        T::slice(&self.columns[index]).ok_or_else(|| Error::TypeMismatch {
            bank: self.name().to_string(),
            column: column.to_string(),
            expected: T::TYPE,
            found: self.columns[index].column_type(),
        })
    }

    pub fn column_mut<T: Scalar>(&mut self, column: &str) -> Result<&mut [T]> {
        let index = self.locate(column, Some(T::TYPE))?;
        let found = self.columns[index].column_type();
        let bank = self.name().to_string();
        T::slice_mut(&mut self.columns[index]).ok_or_else(|| Error::TypeMismatch {
            bank,
            column: column.to_string(),
            expected: T::TYPE,
            found,
        })
    }

    // -----------------------------------------------------------------------
    // Row selection
    // -----------------------------------------------------------------------

    /// Active rows: the current selection if one was applied this event,
    /// otherwise every row. Recomputed on each call.
    pub fn row_list(&self) -> Vec<usize> {
        match &self.selection {
            Some(selection) => selection.clone(),
            None => (0..self.rows).collect(),
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selection.is_some()
    }

    pub fn active_rows(&self) -> usize {
        self.selection.as_ref().map_or(self.rows, Vec::len)
    }

    /// Keep the active rows for which `predicate` holds. Rows already
    /// rejected stay rejected.
    pub fn apply_selection(&mut self, mut predicate: impl FnMut(usize) -> bool) {
        let kept = self.row_list().into_iter().filter(|&row| predicate(row)).collect();
        self.selection = Some(kept);
    }

    /// Like [`Bank::apply_selection`], with a predicate that reads the bank
    /// and may fail. On failure the selection is left untouched.
    pub fn try_filter_rows(
        &mut self,
        mut predicate: impl FnMut(&Bank, usize) -> Result<bool>,
    ) -> Result<()> {
        let mut kept = Vec::new();
        for row in self.row_list() {
            if predicate(self, row)? {
                kept.push(row);
            }
        }
        self.selection = Some(kept);
        Ok(())
    }

    /// Narrow the selection to `rows`, ignoring indices past the end.
    pub fn restrict_to(&mut self, rows: &[usize]) {
        let mut allowed = vec![false; self.rows];
        for &row in rows {
            if row < self.rows {
                allowed[row] = true;
            }
        }
        self.apply_selection(|row| allowed[row]);
    }

    /// Print the bank to stdout.
    pub fn show(&self) {
        println!("{self}");
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "BANK '{}' [{}/{}] rows={} active={}",
            self.name(),
            self.schema.group(),
            self.schema.item(),
            self.rows,
            self.active_rows()
        )?;
        write!(f, "  row |")?;
        for entry in self.schema.entries() {
            write!(f, " {:>10}", entry.name)?;
        }
        let active = self.row_list();
        for row in 0..self.rows {
            let mark = if active.binary_search(&row).is_ok() { ' ' } else { 'x' };
            write!(f, "\n{mark}{row:>4} |")?;
            for column in &self.columns {
                write!(f, " {:>10}", column.value(row).to_string())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particles(pids: &[i32]) -> Bank {
        let schema = Arc::new(Schema::parse("REC::Particle", "pid/I,px/F,status/S").unwrap());
        let mut bank = Bank::new(schema);
        bank.set_rows(pids.len());
        for (row, &pid) in pids.iter().enumerate() {
            bank.put("pid", row, pid).unwrap();
            bank.put("px", row, row as f32 * 0.5).unwrap();
        }
        bank
    }

    #[test]
    fn test_get_set_roundtrip() {
        let mut bank = particles(&[11, 211]);
        assert_eq!(bank.get::<i32>("pid", 1).unwrap(), 211);
        bank.set_scalar("pid", 1, Value::Int(-211)).unwrap();
        assert_eq!(bank.get_scalar("pid", 1, ColumnType::Int).unwrap(), Value::Int(-211));
        assert_eq!(bank.get::<i32>("pid", 0).unwrap(), 11);
    }

    #[test]
    fn test_access_errors() {
        let mut bank = particles(&[11]);
        assert!(matches!(
            bank.get::<i32>("pid", 1),
            Err(Error::RowOutOfRange { row: 1, rows: 1, .. })
        ));
        assert!(matches!(
            bank.get::<i32>("energy", 0),
            Err(Error::ColumnNotFound { column, .. }) if column == "energy"
        ));
        assert!(matches!(
            bank.get::<f32>("pid", 0),
            Err(Error::TypeMismatch {
                expected: ColumnType::Float,
                found: ColumnType::Int,
                ..
            })
        ));
        assert!(bank.put("pid", 0, 1.0f64).is_err());
        assert_eq!(bank.get::<i32>("pid", 0).unwrap(), 11);
    }

    #[test]
    fn test_set_scalar_rejects_other_tags() {
        let mut bank = particles(&[11]);
        assert!(matches!(
            bank.set_scalar("pid", 0, Value::Float(2.5)),
            Err(Error::TypeMismatch {
                expected: ColumnType::Float,
                found: ColumnType::Int,
                ..
            })
        ));
        assert_eq!(bank.get::<i32>("pid", 0).unwrap(), 11);

        let mut column = ColumnData::with_type(ColumnType::Short);
        column.resize(1);
        assert!(!column.set(0, Value::Int(7)));
        assert_eq!(column.value(0), Value::Short(0));
        assert!(column.set(0, Value::Short(7)));
        assert_eq!(column.value(0), Value::Short(7));
    }

    #[test]
    fn test_widening_reads() {
        let mut bank = particles(&[2212]);
        bank.put("status", 0, -2110i16).unwrap();
        assert_eq!(bank.get_i64("status", 0).unwrap(), -2110);
        assert_eq!(bank.get_i64("pid", 0).unwrap(), 2212);
        assert!(bank.get_i64("px", 0).is_err());
        assert_eq!(bank.get_value("px", 0).unwrap().as_f64(), 0.0);
    }

    #[test]
    fn test_row_list_defaults_to_all_rows() {
        let bank = particles(&[11, 211, 13]);
        assert_eq!(bank.row_list(), vec![0, 1, 2]);
        assert!(!bank.is_selected());
    }

    #[test]
    fn test_selection_narrows_monotonically() {
        let mut bank = particles(&[11, 211, 13, 22]);
        bank.apply_selection(|row| row != 1);
        assert_eq!(bank.row_list(), vec![0, 2, 3]);
        // a predicate accepting everything cannot bring row 1 back
        bank.apply_selection(|_| true);
        assert_eq!(bank.row_list(), vec![0, 2, 3]);
        bank.apply_selection(|row| row != 3);
        assert_eq!(bank.row_list(), vec![0, 2]);
        assert_eq!(bank.active_rows(), 2);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let mut bank = particles(&[11, 211, 13]);
        let pids = bank.column::<i32>("pid").unwrap().to_vec();
        bank.apply_selection(|row| pids[row] != 13);
        let first = bank.row_list();
        bank.apply_selection(|row| pids[row] != 13);
        assert_eq!(bank.row_list(), first);
    }

    #[test]
    fn test_try_filter_rows_keeps_selection_on_error() {
        let mut bank = particles(&[11, 211, 13]);
        bank.apply_selection(|row| row > 0);
        let result = bank.try_filter_rows(|b, row| {
            let pid = b.get::<i32>("pid", row)?;
            if pid == 13 {
                return Err(Error::InvalidData {
                    bank: b.name().to_string(),
                    reason: "muon".to_string(),
                });
            }
            Ok(true)
        });
        assert!(result.is_err());
        assert_eq!(bank.row_list(), vec![1, 2]);

        bank.try_filter_rows(|b, row| Ok(b.get::<i32>("pid", row)? == 211))
            .unwrap();
        assert_eq!(bank.row_list(), vec![1]);
    }

    #[test]
    fn test_restrict_to() {
        let mut bank = particles(&[11, 211, 13]);
        bank.restrict_to(&[0, 2, 7]);
        assert_eq!(bank.row_list(), vec![0, 2]);
        bank.restrict_to(&[1, 2]);
        assert_eq!(bank.row_list(), vec![2]);
    }

    #[test]
    fn test_set_rows_zeroes_and_clears_selection() {
        let mut bank = particles(&[11, 211]);
        bank.apply_selection(|row| row == 0);
        bank.set_rows(3);
        assert_eq!(bank.row_list(), vec![0, 1, 2]);
        assert_eq!(bank.column::<i32>("pid").unwrap(), &[0, 0, 0]);
        bank.reset();
        assert_eq!(bank.rows(), 0);
        assert!(bank.row_list().is_empty());
    }

    #[test]
    fn test_column_mut() {
        let mut bank = particles(&[11, 211]);
        for px in bank.column_mut::<f32>("px").unwrap() {
            *px += 1.0;
        }
        assert_eq!(bank.column::<f32>("px").unwrap(), &[1.0, 1.5]);
        assert!(bank.column_mut::<f64>("px").is_err());
    }

    #[test]
    fn test_display_is_pure() {
        let mut bank = particles(&[11, 211, 13]);
        bank.apply_selection(|row| row != 2);
        let before = bank.row_list();
        let text = bank.to_string();
        assert!(text.contains("REC::Particle"));
        assert!(text.contains("active=2"));
        assert!(text.contains("x   2"));
        assert_eq!(bank.row_list(), before);
    }

    #[test]
    fn test_from_registry() {
        let bank = Bank::from_registry("REC::Particle").unwrap();
        assert_eq!(bank.rows(), 0);
        assert!(bank.schema().has_column("vz"));
        assert!(Bank::from_registry("NOPE").is_err());
    }
}
