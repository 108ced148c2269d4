//! Result columns and rows.
//!
//! All rows of one result share a single `Arc<[Column]>`, so the name view
//! of a row is a lookup into that shared slice rather than a per-row map.

use std::sync::Arc;

use tds_protocol::{ColumnData, TypeId};
use tds_types::{FromSql, SqlType, SqlValue, TypeError};

/// Column metadata describing a result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    /// Column name; empty for unnamed expressions.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: SqlType,
    /// Wire type.
    pub type_id: TypeId,
    /// Declared maximum length in bytes.
    pub size: u32,
    /// Precision for numeric types.
    pub precision: u8,
    /// Scale for numeric and time types.
    pub scale: u8,
    /// Whether the column allows NULL values.
    pub nullable: bool,
}

impl Column {
    /// Create a nullable column of `sql_type`.
    pub fn new(name: impl Into<String>, sql_type: SqlType, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            sql_type,
            type_id,
            size: 0,
            precision: 0,
            scale: 0,
            nullable: true,
        }
    }

    /// Build from COLMETADATA.
    pub fn from_metadata(data: &ColumnData) -> Result<Self, TypeError> {
        let info = &data.type_info;
        Ok(Self {
            name: data.name.clone(),
            sql_type: SqlType::from_type_info(info)?,
            type_id: info.type_id,
            size: info
                .type_id
                .fixed_size()
                .map_or(info.max_length, |size| size as u32),
            precision: info.precision,
            scale: info.scale,
            nullable: data.is_nullable(),
        })
    }

    /// Lower-case type name, e.g. `int` or `varchar`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.sql_type.name()
    }
}

/// A row of decoded values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row; `values` must line up with `columns`.
    pub fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get a value by column index with type conversion.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, TypeError> {
        T::from_sql(self.value(index)?)
    }

    /// Get a value by column name with type conversion.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T, TypeError> {
        self.get(self.index_of(name)?)
    }

    /// Try to get a value by column index, returning None if NULL or not found.
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        self.values
            .get(index)
            .and_then(|v| T::from_sql_nullable(v).ok().flatten())
    }

    /// Try to get a value by column name, returning None if NULL or not found.
    pub fn try_get_by_name<T: FromSql>(&self, name: &str) -> Option<T> {
        self.index_of(name).ok().and_then(|i| self.try_get(i))
    }

    /// Get the raw SQL value by index.
    #[must_use]
    pub fn get_raw(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get the raw SQL value by column name.
    #[must_use]
    pub fn get_raw_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.index_of(name).ok().and_then(|i| self.values.get(i))
    }

    /// Whether a column with this name exists.
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.index_of(name).is_ok()
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.keys().zip(self.values.iter())
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Get the number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column metadata.
    #[must_use]
    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    /// Check if a column value is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(SqlValue::is_null)
    }

    /// Check if a column value is NULL by name.
    #[must_use]
    pub fn is_null_by_name(&self, name: &str) -> bool {
        self.index_of(name).map_or(true, |i| self.is_null(i))
    }

    fn value(&self, index: usize) -> Result<&SqlValue, TypeError> {
        self.values.get(index).ok_or(TypeError::ColumnIndex {
            index,
            len: self.values.len(),
        })
    }

    // First match wins for duplicate names; exact case is tried first.
    fn index_of(&self, name: &str) -> Result<usize, TypeError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| TypeError::ColumnNotFound(name.to_string()))
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use tds_protocol::TypeInfo;

    use super::*;

    fn columns() -> Arc<[Column]> {
        Arc::from(vec![
            Column::new("id", SqlType::Int, TypeId::IntN),
            Column::new("name", SqlType::VarChar, TypeId::BigVarChar),
            Column::new("created", SqlType::DateTime, TypeId::DateTimeN),
        ])
    }

    fn row() -> Row {
        let created = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        Row::new(
            columns(),
            vec![
                SqlValue::Int(7),
                SqlValue::Null,
                SqlValue::DateTime(created),
            ],
        )
    }

    #[test]
    fn test_typed_access() {
        let row = row();
        assert_eq!(row.get::<i32>(0).unwrap(), 7);
        assert_eq!(row.get_by_name::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<Option<String>>(1).unwrap(), None);
        assert!(matches!(row.get::<String>(1), Err(TypeError::UnexpectedNull)));
        assert!(matches!(
            row.get::<i32>(9),
            Err(TypeError::ColumnIndex { index: 9, len: 3 })
        ));
        assert!(matches!(
            row.get_by_name::<i32>("nope"),
            Err(TypeError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_key_set_matches_columns() {
        let row = row();
        let keys: Vec<_> = row.keys().collect();
        assert_eq!(keys, ["id", "name", "created"]);
        for column in row.columns().iter() {
            assert!(row.contains_key(&column.name));
        }
        assert!(!row.contains_key("missing"));
    }

    #[test]
    fn test_name_lookup_falls_back_to_case_insensitive() {
        let row = row();
        assert_eq!(row.get_by_name::<i32>("ID").unwrap(), 7);
    }

    #[test]
    fn test_null_checks() {
        let row = row();
        assert!(!row.is_null(0));
        assert!(row.is_null(1));
        assert!(row.is_null(99));
        assert!(row.is_null_by_name("name"));
        assert_eq!(row.try_get_by_name::<String>("name"), None);
    }

    #[test]
    fn test_rows_share_columns() {
        let cols = columns();
        let a = Row::new(Arc::clone(&cols), vec![SqlValue::Null; 3]);
        let b = Row::new(Arc::clone(&cols), vec![SqlValue::Null; 3]);
        assert!(Arc::ptr_eq(a.columns(), b.columns()));
    }

    #[test]
    fn test_column_from_metadata() {
        let data = ColumnData::new(
            "amount",
            TypeInfo::new(TypeId::DecimalN)
                .with_max_length(9)
                .with_precision(18, 2),
        );
        let column = Column::from_metadata(&data).unwrap();
        assert_eq!(column.sql_type, SqlType::Decimal);
        assert_eq!(column.type_name(), "decimal");
        assert_eq!(column.size, 9);
        assert_eq!((column.precision, column.scale), (18, 2));
        assert!(column.nullable);

        let fixed = ColumnData::new("n", TypeInfo::new(TypeId::Int4));
        assert_eq!(Column::from_metadata(&fixed).unwrap().size, 4);
    }
}
