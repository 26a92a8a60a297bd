//! Dictionary encoding of identifiers, column names and values.
//!
//! Every column gets its own symbol table, so a value symbol is only
//! meaningful together with the column it was observed in. Node identifiers
//! are the value symbols of the key column.

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{NetworkError, Result};
use crate::types::Labeling;

#[derive(Debug, Clone, Default)]
struct SymbolTable {
    by_id: Vec<String>,
    by_value: HashMap<String, u32>,
}

impl SymbolTable {
    fn insert(&mut self, value: &str) -> Result<u32> {
        if let Some(&existing) = self.by_value.get(value) {
            return Ok(existing);
        }
        let id = u32::try_from(self.by_id.len())
            .map_err(|_| NetworkError::SymbolTableOverflow)?;
        self.by_id.push(value.to_string());
        self.by_value.insert(value.to_string(), id);
        Ok(id)
    }

    fn get_symbol(&self, value: &str) -> Option<u32> {
        self.by_value.get(value).copied()
    }

    fn get_value(&self, id: u32) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRow {
    column: String,
    value: String,
}

/// Immutable string ⇄ integer encoding built once before ingestion.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    columns: SymbolTable,
    values: Vec<SymbolTable>,
    key_column: u32,
}

impl IndexCatalog {
    /// Indexes every distinct value of every column of a delimited file.
    ///
    /// The key column defaults to the first header column.
    pub fn build_from_csv<P: AsRef<Path>>(
        path: P,
        key_column: Option<&str>,
        delimiter: u8,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path.as_ref())?;
        let header = reader.headers()?.clone();

        let mut builder = CatalogBuilder::default();
        let columns: Vec<u32> = header
            .iter()
            .map(|name| builder.column(name))
            .collect::<Result<_>>()?;
        for record in reader.records() {
            let record = record.map_err(crate::loader::row_error)?;
            for (column, value) in columns.iter().zip(record.iter()) {
                builder.value(*column, value)?;
            }
        }
        let key_column = key_column.or_else(|| header.get(0)).ok_or_else(|| {
            NetworkError::input_format(1, "header row is empty")
        })?;
        builder.finish(key_column)
    }

    /// Reads a companion index file with one `column,value` row per distinct value.
    ///
    /// The key column defaults to the first column listed in the file.
    pub fn from_index_file<P: AsRef<Path>>(path: P, key_column: Option<&str>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut builder = CatalogBuilder::default();
        let mut first_column = None;
        for row in reader.deserialize() {
            let row: IndexRow = row.map_err(crate::loader::row_error)?;
            let column = builder.column(&row.column)?;
            builder.value(column, &row.value)?;
            first_column.get_or_insert(row.column);
        }
        let key_column = key_column
            .map(str::to_string)
            .or(first_column)
            .ok_or_else(|| NetworkError::EmptyDataset("index file has no entries".to_string()))?;
        builder.finish(&key_column)
    }

    pub fn write_index_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        for (column_id, column) in self.columns.by_id.iter().enumerate() {
            for value in &self.values[column_id].by_id {
                writer.serialize(IndexRow {
                    column: column.clone(),
                    value: value.clone(),
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn key_column(&self) -> u32 {
        self.key_column
    }

    pub fn column_symbol(&self, name: &str) -> Option<u32> {
        self.columns.get_symbol(name)
    }

    pub fn column_name(&self, column: u32) -> Option<&str> {
        self.columns.get_value(column)
    }

    pub fn value_symbol(&self, column: u32, value: &str) -> Option<u32> {
        self.values.get(column as usize)?.get_symbol(value)
    }

    pub fn value(&self, column: u32, symbol: u32) -> Option<&str> {
        self.values.get(column as usize)?.get_value(symbol)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of distinct values observed in `column`.
    pub fn value_count(&self, column: u32) -> usize {
        self.values.get(column as usize).map_or(0, SymbolTable::len)
    }
}

#[derive(Default)]
struct CatalogBuilder {
    columns: SymbolTable,
    values: Vec<SymbolTable>,
}

impl CatalogBuilder {
    fn column(&mut self, name: &str) -> Result<u32> {
        let id = self.columns.insert(name)?;
        if id as usize == self.values.len() {
            self.values.push(SymbolTable::default());
        }
        Ok(id)
    }

    fn value(&mut self, column: u32, value: &str) -> Result<u32> {
        self.values[column as usize].insert(value)
    }

    fn finish(self, key_column: &str) -> Result<IndexCatalog> {
        let key = self.columns.get_symbol(key_column).ok_or_else(|| {
            NetworkError::input_format(1, format!("key column {key_column:?} is not indexed"))
        })?;
        debug!(
            "indexed {} columns, {} distinct node identifiers",
            self.columns.len(),
            self.values[key as usize].len()
        );
        Ok(IndexCatalog {
            columns: self.columns,
            values: self.values,
            key_column: key,
        })
    }
}

fn unknown(kind: &str, symbol: u32) -> String {
    format!("<unknown {kind} {symbol}>")
}

impl Labeling<u32> for IndexCatalog {
    fn node_name(&self, id: &u32) -> String {
        self.value(self.key_column, *id)
            .map_or_else(|| unknown("node", *id), str::to_string)
    }

    fn attribute_name(&self, attribute: &u32) -> String {
        self.column_name(*attribute)
            .map_or_else(|| unknown("column", *attribute), str::to_string)
    }

    fn value_name(&self, attribute: &u32, value: &u32) -> String {
        self.value(*attribute, *value)
            .map_or_else(|| unknown("value", *value), str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn builds_symbols_per_column() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_file(
            tmp.path(),
            "records.csv",
            "id,color,size\nA,red,\nB,red,big\nC,,big\n",
        );
        let catalog = IndexCatalog::build_from_csv(&input, None, b',').unwrap();

        assert_eq!(3, catalog.column_count());
        assert_eq!(Some(0), catalog.column_symbol("id"));
        assert_eq!(0, catalog.key_column());
        assert_eq!(3, catalog.value_count(0));
        // red and the empty string
        assert_eq!(2, catalog.value_count(1));

        let color = catalog.column_symbol("color").unwrap();
        let red = catalog.value_symbol(color, "red").unwrap();
        assert_eq!(Some("red"), catalog.value(color, red));
        assert_eq!("B", catalog.node_name(&1));
        assert_eq!("color", catalog.attribute_name(&color));
    }

    #[test]
    fn index_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_file(tmp.path(), "records.csv", "id,color\nA,red\nB,blue\n");
        let catalog = IndexCatalog::build_from_csv(&input, Some("id"), b',').unwrap();

        let index_file = tmp.path().join("index.csv");
        catalog.write_index_file(&index_file).unwrap();
        let restored = IndexCatalog::from_index_file(&index_file, None).unwrap();

        assert_eq!(catalog.column_count(), restored.column_count());
        assert_eq!(catalog.key_column(), restored.key_column());
        for column in 0..catalog.column_count() as u32 {
            assert_eq!(catalog.value_count(column), restored.value_count(column));
            for symbol in 0..catalog.value_count(column) as u32 {
                assert_eq!(catalog.value(column, symbol), restored.value(column, symbol));
            }
        }
    }

    #[test]
    fn unknown_key_column_is_an_input_error() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_file(tmp.path(), "records.csv", "id,color\nA,red\n");
        let result = IndexCatalog::build_from_csv(&input, Some("accession"), b',');
        assert!(matches!(result, Err(NetworkError::InputFormat { .. })));
    }
}
