use std::io;
use std::path::Path;

use log::info;

use crate::catalog::IndexCatalog;
use crate::errors::{NetworkError, Result};
use crate::types::{Dataset, Key, Node};

/// Values treated as "no value" by the file loader, compared case-insensitively
/// after trimming.
pub const MISSING_VALUES: &[&str] = &[
    "",
    "-",
    "--",
    "missing",
    "#n/a",
    "n/a",
    "na",
    "none",
    "not applicable",
    "not apply",
    "not available",
    "not collected",
    "not described",
    "not provided",
    "not recorded",
    "unknown",
    "unkown",
];

pub fn is_missing(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    MISSING_VALUES.contains(&value.as_str())
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    /// Name of the identifier column, the first column when unset.
    pub key_column: Option<&'a str>,
    pub delimiter: u8,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        LoadOptions {
            key_column: None,
            delimiter: b',',
        }
    }
}

pub(crate) fn row_error(e: csv::Error) -> NetworkError {
    if e.is_io_error() {
        return NetworkError::Csv(e);
    }
    let line = e.position().map_or(0, |p| p.line());
    NetworkError::input_format(line, e.to_string())
}

/// Maps header names and cell contents to dataset keys.
trait Encoder<T> {
    fn column(&self, name: &str) -> Result<T>;

    fn value(&self, column: &T, value: &str, line: u64) -> Result<T>;
}

struct Plain;

impl Encoder<String> for Plain {
    fn column(&self, name: &str) -> Result<String> {
        Ok(name.to_string())
    }

    fn value(&self, _column: &String, value: &str, _line: u64) -> Result<String> {
        Ok(value.to_string())
    }
}

struct Encoded<'a>(&'a IndexCatalog);

impl Encoder<u32> for Encoded<'_> {
    fn column(&self, name: &str) -> Result<u32> {
        self.0.column_symbol(name).ok_or_else(|| {
            NetworkError::input_format(1, format!("column {name:?} is missing from the index"))
        })
    }

    fn value(&self, column: &u32, value: &str, line: u64) -> Result<u32> {
        self.0.value_symbol(*column, value).ok_or_else(|| {
            NetworkError::input_format(line, format!("value {value:?} is missing from the index"))
        })
    }
}

fn read_dataset<R, T, E>(reader: R, options: &LoadOptions, encoder: &E) -> Result<Dataset<T>>
where
    R: io::Read,
    T: Key,
    E: Encoder<T>,
{
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .from_reader(reader);
    let header = reader.headers().map_err(row_error)?.clone();
    if header.is_empty() || header.iter().all(str::is_empty) {
        return Err(NetworkError::input_format(1, "header row is empty"));
    }
    for (i, name) in header.iter().enumerate() {
        if header.iter().skip(i + 1).any(|other| other == name) {
            return Err(NetworkError::input_format(
                1,
                format!("column {name:?} appears twice"),
            ));
        }
    }
    let key_index = match options.key_column {
        Some(key) => header.iter().position(|name| name == key).ok_or_else(|| {
            NetworkError::input_format(1, format!("key column {key:?} not found in header"))
        })?,
        None => 0,
    };

    let columns: Vec<T> = header
        .iter()
        .map(|name| encoder.column(name))
        .collect::<Result<_>>()?;
    let key_column = columns[key_index].clone();

    let mut nodes = Vec::new();
    for record in reader.records() {
        let record = record.map_err(row_error)?;
        let line = record.position().map_or(0, |p| p.line());
        let id = record.get(key_index).unwrap_or_default();
        if id.trim().is_empty() {
            return Err(NetworkError::input_format(line, "record has no identifier"));
        }
        let mut node = Node::new(encoder.value(&key_column, id, line)?);
        for (i, value) in record.iter().enumerate() {
            if i == key_index || is_missing(value) {
                continue;
            }
            node.insert(columns[i].clone(), encoder.value(&columns[i], value, line)?);
        }
        nodes.push(node);
    }

    let rows = nodes.len();
    let mut eligible = columns;
    eligible.remove(key_index);
    let dataset = Dataset::new(eligible, nodes)?;
    info!(
        "loaded {} rows into {} nodes with {} eligible columns",
        rows,
        dataset.len(),
        dataset.columns().len()
    );
    Ok(dataset)
}

/// Name of the identifier column of a delimited file: `options.key_column`
/// when it is present in the header, the first header column otherwise.
pub fn key_column_name<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .from_path(path.as_ref())?;
    let header = reader.headers().map_err(row_error)?;
    let name = match options.key_column {
        Some(key) => header.iter().find(|name| *name == key).ok_or_else(|| {
            NetworkError::input_format(1, format!("key column {key:?} not found in header"))
        })?,
        None => header
            .get(0)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| NetworkError::input_format(1, "header row is empty"))?,
    };
    Ok(name.to_string())
}

/// Loads a delimited file with a header row into a dataset keyed by strings.
pub fn load_csv<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Dataset<String>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_dataset(io::BufReader::new(file), options, &Plain)
}

/// Like [`load_csv`] but encodes every identifier with the catalog.
pub fn load_csv_encoded<P: AsRef<Path>>(
    path: P,
    catalog: &IndexCatalog,
    options: &LoadOptions,
) -> Result<Dataset<u32>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_dataset(io::BufReader::new(file), options, &Encoded(catalog))
}

/// Loads delimited records from any reader.
pub fn load_reader<R: io::Read>(reader: R, options: &LoadOptions) -> Result<Dataset<String>> {
    read_dataset(reader, options, &Plain)
}
