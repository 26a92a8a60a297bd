//! Random record files for demos and load tests.

use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use rand::thread_rng;
use rayon::prelude::*;

use crate::errors::Result;

/// Attribute columns and the vocabulary each one draws from.
pub struct RecordGenerator {
    columns: Vec<(&'static str, Vec<&'static str>)>,
    /// Chance that a cell is left empty.
    missing_rate: f64,
}

impl Default for RecordGenerator {
    fn default() -> Self {
        RecordGenerator {
            columns: vec![
                (
                    "organism",
                    vec!["homo sapiens", "mus musculus", "danio rerio", "gallus gallus"],
                ),
                (
                    "tissue",
                    vec!["liver", "brain", "blood", "skin", "lung", "kidney", "heart"],
                ),
                (
                    "country",
                    vec!["brazil", "germany", "japan", "kenya", "canada", "india"],
                ),
                (
                    "platform",
                    vec!["illumina", "nanopore", "pacbio", "ion torrent"],
                ),
            ],
            missing_rate: 0.6,
        }
    }
}

impl RecordGenerator {
    pub fn new(columns: Vec<(&'static str, Vec<&'static str>)>, missing_rate: f64) -> Self {
        RecordGenerator {
            columns,
            missing_rate: missing_rate.clamp(0.0, 1.0),
        }
    }

    pub fn header(&self) -> Vec<&'static str> {
        std::iter::once("id")
            .chain(self.columns.iter().map(|(name, _)| *name))
            .collect()
    }

    // Parallel generation, one row per record
    pub fn generate_batch(&self, count: usize) -> Vec<Vec<String>> {
        (0..count)
            .into_par_iter()
            .map_init(thread_rng, |rng, i| {
                let mut row = Vec::with_capacity(self.columns.len() + 1);
                row.push(format!("sample{i:06}"));
                for (_, vocabulary) in &self.columns {
                    let value = if rng.gen_bool(self.missing_rate) {
                        None
                    } else {
                        vocabulary.choose(rng)
                    };
                    row.push(value.map_or_else(String::new, |v| v.to_string()));
                }
                row
            })
            .collect()
    }
}

pub fn generate_records_csv<P: AsRef<Path>>(num_records: usize, filename: P) -> Result<()> {
    let generator = RecordGenerator::default();
    let mut writer = csv::Writer::from_path(filename.as_ref())?;
    writer.write_record(generator.header())?;
    for row in generator.generate_batch(num_records) {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
