//! Enumeration of all unordered node pairs through a scratch file.
//!
//! Pairs are written in a first pass and read back in batches in a second one,
//! so memory stays linear in the number of nodes no matter how many pairs exist.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::Result;

pub type Pair = (usize, usize);

/// Number of unordered pairs among `n` nodes.
pub fn pair_count(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

/// Splits the rows `0..n` into at most `shards` contiguous ranges holding
/// roughly the same number of pairs each.
pub fn shard_ranges(n: usize, shards: usize) -> Vec<Range<usize>> {
    let total = pair_count(n);
    if total == 0 || shards <= 1 {
        return vec![0..n];
    }
    let target = total.div_ceil(shards as u64);
    let mut ranges = Vec::with_capacity(shards);
    let mut start = 0;
    let mut acc = 0u64;
    for row in 0..n {
        acc += (n - row - 1) as u64;
        if acc >= target {
            ranges.push(start..row + 1);
            start = row + 1;
            acc = 0;
        }
    }
    if start < n {
        ranges.push(start..n);
    }
    ranges
}

pub struct PairEnumerator {
    node_count: usize,
    temp_directory: Option<PathBuf>,
}

impl PairEnumerator {
    pub fn new(node_count: usize, temp_directory: Option<&Path>) -> Self {
        PairEnumerator {
            node_count,
            temp_directory: temp_directory.map(Path::to_path_buf),
        }
    }

    /// Spills every pair of the whole node range.
    pub fn spill_all(&self) -> Result<PairSpill> {
        self.spill(0..self.node_count)
    }

    /// Spills every pair `(a, b)` with `a` in `rows` and `a < b < node_count`.
    ///
    /// Disjoint row ranges produce disjoint pair sets, and the union over
    /// a covering set of ranges is exactly the set of all pairs.
    pub fn spill(&self, rows: Range<usize>) -> Result<PairSpill> {
        let file = match &self.temp_directory {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        let mut writer = BufWriter::new(file);
        let end = rows.end.min(self.node_count);
        let mut len = 0u64;
        for a in rows.start..end {
            for b in (a + 1)..self.node_count {
                writeln!(writer, "{a} {b}")?;
                len += 1;
            }
        }
        let mut file = writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        debug!("spilled {} pairs for rows {}..{}", len, rows.start, end);
        Ok(PairSpill { file, len })
    }
}

/// Pairs written to a scratch file, removed once the spill is dropped.
pub struct PairSpill {
    file: File,
    len: u64,
}

impl PairSpill {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the pairs back in their written order, `batch_size` at a time.
    pub fn batches(self, batch_size: usize) -> PairBatches {
        PairBatches {
            reader: BufReader::new(self.file),
            batch_size: batch_size.max(1),
            line: String::new(),
        }
    }
}

pub struct PairBatches {
    reader: BufReader<File>,
    batch_size: usize,
    line: String,
}

impl PairBatches {
    fn read_pair(&mut self) -> Result<Option<Pair>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        let mut fields = self.line.split_whitespace().map(str::parse::<usize>);
        match (fields.next(), fields.next()) {
            (Some(Ok(a)), Some(Ok(b))) => Ok(Some((a, b))),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("corrupt pair scratch entry {:?}", self.line.trim_end()),
            )
            .into()),
        }
    }
}

impl Iterator for PairBatches {
    type Item = Result<Vec<Pair>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.read_pair() {
                Ok(Some(pair)) => batch.push(pair),
                Ok(None) => break,
                Err(e) => return Some(Err(e)),
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}
