//! Ownership of per-run working directories.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};

use crate::errors::{NetworkError, Result};

/// Marker file naming the run that owns a directory.
pub const RUN_MARKER: &str = "run.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RunMarker {
    run_id: String,
    started: u64,
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// A fresh run id: the start time plus a random suffix.
pub fn new_run_id() -> String {
    format!("{}_{:08x}", unix_seconds(), thread_rng().r#gen::<u32>())
}

/// Creates a new, uniquely named `network_<run id>` directory below `base`.
pub fn allocate_run_directory<P: AsRef<Path>>(base: P) -> Result<PathBuf> {
    std::fs::create_dir_all(base.as_ref())?;
    loop {
        let candidate = base.as_ref().join(format!("network_{}", new_run_id()));
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// A working directory claimed by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    pub path: PathBuf,
    pub run_id: String,
    /// Set when an earlier run with the same id is continued.
    pub resumed: bool,
}

impl RunDirectory {
    /// Claims `path` for a new run, or for continuing the run `resume`.
    ///
    /// A directory already holding files of another run (or files without a
    /// run marker) is a [`NetworkError::WorkingDirectoryConflict`].
    pub fn claim<P: AsRef<Path>>(path: P, resume: Option<&str>) -> Result<RunDirectory> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let marker_path = path.join(RUN_MARKER);

        if marker_path.is_file() {
            let marker: RunMarker = serde_json::from_slice(&std::fs::read(&marker_path)?)?;
            return match resume {
                Some(run_id) if run_id == marker.run_id => {
                    info!("resuming run {} in {}", run_id, path.display());
                    Ok(RunDirectory {
                        path,
                        run_id: marker.run_id,
                        resumed: true,
                    })
                }
                _ => Err(NetworkError::WorkingDirectoryConflict(path)),
            };
        }
        if std::fs::read_dir(&path)?.next().is_some() {
            return Err(NetworkError::WorkingDirectoryConflict(path));
        }

        let marker = RunMarker {
            run_id: resume.map_or_else(new_run_id, str::to_string),
            started: unix_seconds(),
        };
        // create_new makes two runs racing for the same directory fail here
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(NetworkError::WorkingDirectoryConflict(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&serde_json::to_vec(&marker)?)?;
        info!("run {} owns {}", marker.run_id, path.display());
        Ok(RunDirectory {
            path,
            run_id: marker.run_id,
            resumed: false,
        })
    }
}
