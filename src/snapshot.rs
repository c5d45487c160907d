//! # Versioned run snapshots
//!
//! A sampling run can take hours, so its results are checkpointed to disk. A [`Snapshot`] is a
//! plain data record (configuration plus every per-galaxy result) serialized to JSON; it holds
//! no live objects such as the prior model, the flux provider or a progress bar. Loading
//! checks the format version and refuses snapshots written by another one.
//!
//! ```text
//! Snapshot
//! ├── version : u32
//! ├── config  : Configuration
//! └── results : galaxy index → (num_components → SampleResult)
//! ```
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    blendfit_errors::BlendfitError, config::Configuration, constants::SNAPSHOT_VERSION,
    photoz::SampleResult,
};

/// Per-galaxy results, keyed by galaxy index then by number of components.
pub type ResultTable = BTreeMap<usize, BTreeMap<usize, SampleResult>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub config: Configuration,
    pub results: ResultTable,
}

impl Snapshot {
    pub fn new(config: Configuration, results: ResultTable) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            config,
            results,
        }
    }

    /// Write the snapshot as JSON, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BlendfitError> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        tracing::info!(
            path = %path.as_ref().display(),
            galaxies = self.results.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Read a snapshot written by [`Snapshot::save`].
    ///
    /// Return
    /// ----------
    /// * [`BlendfitError::SnapshotVersion`] if the file was written with another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BlendfitError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(BlendfitError::SnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}
