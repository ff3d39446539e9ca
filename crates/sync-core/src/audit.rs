//! Persisted audit artifacts: the table manifest, per-table compressed
//! fingerprint streams and the rollup accumulator.
//!
//! Layout of an audit directory:
//!
//! ```text
//! tables.csv        one line per table: name \t rollup \t row count
//! {table}.csv.gz    gzip, one line per row: encoded key \t checksum
//! schema.json       the schema model, for decoding keys offline
//! ```
//!
//! Fingerprint files are written in ascending key order and must stay
//! byte-stable across runs that will be compared.

use crate::diff::{DiffError, RowFingerprint};
use crate::key::{KeyCodec, KeyError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "tables.csv";
pub const SCHEMA_FILE: &str = "schema.json";

#[derive(Debug, thiserror::Error)]
pub enum AuditFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{path}:{line}: {source}")]
    Key {
        path: PathBuf,
        line: usize,
        #[source]
        source: KeyError,
    },

    #[error(transparent)]
    Diff(#[from] DiffError),
}

impl AuditFileError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| AuditFileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

pub fn schema_path(dir: &Path) -> PathBuf {
    dir.join(SCHEMA_FILE)
}

pub fn table_file(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.csv.gz"))
}

// ============================================================================
// Rollup
// ============================================================================

/// Order-dependent CRC-32C over every key text and checksum of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupAccumulator {
    crc: u32,
    rows: u64,
}

impl RollupAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, key_text: &str, checksum: &str) {
        self.crc = crc32c::crc32c_append(self.crc, key_text.as_bytes());
        self.crc = crc32c::crc32c_append(self.crc, checksum.as_bytes());
        self.rows += 1;
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Rollup rendered as a decimal u32.
    pub fn value(&self) -> String {
        self.crc.to_string()
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub table: String,
    pub rollup: String,
    pub rows: u64,
}

impl ManifestEntry {
    pub fn to_line(&self) -> String {
        format!("{:<48}\t{:>16}\t{:>10}", self.table, self.rollup, self.rows)
    }

    fn parse(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let [table, rollup, rows] = fields.as_slice() else {
            return Err(format!("expected 3 tab-separated fields, got {}", fields.len()));
        };
        if table.is_empty() {
            return Err("empty table name".to_string());
        }
        let rows = rows
            .parse()
            .map_err(|e| format!("invalid row count '{rows}': {e}"))?;
        Ok(Self {
            table: table.to_string(),
            rollup: rollup.to_string(),
            rows,
        })
    }
}

/// Table summaries of one audit run, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.table.clone(), e))
                .collect(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, AuditFileError> {
        let file = File::open(path).map_err(AuditFileError::io(path))?;
        let mut entries = BTreeMap::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(AuditFileError::io(path))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = ManifestEntry::parse(&line).map_err(|reason| AuditFileError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })?;
            entries.insert(entry.table.clone(), entry);
        }
        Ok(Self { entries })
    }

    /// Append one summary line, creating the file if needed.
    pub fn append(path: &Path, entry: &ManifestEntry) -> Result<(), AuditFileError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(AuditFileError::io(path))?;
        writeln!(file, "{}", entry.to_line()).map_err(AuditFileError::io(path))
    }

    pub fn get(&self, table: &str) -> Option<&ManifestEntry> {
        self.entries.get(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Tables present in both manifests whose rollup or row count differ,
    /// sorted by name. Tables present on only one side are not compared.
    pub fn differing_tables<'a>(
        &'a self,
        other: &'a Manifest,
    ) -> Vec<(&'a ManifestEntry, &'a ManifestEntry)> {
        self.entries
            .values()
            .filter_map(|a| other.get(&a.table).map(|b| (a, b)))
            .filter(|(a, b)| a.rollup != b.rollup || a.rows != b.rows)
            .collect()
    }

    /// Tables present in this manifest but not in `other`.
    pub fn missing_from<'a>(&'a self, other: &Manifest) -> Vec<&'a str> {
        self.entries
            .keys()
            .filter(|t| other.get(t).is_none())
            .map(String::as_str)
            .collect()
    }
}

// ============================================================================
// Fingerprint files
// ============================================================================

/// Writes one table's fingerprint stream and accumulates its rollup.
pub struct AuditTableWriter {
    table: String,
    path: PathBuf,
    codec: KeyCodec,
    encoder: GzEncoder<BufWriter<File>>,
    rollup: RollupAccumulator,
}

impl AuditTableWriter {
    pub fn create(dir: &Path, table: &str, codec: KeyCodec) -> Result<Self, AuditFileError> {
        let path = table_file(dir, table);
        let file = File::create(&path).map_err(AuditFileError::io(&path))?;
        Ok(Self {
            table: table.to_string(),
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            path,
            codec,
            rollup: RollupAccumulator::new(),
        })
    }

    pub fn write(&mut self, fingerprint: &RowFingerprint) -> Result<(), AuditFileError> {
        let key_text = self.codec.encode(&fingerprint.key);
        self.rollup.update(&key_text, &fingerprint.checksum);
        writeln!(self.encoder, "{}\t{}", key_text, fingerprint.checksum)
            .map_err(AuditFileError::io(&self.path))
    }

    pub fn rows(&self) -> u64 {
        self.rollup.rows()
    }

    /// Flush the compressed stream and return the manifest line for it.
    pub fn finish(self) -> Result<ManifestEntry, AuditFileError> {
        let mut inner = self
            .encoder
            .finish()
            .map_err(AuditFileError::io(&self.path))?;
        inner.flush().map_err(AuditFileError::io(&self.path))?;
        Ok(ManifestEntry {
            table: self.table,
            rollup: self.rollup.value(),
            rows: self.rollup.rows(),
        })
    }
}

/// Forward-only reader over a persisted fingerprint file.
pub struct FingerprintReader {
    path: PathBuf,
    codec: KeyCodec,
    lines: Lines<BufReader<GzDecoder<File>>>,
    line_no: usize,
}

impl FingerprintReader {
    pub fn open(dir: &Path, table: &str, codec: KeyCodec) -> Result<Self, AuditFileError> {
        Self::open_path(&table_file(dir, table), codec)
    }

    pub fn open_path(path: &Path, codec: KeyCodec) -> Result<Self, AuditFileError> {
        let file = File::open(path).map_err(AuditFileError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            codec,
            lines: BufReader::new(GzDecoder::new(file)).lines(),
            line_no: 0,
        })
    }

    fn parse(&self, line: &str) -> Result<RowFingerprint, AuditFileError> {
        let (key_text, checksum) =
            line.split_once('\t')
                .ok_or_else(|| AuditFileError::Malformed {
                    path: self.path.clone(),
                    line: self.line_no,
                    reason: "missing tab separator".to_string(),
                })?;
        let key = self
            .codec
            .decode(key_text)
            .map_err(|source| AuditFileError::Key {
                path: self.path.clone(),
                line: self.line_no,
                source,
            })?;
        Ok(RowFingerprint::new(key, checksum))
    }
}

impl Iterator for FingerprintReader {
    type Item = Result<RowFingerprint, AuditFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(AuditFileError::io(&self.path)(e))),
            };
            self.line_no += 1;
            if line.is_empty() {
                continue;
            }
            return Some(self.parse(&line));
        }
    }
}

/// Create the audit directory, removing a stale manifest from a prior run.
pub fn prepare_dir(dir: &Path) -> Result<(), AuditFileError> {
    fs::create_dir_all(dir).map_err(AuditFileError::io(dir))?;
    let manifest = manifest_path(dir);
    if manifest.exists() {
        fs::remove_file(&manifest).map_err(AuditFileError::io(&manifest))?;
    }
    Ok(())
}
