//! Sorted-stream differ.
//!
//! Merges two ascending `(key, checksum)` streams with one cursor per side
//! and classifies every key seen on either side. Only the current head of
//! each stream is held in memory. An exhausted cursor reports
//! [`RowKey::Max`] as its head, so the merge loop is a plain three-way
//! comparison until both heads are the sentinel.

use crate::key::RowKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

static SENTINEL: RowKey = RowKey::Max;

/// Per-row fingerprint: primary key plus opaque row checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFingerprint {
    pub key: RowKey,
    pub checksum: String,
}

impl RowFingerprint {
    pub fn new(key: RowKey, checksum: impl Into<String>) -> Self {
        Self {
            key,
            checksum: checksum.into(),
        }
    }
}

/// Classification of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffVerdict {
    /// Present only in A (the source)
    Insert,
    /// Present only in B (the destination)
    Delete,
    /// Present in both with different checksums
    Update,
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub key: RowKey,
    pub verdict: DiffVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DiffError {
    #[error("stream {side} is not ascending: {next} follows {previous}")]
    Unsorted {
        side: Side,
        previous: RowKey,
        next: RowKey,
    },
}

/// Count and key range of the keys found on one side only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRun {
    pub count: u64,
    pub min: Option<RowKey>,
    pub max: Option<RowKey>,
}

impl KeyRun {
    fn record(&mut self, key: &RowKey) {
        self.count += 1;
        // Keys arrive ascending, so the first is the minimum and the last the maximum.
        if self.min.is_none() {
            self.min = Some(key.clone());
        }
        self.max = Some(key.clone());
    }
}

/// How the one-sided keys of a stream relate to the other stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    None,
    /// Every one-sided key is beyond the other side's maximum: trailing growth
    PureGrowth,
    /// One-sided keys fall inside the other side's key range
    Interleaved,
}

/// Counters gathered during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub only_in_a: KeyRun,
    pub only_in_b: KeyRun,
    pub changed: u64,
    pub equal: u64,
    /// Largest key observed in A
    pub max_a: Option<RowKey>,
    /// Largest key observed in B
    pub max_b: Option<RowKey>,
}

impl DiffSummary {
    pub fn is_clean(&self) -> bool {
        self.only_in_a.count == 0 && self.only_in_b.count == 0 && self.changed == 0
    }

    pub fn divergence(&self, side: Side) -> Divergence {
        let (run, other_max) = match side {
            Side::A => (&self.only_in_a, &self.max_b),
            Side::B => (&self.only_in_b, &self.max_a),
        };
        match (&run.min, other_max) {
            (None, _) => Divergence::None,
            (Some(_), None) => Divergence::PureGrowth,
            (Some(min), Some(other)) if min > other => Divergence::PureGrowth,
            _ => Divergence::Interleaved,
        }
    }
}

struct Cursor<I> {
    iter: I,
    side: Side,
    head: Option<RowFingerprint>,
    last: Option<RowKey>,
}

impl<I, E> Cursor<I>
where
    I: Iterator<Item = Result<RowFingerprint, E>>,
    E: From<DiffError>,
{
    fn new(iter: I, side: Side) -> Self {
        Self {
            iter,
            side,
            head: None,
            last: None,
        }
    }

    fn head_key(&self) -> &RowKey {
        self.head.as_ref().map(|h| &h.key).unwrap_or(&SENTINEL)
    }

    fn advance(&mut self) -> Result<(), E> {
        self.head = match self.iter.next() {
            None => None,
            Some(Err(e)) => return Err(e),
            Some(Ok(fp)) => {
                if let Some(previous) = &self.last {
                    if fp.key <= *previous {
                        return Err(DiffError::Unsorted {
                            side: self.side,
                            previous: previous.clone(),
                            next: fp.key,
                        }
                        .into());
                    }
                }
                self.last = Some(fp.key.clone());
                Some(fp)
            }
        };
        Ok(())
    }
}

/// Lazy merge of two ascending fingerprint streams.
///
/// Yields one [`DiffEntry`] per distinct key, including `Equal` ones.
/// After the iterator returns `None`, [`MergeDiff::summary`] holds the
/// final counters. The first error ends the iteration.
pub struct MergeDiff<A, B> {
    a: Cursor<A>,
    b: Cursor<B>,
    primed: bool,
    done: bool,
    summary: DiffSummary,
}

impl<A, B, E> MergeDiff<A, B>
where
    A: Iterator<Item = Result<RowFingerprint, E>>,
    B: Iterator<Item = Result<RowFingerprint, E>>,
    E: From<DiffError>,
{
    pub fn new(a: A, b: B) -> Self {
        Self {
            a: Cursor::new(a, Side::A),
            b: Cursor::new(b, Side::B),
            primed: false,
            done: false,
            summary: DiffSummary::default(),
        }
    }

    pub fn summary(&self) -> &DiffSummary {
        &self.summary
    }

    pub fn into_summary(self) -> DiffSummary {
        self.summary
    }

    fn step(&mut self) -> Result<Option<DiffEntry>, E> {
        if !self.primed {
            self.a.advance()?;
            self.b.advance()?;
            self.primed = true;
        }
        if self.a.head.is_none() && self.b.head.is_none() {
            return Ok(None);
        }
        let entry = match self.a.head_key().cmp(self.b.head_key()) {
            Ordering::Less => {
                let key = self.a.head_key().clone();
                self.summary.only_in_a.record(&key);
                self.summary.max_a = Some(key.clone());
                self.a.advance()?;
                DiffEntry {
                    key,
                    verdict: DiffVerdict::Insert,
                }
            }
            Ordering::Greater => {
                let key = self.b.head_key().clone();
                self.summary.only_in_b.record(&key);
                self.summary.max_b = Some(key.clone());
                self.b.advance()?;
                DiffEntry {
                    key,
                    verdict: DiffVerdict::Delete,
                }
            }
            // Equal heads are both real keys: the sentinel only matches itself.
            Ordering::Equal => {
                let key = self.a.head_key().clone();
                let same = self.a.head.as_ref().map(|h| &h.checksum)
                    == self.b.head.as_ref().map(|h| &h.checksum);
                let verdict = if same {
                    self.summary.equal += 1;
                    DiffVerdict::Equal
                } else {
                    self.summary.changed += 1;
                    DiffVerdict::Update
                };
                self.summary.max_a = Some(key.clone());
                self.summary.max_b = Some(key.clone());
                self.a.advance()?;
                self.b.advance()?;
                DiffEntry { key, verdict }
            }
        };
        Ok(Some(entry))
    }
}

impl<A, B, E> Iterator for MergeDiff<A, B>
where
    A: Iterator<Item = Result<RowFingerprint, E>>,
    B: Iterator<Item = Result<RowFingerprint, E>>,
    E: From<DiffError>,
{
    type Item = Result<DiffEntry, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Diff two in-memory ascending lists, returning every verdict and the summary.
pub fn diff_sorted(
    a: &[RowFingerprint],
    b: &[RowFingerprint],
) -> Result<(Vec<DiffEntry>, DiffSummary), DiffError> {
    let mut merge = MergeDiff::new(
        a.iter().cloned().map(Ok::<_, DiffError>),
        b.iter().cloned().map(Ok::<_, DiffError>),
    );
    let entries = merge.by_ref().collect::<Result<Vec<_>, _>>()?;
    Ok((entries, merge.into_summary()))
}
