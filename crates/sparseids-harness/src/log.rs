//! Replay transcripts and test logging.
//!
//! A [`Transcript`] is the ordered record of one scenario replay: every
//! published slice update, every query answer, every rejected call, and a
//! closing stats snapshot. It is written as JSON lines, one entry per line,
//! so two replays can be compared with a plain diff.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sparseids_index::{IndexStats, OwnedSliceUpdate, SparseIdsQuery, SparseIdsResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{HarnessError, Result};

/// Version of the transcript line format.
pub const TRANSCRIPT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Start {
        schema_version: u32,
        scenario: String,
    },
    Update {
        step: usize,
        update: OwnedSliceUpdate,
    },
    Query {
        step: usize,
        query: SparseIdsQuery,
        result: SparseIdsResult,
    },
    Rejected {
        step: usize,
        reason_code: String,
        message: String,
    },
    Finish {
        steps: usize,
        stats: IndexStats,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new(scenario: &str) -> Self {
        Self {
            entries: vec![TranscriptEntry::Start {
                schema_version: TRANSCRIPT_SCHEMA_VERSION,
                scenario: scenario.to_owned(),
            }],
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Published updates in order, with the step that produced them.
    pub fn updates(&self) -> impl Iterator<Item = (usize, &OwnedSliceUpdate)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            TranscriptEntry::Update { step, update } => Some((*step, update)),
            _ => None,
        })
    }

    /// Query answers in order, with the step that asked them.
    pub fn query_results(&self) -> impl Iterator<Item = (usize, &SparseIdsResult)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            TranscriptEntry::Query { step, result, .. } => Some((*step, result)),
            _ => None,
        })
    }

    /// Whether the replay ran to completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.entries.last(), Some(TranscriptEntry::Finish { .. }))
    }

    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).map_err(|err| HarnessError::io(path, err))?;
        let mut out = BufWriter::new(file);
        for entry in &self.entries {
            serde_json::to_writer(&mut out, entry)?;
            out.write_all(b"\n")
                .map_err(|err| HarnessError::io(path, err))?;
        }
        out.flush().map_err(|err| HarnessError::io(path, err))?;
        info!(
            path = %path.display(),
            entries = self.entries.len(),
            "replay transcript written"
        );
        Ok(())
    }

    pub fn read_jsonl(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| HarnessError::io(path, err))?;
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|source| HarnessError::TranscriptLine {
                    line: index + 1,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

/// Install a fmt subscriber writing through the test harness capture.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test:
/// only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparseids_index::{MsgId, MsgRange, SliceUpdateKind};

    #[test]
    fn entries_are_tagged_by_kind() {
        let entry = TranscriptEntry::Update {
            step: 2,
            update: OwnedSliceUpdate {
                kind: SliceUpdateKind::Merged,
                members: [MsgId::new(5)].into_iter().collect(),
                range: MsgRange::raw(0, 10),
                count: Some(1),
            },
        };
        let line = serde_json::to_string(&entry).expect("encode");
        assert!(line.starts_with(r#"{"entry":"update","step":2"#), "{line}");
        let back: TranscriptEntry = serde_json::from_str(&line).expect("decode");
        assert_eq!(back, entry);
    }

    #[test]
    fn filters_pick_their_entries() {
        let mut transcript = Transcript::new("filters");
        transcript.push(TranscriptEntry::Query {
            step: 0,
            query: SparseIdsQuery::newest(3),
            result: SparseIdsResult::default(),
        });
        transcript.push(TranscriptEntry::Rejected {
            step: 1,
            reason_code: "invalid_range".to_owned(),
            message: "bad".to_owned(),
        });
        assert_eq!(transcript.updates().count(), 0);
        assert_eq!(transcript.query_results().count(), 1);
        assert!(!transcript.is_finished());
    }
}
