//! Types persisted in the progress file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of one unit of work (an account name).
pub type Identifier = String;

/// Per-identifier result. `Saved` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Saved,
    Failed(String),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Saved => "saved",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Identifier → outcome map plus aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub outcomes: BTreeMap<Identifier, Outcome>,
    #[serde(default)]
    pub saved_count: u64,
    #[serde(default)]
    pub failed_count: u64,
}

/// Result of applying an outcome to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Changed,
    AlreadyFinal,
}

impl ProgressRecord {
    pub fn is_done(&self, id: &str) -> bool {
        self.outcomes.get(id).is_some_and(Outcome::is_terminal)
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.outcomes.get(id)
    }

    /// Number of identifiers with a terminal outcome.
    pub fn finalized(&self) -> u64 {
        self.saved_count + self.failed_count
    }

    /// Apply `outcome` unless `id` already has a terminal one. Counters move only
    /// on the transition into a terminal state.
    pub(crate) fn apply(&mut self, id: &str, outcome: Outcome) -> Applied {
        if self.is_done(id) {
            return Applied::AlreadyFinal;
        }
        match &outcome {
            Outcome::Saved => self.saved_count += 1,
            Outcome::Failed(_) => self.failed_count += 1,
            Outcome::Pending => {}
        }
        self.outcomes.insert(id.to_string(), outcome);
        Applied::Changed
    }

    /// Recompute counters from the map. Returns true if they were off.
    pub(crate) fn recount(&mut self) -> bool {
        let saved = self
            .outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Saved))
            .count() as u64;
        let failed = self
            .outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Failed(_)))
            .count() as u64;
        let changed = saved != self.saved_count || failed != self.failed_count;
        self.saved_count = saved;
        self.failed_count = failed;
        changed
    }
}

/// On-disk shapes accepted by `ProgressStore::load`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum ProgressFile {
    Current(ProgressRecord),
    /// `{"done": {"alice": true, "bob": "failed"}}` as written by the older script.
    Legacy {
        done: BTreeMap<Identifier, serde_json::Value>,
    },
}

impl ProgressFile {
    pub(crate) fn into_record(self) -> ProgressRecord {
        match self {
            ProgressFile::Current(record) => record,
            ProgressFile::Legacy { done } => {
                let mut record = ProgressRecord::default();
                for (id, value) in done {
                    let outcome = match value {
                        serde_json::Value::Bool(true) => Outcome::Saved,
                        serde_json::Value::String(s) if s == "failed" => {
                            Outcome::Failed("unknown".to_string())
                        }
                        other => {
                            tracing::warn!(id = %id, value = %other, "ignoring unrecognised legacy progress entry");
                            continue;
                        }
                    };
                    record.apply(&id, outcome);
                }
                record
            }
        }
    }
}
