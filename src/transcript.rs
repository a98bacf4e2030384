//! Merged-transcript aggregation over both recognizer streams.
//!
//! One [`Aggregator`] per session folds local and remote utterance events
//! into a single ordered line table. Lines are keyed by (source, segment_id)
//! and kept in first-seen order so interim updates rewrite a line in place
//! instead of jumping position. Event application takes a plain mutex held
//! only for the table update, so either producer may call it from its own
//! delivery context without awaiting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TranscriptConfig;
use crate::error::Error;
use crate::models::{TranscriptLine, UtteranceEvent, UtteranceSource};

struct LineState {
    line_id: String,
    text: String,
    is_final: bool,
    last_updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct LineTable {
    /// Insertion order of keys; the snapshot order.
    order: Vec<(UtteranceSource, String)>,
    lines: HashMap<(UtteranceSource, String), LineState>,
    duplicate_finals: u64,
}

/// Per-session transcript state machine.
///
/// A line is open while only non-final events have arrived and closed by the
/// first final event for its key. Text is last-writer-wins on every applied
/// event; events arriving for a closed line are counted and dropped.
pub struct Aggregator {
    local_label: String,
    remote_label: String,
    table: Mutex<LineTable>,
}

impl Aggregator {
    pub fn new(config: &TranscriptConfig) -> Self {
        Aggregator {
            local_label: config.local_label.clone(),
            remote_label: config.remote_label.clone(),
            table: Mutex::new(LineTable::default()),
        }
    }

    /// Apply one recognizer event. Never fails; anomalies are recorded on a
    /// diagnostic counter instead of propagating.
    pub fn apply(&self, event: &UtteranceEvent) {
        let record = event.record();
        let key = (record.source, record.segment_id.clone());

        let mut table = self.table.lock();
        if let Some(state) = table.lines.get_mut(&key) {
            if state.is_final {
                table.duplicate_finals += 1;
                let anomaly = Error::DuplicateFinalEvent {
                    source_name: record.source.as_str().to_string(),
                    segment_id: record.segment_id.clone(),
                };
                warn!(count = table.duplicate_finals, "{anomaly}");
                return;
            }
            state.text = record.text.clone();
            state.is_final = event.is_final();
            state.last_updated_at = record.emitted_at;
            return;
        }

        // Unseen key: a final event creates the line already closed, the way
        // single-shot recognizers deliver whole utterances.
        debug!(
            source = record.source.as_str(),
            segment_id = %record.segment_id,
            is_final = event.is_final(),
            "transcript line opened"
        );
        table.lines.insert(
            key.clone(),
            LineState {
                line_id: Uuid::new_v4().to_string(),
                text: record.text.clone(),
                is_final: event.is_final(),
                last_updated_at: record.emitted_at,
            },
        );
        table.order.push(key);
    }

    /// Ordered snapshot of the transcript at the moment of the call.
    pub fn snapshot(&self) -> Vec<TranscriptLine> {
        let table = self.table.lock();
        table
            .order
            .iter()
            .filter_map(|key| {
                let state = table.lines.get(key)?;
                Some(TranscriptLine {
                    line_id: state.line_id.clone(),
                    speaker_label: self.label_for(key.0).to_string(),
                    text: state.text.clone(),
                    is_final: state.is_final,
                    last_updated_at: state.last_updated_at,
                })
            })
            .collect()
    }

    /// Events ignored because their line was already closed.
    pub fn duplicate_final_count(&self) -> u64 {
        self.table.lock().duplicate_finals
    }

    pub fn line_count(&self) -> usize {
        self.table.lock().order.len()
    }

    fn label_for(&self, source: UtteranceSource) -> &str {
        match source {
            UtteranceSource::Local => &self.local_label,
            UtteranceSource::Remote => &self.remote_label,
        }
    }
}
