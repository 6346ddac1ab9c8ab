// src/scheduler/queue.rs

//! Parsers for `condor_q` output.
//!
//! All functions here are pure: they take the raw bytes a query printed and
//! return structured values, with no state kept between calls.

/// Attribute holding HTCondor's numeric job id.
pub const CLUSTER_ID_KEY: &str = "ClusterId";
/// Custom attribute every submission carries with its invocation id.
pub const INVOCATION_ID_KEY: &str = "IpcUuid";
pub const STATUS_KEY: &str = "JobStatus";
/// `JobStatus` value of a held job.
pub const HELD_STATUS: &str = "5";

const RECORD_SEPARATOR: &str = "\n\n";
const FIELD_SEPARATOR: &str = " = ";

/// One job record of a `condor_q -long` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEntry {
    pub cluster_id: String,
    pub invocation_id: String,
    pub held: bool,
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '"' || c == ' ')
        .to_string()
}

fn parse_record(record: &str) -> QueueEntry {
    let mut entry = QueueEntry::default();
    for line in record.lines() {
        let Some((key, value)) = line.split_once(FIELD_SEPARATOR) else {
            continue;
        };
        match key {
            CLUSTER_ID_KEY => entry.cluster_id = value.trim().to_string(),
            INVOCATION_ID_KEY => entry.invocation_id = unquote(value),
            STATUS_KEY => entry.held = value.trim() == HELD_STATUS,
            _ => {}
        }
    }
    entry
}

/// Parse a `condor_q -long` listing: records separated by a blank line, one
/// `Key = Value` attribute per line.
///
/// Records missing an attribute get the empty/`false` default for it.
/// Blank records (e.g. trailing newlines) are skipped.
pub fn parse_queue_entries(output: &[u8]) -> Vec<QueueEntry> {
    let text = String::from_utf8_lossy(output);
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .map(parse_record)
        .collect()
}

pub fn queue_entries_by_invocation_id(output: &[u8], invocation_id: &str) -> Vec<QueueEntry> {
    parse_queue_entries(output)
        .into_iter()
        .filter(|e| e.invocation_id == invocation_id)
        .collect()
}

pub fn held_queue_entries(output: &[u8]) -> Vec<QueueEntry> {
    parse_queue_entries(output)
        .into_iter()
        .filter(|e| e.held)
        .collect()
}

/// Invocation ids of the held records, in listing order. Held records without
/// an id are left out since nothing can be done with them.
pub fn held_queue_invocation_ids(output: &[u8]) -> Vec<String> {
    held_queue_entries(output)
        .into_iter()
        .filter(|e| !e.invocation_id.is_empty())
        .map(|e| e.invocation_id)
        .collect()
}

/// Parse the output of `condor_q -format "%s\n" IpcUuid`: one id per line,
/// blank lines dropped.
pub fn parse_invocation_id_listing(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(unquote)
        .filter(|id| !id.is_empty())
        .collect()
}
