use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::feed::event::EventRecord;

/// Label substituted for any missing or unparseable grouping field.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Display text for the latest-event timestamp of an empty snapshot.
pub const NOT_AVAILABLE: &str = "not available";

/// The top-commands table keeps this many entries.
const TOP_COMMAND_LIMIT: usize = 10;

/// One day bucket of the attacks-over-time histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub day: String,
    pub count: u64,
}

/// One entry of the command frequency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandCount {
    pub command: String,
    pub count: u64,
}

/// One slice of the source-IP distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSlice {
    pub name: String,
    pub value: u64,
}

/// The four derived views consumed by the rendering layer.
///
/// Serializes with the member names the charts bind to, so the JSON can be
/// handed to the dashboard as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedViews {
    pub total_count: u64,
    pub unique_source_count: u64,
    pub latest_timestamp_display: String,
    pub daily_histogram: Vec<DayCount>,
    pub top_commands: Vec<CommandCount>,
    pub ip_distribution: Vec<SourceSlice>,
}

/// Counter map that preserves first-insertion order of its keys.
///
/// Grouped views must list keys in the order they were first encountered
/// while scanning the snapshot front-to-back, so the ordering is held
/// explicitly (slot index per key) instead of leaning on any incidental
/// iteration order of a hash map.
struct FirstSeenCounter {
    slots: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl FirstSeenCounter {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn bump(&mut self, key: &str) {
        if let Some(&slot) = self.slots.get(key) {
            self.entries[slot].1 += 1;
            return;
        }

        self.slots.insert(key.to_string(), self.entries.len());
        self.entries.push((key.to_string(), 1));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<(String, u64)> {
        self.entries
    }
}

/// Derives the four views from a snapshot in one front-to-back scan.
///
/// Pure and total: no I/O, identical snapshots always yield identical
/// views, and malformed records fall into the `"Unknown"` buckets instead
/// of failing. O(n) time, O(k) space for k distinct group keys.
pub fn derive(snapshot: &[EventRecord]) -> DerivedViews {
    let mut days = FirstSeenCounter::new();
    let mut commands = FirstSeenCounter::new();
    let mut sources = FirstSeenCounter::new();

    for event in snapshot {
        days.bump(day_key(event));
        commands.bump(field_key(&event.command));
        sources.bump(field_key(&event.src_ip));
    }

    let unique_source_count = sources.len() as u64;

    let daily_histogram = days
        .into_entries()
        .into_iter()
        .map(|(day, count)| DayCount { day, count })
        .collect();

    // Truncation is positional over first-seen order, matching the
    // dashboard this feed was built for, not a count ranking.
    let top_commands = commands
        .into_entries()
        .into_iter()
        .take(TOP_COMMAND_LIMIT)
        .map(|(command, count)| CommandCount { command, count })
        .collect();

    let ip_distribution = sources
        .into_entries()
        .into_iter()
        .map(|(name, value)| SourceSlice { name, value })
        .collect();

    DerivedViews {
        total_count: snapshot.len() as u64,
        unique_source_count,
        latest_timestamp_display: latest_timestamp_display(snapshot),
        daily_histogram,
        top_commands,
        ip_distribution,
    }
}

/// Day bucket key: the text before the first time separator, so equal raw
/// timestamps always land in the same bucket even when malformed.
fn day_key(event: &EventRecord) -> &str {
    match event.timestamp.as_deref() {
        Some(ts) => ts.split('T').next().unwrap_or(ts),
        None => UNKNOWN_LABEL,
    }
}

/// Grouping key for an optional raw field. Absent maps to the shared
/// `"Unknown"` bucket; any present value, including the empty string,
/// groups by raw equality.
fn field_key(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(UNKNOWN_LABEL)
}

/// Human-readable rendering of the newest event's timestamp.
fn latest_timestamp_display(snapshot: &[EventRecord]) -> String {
    let Some(event) = snapshot.first() else {
        return NOT_AVAILABLE.to_string();
    };

    let Some(ts) = event.timestamp.as_deref() else {
        return UNKNOWN_LABEL.to_string();
    };

    match DateTime::parse_from_rfc3339(ts) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        Err(_) => UNKNOWN_LABEL.to_string(),
    }
}
