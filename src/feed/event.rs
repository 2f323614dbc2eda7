use serde::{Deserialize, Serialize};

/// One normalized honeypot observation from the event feed.
///
/// The collector accepts partially-filled submissions, so every payload
/// field is optional. Records are immutable once received; a refresh
/// replaces the whole snapshot rather than merging into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRecord {
    /// Opaque unique identifier, stable across refreshes.
    pub id: String,

    /// ISO-8601 date-time text. May be absent or malformed; never rejected.
    pub timestamp: Option<String>,

    /// Honeypot session the record belongs to.
    pub session_id: Option<String>,

    /// Originating address as reported by the sensor.
    pub src_ip: Option<String>,

    /// Originating port.
    pub src_port: Option<u16>,

    /// Service the attacker hit (e.g. "ssh").
    pub dest_service: Option<String>,

    /// Login name attempted, if any.
    pub username: Option<String>,

    /// Command or action observed.
    pub command: Option<String>,

    /// Raw sensor line or other free-form context.
    pub metadata: Option<String>,

    /// Analyst annotation produced upstream.
    pub llm_analysis: Option<String>,
}
