//! Transcript chunk data model (spec.md §3, §4.6.3).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One transcribed utterance within a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds from the start of the chunk's audio.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    /// Transcribed text.
    pub text: String,
    /// Backend-reported confidence, 0.0..=1.0.
    pub confidence: f64,
}

/// Per-minute bookkeeping within a chunk, keyed by minute offset `0..10`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteStatus {
    /// Whether this minute has been processed at least once.
    pub processed: bool,
    /// The local calendar day this minute was processed on, for the
    /// 24-hour rolling-window rollover check.
    pub processed_day: NaiveDate,
    /// Whether the minute's audio produced any segments.
    pub has_audio: bool,
    /// Why the minute was skipped (silence, transcription failure), if it
    /// produced no segments.
    pub skip_reason: Option<String>,
}

/// A 10-minute transcript aggregation unit (spec.md §3's "Transcript
/// chunk"). `segments` stays sorted by `start`; `transcript` is always the
/// whitespace-joined segment texts — both are invariants the merge step
/// maintains, never the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Owning device's capture folder.
    pub capture_folder: String,
    /// Local-time hour (0..23) this chunk belongs to.
    pub hour: u32,
    /// Chunk index within the hour (0..5).
    pub chunk_index: u32,
    /// Always 10.
    pub chunk_duration_minutes: u32,
    /// Last non-"unknown" detected language across the chunk's segments.
    pub language: String,
    /// Whitespace-joined segment texts, recomputed on every merge.
    pub transcript: String,
    /// Mean of segment confidences, recomputed on every merge.
    pub confidence: f64,
    /// Max segment `end`, recomputed on every merge.
    pub chunk_duration_seconds: f64,
    /// Source MP3 filename for the most recent merge.
    pub mp3_file: String,
    /// All segments observed for this chunk, sorted by `start`.
    pub segments: Vec<Segment>,
    /// Per-minute status, keyed by minute offset `0..10`.
    pub minute_statuses: BTreeMap<u32, MinuteStatus>,
}

impl TranscriptChunk {
    /// A freshly-seeded chunk with no segments or minute statuses yet.
    #[must_use]
    pub fn empty(capture_folder: impl Into<String>, hour: u32, chunk_index: u32) -> Self {
        Self {
            capture_folder: capture_folder.into(),
            hour,
            chunk_index,
            chunk_duration_minutes: 10,
            language: "unknown".to_string(),
            transcript: String::new(),
            confidence: 0.0,
            chunk_duration_seconds: 0.0,
            mp3_file: String::new(),
            segments: Vec::new(),
            minute_statuses: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_has_no_segments() {
        let chunk = TranscriptChunk::empty("capture1", 14, 3);
        assert!(chunk.segments.is_empty());
        assert_eq!(chunk.chunk_duration_minutes, 10);
    }
}
