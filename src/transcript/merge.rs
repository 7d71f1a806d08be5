//! The progressive merge algorithm (spec.md §4.6.3): combines one minute's
//! freshly-transcribed segments into the owning 10-minute chunk, rolling
//! the chunk over at a day boundary.

use super::types::{MinuteStatus, Segment, TranscriptChunk};
use chrono::NaiveDate;

/// One minute's contribution to be merged into a chunk.
#[derive(Debug, Clone)]
pub struct MinuteMergeInput {
    /// Minute offset within the chunk, `0..10`.
    pub minute_offset: u32,
    /// Local calendar day this minute was processed on.
    pub today: NaiveDate,
    /// Freshly-transcribed segments for this minute (chunk-relative offsets).
    pub segments: Vec<Segment>,
    /// Detected language for this minute's audio, if the backend reported one.
    pub language: Option<String>,
    /// Why no segments were produced, if `segments` is empty.
    pub skip_reason: Option<String>,
    /// Source MP3 filename this merge originated from.
    pub mp3_file: String,
}

/// Merges `input` into `existing` (or a freshly-seeded chunk), applying the
/// seven steps of spec.md §4.6.3. Must be called while holding the chunk's
/// sidecar-style lock; this function itself performs no I/O.
#[must_use]
pub fn merge_minute(existing: Option<TranscriptChunk>, capture_folder: &str, hour: u32, chunk_index: u32, input: MinuteMergeInput) -> TranscriptChunk {
    let mut chunk = existing.unwrap_or_else(|| TranscriptChunk::empty(capture_folder, hour, chunk_index));

    let needs_rollover = chunk
        .minute_statuses
        .values()
        .any(|status| status.processed_day != input.today);
    if needs_rollover {
        chunk.segments.clear();
        chunk.minute_statuses.clear();
        chunk.transcript.clear();
        chunk.confidence = 0.0;
        chunk.chunk_duration_seconds = 0.0;
    }

    let has_audio = !input.segments.is_empty();
    chunk.minute_statuses.insert(
        input.minute_offset,
        MinuteStatus {
            processed: true,
            processed_day: input.today,
            has_audio,
            skip_reason: input.skip_reason,
        },
    );

    let incoming_starts: Vec<f64> = input.segments.iter().map(|s| s.start).collect();
    chunk.segments.retain(|s| !incoming_starts.contains(&s.start));
    chunk.segments.extend(input.segments);
    chunk.segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    chunk.transcript = chunk.segments.iter().map(|s| s.text.trim()).collect::<Vec<_>>().join(" ");
    chunk.confidence = if chunk.segments.is_empty() {
        0.0
    } else {
        chunk.segments.iter().map(|s| s.confidence).sum::<f64>() / chunk.segments.len() as f64
    };
    chunk.chunk_duration_seconds = chunk.segments.iter().map(|s| s.end).fold(0.0_f64, f64::max);

    if let Some(language) = input.language {
        if language != "unknown" {
            chunk.language = language;
        }
    }
    chunk.mp3_file = input.mp3_file;

    chunk
}
