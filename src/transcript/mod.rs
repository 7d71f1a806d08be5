//! Transcript accumulator (spec.md §4.6): a two-queue Whisper worker that
//! progressively merges speech-to-text output into 10-minute chunks, plus
//! the sibling audio detector worker that feeds `audio_loss` incidents.

mod audio_probe;
mod audio_worker;
mod backends;
mod chunkio;
mod merge;
mod queue;
mod service;
mod store;
mod types;

pub use audio_probe::{FakeVolumeProbe, NullVolumeProbe, VolumeProbe};
pub use audio_worker::run_forever as run_audio_detector_forever;
pub use backends::{
    Dubber, FakeDubber, FakeTranscriber, FakeTranslator, NullDubber, NullTranscriber, NullTranslator, Transcriber,
    TranscriptionResult, Translator, voice_for_language,
};
pub use chunkio::{chunk_path, read_chunk, with_locked_chunk, write_chunk_atomic};
pub use merge::{MinuteMergeInput, merge_minute};
pub use queue::{TranscriptPaths, run_forever as run_queue_forever};
pub use service::{
    TranscriptDeps, init_thread_caps, parse_one_minute_slot, parse_ten_minute_chunk, process_one_minute_file, process_ten_minute_file,
};
pub use store::{NullTranscriptManifest, TranscriptManifest};
pub use types::{MinuteStatus, Segment, TranscriptChunk};
