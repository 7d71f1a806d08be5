//! The two transcription paths (spec.md §4.6.1, §4.6.2) and the thread-cap
//! bootstrap (§4.6) that must run before any numeric library loads.

use super::audio_probe::VolumeProbe;
use super::backends::{Dubber, Transcriber, Translator, voice_for_language};
use super::chunkio::{chunk_path, with_locked_chunk};
use super::merge::{MinuteMergeInput, merge_minute};
use super::store::TranscriptManifest;
use super::types::{Segment, TranscriptChunk};
use crate::constants::detector::AUDIO_SILENCE_DB;
use crate::constants::transcript::{INFERENCE_THREAD_CAP, TRANSLATE_MIN_CHARS, WHISPER_MODEL};
use crate::error::{Error, Result};
use crate::storage::calculate_chunk_location;
use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Bundles the collaborators a transcription path needs, so call sites
/// thread one handle instead of five.
#[derive(Clone)]
pub struct TranscriptDeps {
    /// Whisper-equivalent speech-to-text backend.
    pub transcriber: Arc<dyn Transcriber>,
    /// Machine translation backend.
    pub translator: Arc<dyn Translator>,
    /// TTS dubbing backend.
    pub dubber: Arc<dyn Dubber>,
    /// Cross-service manifest notified after every successful merge.
    pub manifest: Arc<dyn TranscriptManifest>,
    /// Volume-measurement collaborator for the 10-minute silence pre-check.
    pub volume_probe: Arc<dyn VolumeProbe>,
}

/// Caps BLAS/OpenMP thread pools to [`INFERENCE_THREAD_CAP`] before any
/// numeric library is loaded; Whisper otherwise defaults to 40+ threads and
/// collapses throughput under concurrent device load. Must be called once,
/// before the first [`TranscriptDeps::transcriber`] call.
#[allow(unsafe_code)]
pub fn init_thread_caps() {
    let cap = INFERENCE_THREAD_CAP.to_string();
    // SAFETY: called once during process startup, before any worker thread
    // that reads these variables is spawned.
    unsafe {
        std::env::set_var("OMP_NUM_THREADS", &cap);
        std::env::set_var("OPENBLAS_NUM_THREADS", &cap);
        std::env::set_var("MKL_NUM_THREADS", &cap);
    }
}

/// Parses the rotating slot out of a `1min_<SLOT>.mp3` filename.
#[must_use]
pub fn parse_one_minute_slot(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("1min_")?.parse().ok()
}

/// Parses `(hour, chunk_index)` out of a `audio/<hour>/chunk_10min_<C>.mp3`
/// path: the hour comes from the parent directory name, the chunk index
/// from the filename.
#[must_use]
pub fn parse_ten_minute_chunk(path: &Path) -> Option<(u32, u32)> {
    let hour: u32 = path.parent()?.file_name()?.to_str()?.parse().ok()?;
    let stem = path.file_stem()?.to_str()?;
    let chunk: u32 = stem.strip_prefix("chunk_10min_")?.parse().ok()?;
    Some((hour, chunk))
}

/// Runs the §4.6.1 low-latency path for one just-arrived `1min_<SLOT>.mp3`
/// file: transcribes it, merges the result into its owning 10-minute
/// chunk, and (if the merged transcript is long enough) translates and
/// dubs it into the other four target languages.
pub fn process_one_minute_file(
    mp3_path: &Path,
    metadata_dir: &Path,
    audio_temp_dir: &Path,
    capture_folder: &str,
    device_id: &str,
    deps: &TranscriptDeps,
) -> Result<TranscriptChunk> {
    let slot = parse_one_minute_slot(mp3_path).ok_or_else(|| Error::InvalidFilename {
        path: mp3_path.to_path_buf(),
    })?;
    let (hour, chunk_index) = calculate_chunk_location(Local::now());

    let transcription = deps.transcriber.transcribe(mp3_path, WHISPER_MODEL, true, device_id)?;
    let offset = f64::from(slot * 60);
    let segments: Vec<Segment> = transcription
        .segments
        .iter()
        .map(|s| Segment {
            start: s.start + offset,
            end: s.end + offset,
            text: s.text.clone(),
            confidence: s.confidence,
        })
        .collect();
    let skip_reason = if segments.is_empty() { Some("no speech detected".to_string()) } else { None };

    let mp3_file = file_name_or_empty(mp3_path);
    let path = chunk_path(metadata_dir, hour, chunk_index);
    let chunk = with_locked_chunk(&path, move |existing| {
        merge_minute(
            existing,
            capture_folder,
            hour,
            chunk_index,
            MinuteMergeInput {
                minute_offset: slot,
                today: Local::now().date_naive(),
                segments,
                language: Some(transcription.language_code.clone()),
                skip_reason,
                mp3_file,
            },
        )
    })?;

    deps.manifest.update_manifest(capture_folder, &chunk)?;

    if chunk.transcript.chars().count() > TRANSLATE_MIN_CHARS {
        dub_into_languages(&chunk.transcript, &chunk.language, deps, |lang| {
            audio_temp_dir.join(format!("1min_{slot}_{lang}.mp3"))
        });
    }

    Ok(chunk)
}

/// Runs the §4.6.2 backfill path for one `audio/<hour>/chunk_10min_<C>.mp3`
/// file: a cheap silence pre-check, then (if audible) a single whole-chunk
/// transcription bucketed into per-minute merges, then chunk-level dubbing.
pub fn process_ten_minute_file(
    mp3_path: &Path,
    metadata_dir: &Path,
    audio_hour_dir: &Path,
    capture_folder: &str,
    device_id: &str,
    deps: &TranscriptDeps,
) -> Result<Option<TranscriptChunk>> {
    let (hour, chunk_index) = parse_ten_minute_chunk(mp3_path).ok_or_else(|| Error::InvalidFilename {
        path: mp3_path.to_path_buf(),
    })?;

    let mean_volume_db = deps.volume_probe.mean_volume_db(mp3_path, 5.0)?;
    if mean_volume_db <= AUDIO_SILENCE_DB {
        info!(path = %mp3_path.display(), mean_volume_db, "skipping silent 10-minute chunk");
        return Ok(None);
    }

    let transcription = deps.transcriber.transcribe(mp3_path, WHISPER_MODEL, false, device_id)?;
    let mut buckets: BTreeMap<u32, Vec<Segment>> = BTreeMap::new();
    for segment in &transcription.segments {
        let minute = (segment.start / 60.0).floor() as u32;
        buckets.entry(minute.min(9)).or_default().push(segment.clone());
    }

    let mp3_file = file_name_or_empty(mp3_path);
    let path = chunk_path(metadata_dir, hour, chunk_index);
    let mut latest: Option<TranscriptChunk> = None;
    for (minute_offset, segments) in buckets {
        let mp3_file = mp3_file.clone();
        let language = transcription.language_code.clone();
        let chunk = with_locked_chunk(&path, |existing| {
            merge_minute(
                existing,
                capture_folder,
                hour,
                chunk_index,
                MinuteMergeInput {
                    minute_offset,
                    today: Local::now().date_naive(),
                    segments,
                    language: Some(language),
                    skip_reason: None,
                    mp3_file,
                },
            )
        })?;
        latest = Some(chunk);
    }

    let Some(chunk) = latest else {
        return Ok(None);
    };

    deps.manifest.update_manifest(capture_folder, &chunk)?;

    if !chunk.transcript.is_empty() {
        dub_into_languages(&chunk.transcript, &chunk.language, deps, |lang| {
            audio_hour_dir.join(format!("chunk_10min_{chunk_index}_{lang}.mp3"))
        });
    }

    Ok(Some(chunk))
}

fn dub_into_languages(transcript: &str, source_language: &str, deps: &TranscriptDeps, output_path: impl Fn(&str) -> PathBuf) {
    for lang in crate::constants::transcript::TARGET_LANGUAGES {
        if lang == source_language {
            continue;
        }
        let translated = match deps.translator.translate(transcript, source_language, lang) {
            Ok(text) => text,
            Err(e) => {
                warn!(lang, error = %e, "translation failed");
                continue;
            }
        };
        let voice = voice_for_language(lang);
        let out = output_path(lang);
        if let Err(e) = deps.dubber.dub(&translated, lang, voice, &out) {
            warn!(lang, error = %e, "dubbing failed");
        }
    }
}

fn file_name_or_empty(path: &Path) -> String {
    path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::backends::{FakeDubber, FakeTranscriber, FakeTranslator};
    use super::super::store::NullTranscriptManifest;
    use crate::transcript::audio_probe::FakeVolumeProbe;

    fn test_deps(text: &str, lang: &str) -> TranscriptDeps {
        TranscriptDeps {
            transcriber: Arc::new(FakeTranscriber {
                language_code: lang.to_string(),
                text: text.to_string(),
            }),
            translator: Arc::new(FakeTranslator),
            dubber: Arc::new(FakeDubber),
            manifest: Arc::new(NullTranscriptManifest),
            volume_probe: Arc::new(FakeVolumeProbe { fixed_db: -10.0 }),
        }
    }

    #[test]
    fn test_parse_one_minute_slot() {
        assert_eq!(parse_one_minute_slot(Path::new("/a/1min_7.mp3")), Some(7));
        assert_eq!(parse_one_minute_slot(Path::new("/a/other.mp3")), None);
    }

    #[test]
    fn test_parse_ten_minute_chunk() {
        let path = Path::new("/a/audio/14/chunk_10min_3.mp3");
        assert_eq!(parse_ten_minute_chunk(path), Some((14, 3)));
    }

    #[test]
    fn test_one_minute_path_merges_and_dubs_long_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let audio_temp_dir = dir.path().join("audio/temp");
        std::fs::create_dir_all(&audio_temp_dir).unwrap();
        let mp3 = audio_temp_dir.join("1min_2.mp3");
        std::fs::write(&mp3, b"data").unwrap();

        let deps = test_deps("this transcript is definitely longer than twenty characters", "en");
        let chunk = process_one_minute_file(&mp3, &metadata_dir, &audio_temp_dir, "capture1", "device1", &deps).unwrap();

        assert!(chunk.transcript.contains("longer than twenty"));
        assert!(audio_temp_dir.join("1min_2_fr.mp3").exists());
        assert!(!audio_temp_dir.join("1min_2_en.mp3").exists());
    }

    #[test]
    fn test_one_minute_path_skips_dubbing_short_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let audio_temp_dir = dir.path().join("audio/temp");
        std::fs::create_dir_all(&audio_temp_dir).unwrap();
        let mp3 = audio_temp_dir.join("1min_0.mp3");
        std::fs::write(&mp3, b"data").unwrap();

        let deps = test_deps("hi", "en");
        process_one_minute_file(&mp3, &metadata_dir, &audio_temp_dir, "capture1", "device1", &deps).unwrap();

        assert!(!audio_temp_dir.join("1min_0_fr.mp3").exists());
    }

    #[test]
    fn test_ten_minute_path_skips_silent_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let audio_hour_dir = dir.path().join("audio/14");
        std::fs::create_dir_all(&audio_hour_dir).unwrap();
        let mp3 = audio_hour_dir.join("chunk_10min_3.mp3");
        std::fs::write(&mp3, b"data").unwrap();

        let mut deps = test_deps("irrelevant", "en");
        deps.volume_probe = Arc::new(FakeVolumeProbe { fixed_db: -60.0 });

        let result = process_ten_minute_file(&mp3, &metadata_dir, &audio_hour_dir, "capture1", "device1", &deps).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_ten_minute_path_buckets_by_minute() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let audio_hour_dir = dir.path().join("audio/14");
        std::fs::create_dir_all(&audio_hour_dir).unwrap();
        let mp3 = audio_hour_dir.join("chunk_10min_3.mp3");
        std::fs::write(&mp3, b"data").unwrap();

        let deps = test_deps("hello there friend", "en");
        let chunk = process_ten_minute_file(&mp3, &metadata_dir, &audio_hour_dir, "capture1", "device1", &deps)
            .unwrap()
            .unwrap();
        assert!(chunk.minute_statuses.contains_key(&0));
    }
}
