//! Collaborator seams for the numeric/ML backends spec.md §9 says to bind
//! as black boxes: Whisper transcription, machine translation, and TTS
//! dubbing. Production implementations shell out or call a model server;
//! these traits only specify the contract.

use super::types::Segment;
use crate::error::Result;
use std::path::Path;

/// Result of transcribing one audio file.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// Chunk-relative segments.
    pub segments: Vec<Segment>,
    /// Human-readable detected language (e.g. "english").
    pub language: String,
    /// ISO 639-1 language code (e.g. "en").
    pub language_code: String,
    /// Overall confidence.
    pub confidence: f64,
    /// Audio duration in seconds.
    pub duration: f64,
}

/// Collaborator contract for Whisper-equivalent transcription
/// (`transcribe_audio(path, model_name='tiny', skip_silence_check, device_id)`).
pub trait Transcriber: Send + Sync {
    /// Transcribes `path`, skipping the backend's own silence pre-check
    /// when `skip_silence_check` is set (the 1-minute low-latency path
    /// does this; the 10-minute path performs its own cheaper check
    /// up-front instead, see [`super::service`]).
    fn transcribe(&self, path: &Path, model_name: &str, skip_silence_check: bool, device_id: &str) -> Result<TranscriptionResult>;
}

/// Collaborator contract for machine translation of one chunk's transcript
/// into a target language.
pub trait Translator: Send + Sync {
    /// Translates `text` from `source_language` into `target_language`.
    fn translate(&self, text: &str, source_language: &str, target_language: &str) -> Result<String>;
}

/// Collaborator contract for TTS dubbing: renders `text` in `target_language`
/// using `voice`, writing MP3 bytes to `output_path`.
pub trait Dubber: Send + Sync {
    /// Synthesizes dubbed audio, overwriting `output_path`.
    fn dub(&self, text: &str, target_language: &str, voice: &str, output_path: &Path) -> Result<()>;
}

/// Maps a target language code to its Edge-TTS voice (spec.md §4.6.1's
/// "fixed voice map").
#[must_use]
pub fn voice_for_language(language: &str) -> &'static str {
    match language {
        "fr" => "fr-FR-DeniseNeural",
        "en" => "en-US-AriaNeural",
        "es" => "es-ES-ElviraNeural",
        "de" => "de-DE-KatjaNeural",
        "it" => "it-IT-ElsaNeural",
        _ => "en-US-AriaNeural",
    }
}

/// No-op transcriber used when no Whisper-equivalent backend is configured:
/// every call fails cleanly (REDESIGN FLAGS null-object pattern, matching
/// [`crate::objectstore::NullObjectStore`]) rather than panicking or
/// fabricating a transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTranscriber;

impl Transcriber for NullTranscriber {
    fn transcribe(&self, _path: &Path, _model_name: &str, _skip_silence_check: bool, _device_id: &str) -> Result<TranscriptionResult> {
        Err(crate::error::Error::Transcription {
            reason: "no transcription backend configured".to_string(),
        })
    }
}

/// No-op translator used when no machine-translation backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTranslator;

impl Translator for NullTranslator {
    fn translate(&self, _text: &str, _source_language: &str, _target_language: &str) -> Result<String> {
        Err(crate::error::Error::Translation {
            reason: "no translation backend configured".to_string(),
        })
    }
}

/// No-op dubber used when no TTS backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDubber;

impl Dubber for NullDubber {
    fn dub(&self, _text: &str, _target_language: &str, _voice: &str, _output_path: &Path) -> Result<()> {
        Err(crate::error::Error::Internal {
            message: "no dubbing backend configured".to_string(),
        })
    }
}

/// Deterministic fake transcriber for tests: returns one segment spanning
/// the whole (assumed) one-minute file, tagged with the configured language.
#[derive(Debug, Clone)]
pub struct FakeTranscriber {
    /// Language code to report.
    pub language_code: String,
    /// Text to report as the single segment.
    pub text: String,
}

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, _path: &Path, _model_name: &str, _skip_silence_check: bool, _device_id: &str) -> Result<TranscriptionResult> {
        Ok(TranscriptionResult {
            segments: vec![Segment {
                start: 0.0,
                end: 60.0,
                text: self.text.clone(),
                confidence: 0.95,
            }],
            language: "english".to_string(),
            language_code: self.language_code.clone(),
            confidence: 0.95,
            duration: 60.0,
        })
    }
}

/// Fake translator that just tags the text with the target language.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeTranslator;

impl Translator for FakeTranslator {
    fn translate(&self, text: &str, _source_language: &str, target_language: &str) -> Result<String> {
        Ok(format!("[{target_language}] {text}"))
    }
}

/// Fake dubber that writes a placeholder byte string instead of real audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeDubber;

impl Dubber for FakeDubber {
    fn dub(&self, text: &str, target_language: &str, voice: &str, output_path: &Path) -> Result<()> {
        let placeholder = format!("FAKE_MP3[{voice}]({target_language}):{text}");
        std::fs::write(output_path, placeholder.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_for_language_covers_targets() {
        assert_eq!(voice_for_language("fr"), "fr-FR-DeniseNeural");
        assert_eq!(voice_for_language("de"), "de-DE-KatjaNeural");
    }

    #[test]
    fn test_fake_transcriber_reports_language() {
        let transcriber = FakeTranscriber {
            language_code: "en".to_string(),
            text: "hello world".to_string(),
        };
        let result = transcriber.transcribe(Path::new("1min_0.mp3"), "tiny", true, "device1").unwrap();
        assert_eq!(result.language_code, "en");
        assert_eq!(result.segments.len(), 1);
    }

    #[test]
    fn test_fake_dubber_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("1min_0_fr.mp3");
        FakeDubber.dub("bonjour", "fr", "fr-FR-DeniseNeural", &out).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn test_null_transcriber_reports_failure_not_panic() {
        let result = NullTranscriber.transcribe(Path::new("1min_0.mp3"), "tiny", true, "device1");
        assert!(result.is_err());
    }

    #[test]
    fn test_null_translator_reports_failure_not_panic() {
        assert!(NullTranslator.translate("hello", "en", "fr").is_err());
    }

    #[test]
    fn test_null_dubber_reports_failure_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("unused.mp3");
        assert!(NullDubber.dub("bonjour", "fr", "fr-FR-DeniseNeural", &out).is_err());
        assert!(!out.exists());
    }
}
