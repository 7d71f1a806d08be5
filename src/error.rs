//! Error types for hostpipe.

/// Result type alias for hostpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for hostpipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// No capture directories could be resolved.
    #[error("no active capture directories found (checked '{conf_path}')")]
    NoActiveCaptures {
        /// Path to the active-captures conf file that was checked.
        conf_path: std::path::PathBuf,
    },

    /// Required device environment variables are missing.
    #[error("missing environment configuration for capture folder '{capture_folder}'")]
    DeviceEnvMissing {
        /// Capture folder that could not be resolved.
        capture_folder: String,
    },

    /// Failed to create a lock file because one already exists.
    #[error("already locked: {path}")]
    AlreadyLocked {
        /// Path to the lock file.
        path: std::path::PathBuf,
    },

    /// Failed to acquire a lock within the retry budget.
    #[error("timed out acquiring lock '{path}' after {attempts} attempts")]
    LockTimeout {
        /// Path to the lock file.
        path: std::path::PathBuf,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Failed to read or write a sidecar JSON file.
    #[error("sidecar I/O failed for '{path}'")]
    SidecarIo {
        /// Path to the sidecar file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a sidecar JSON file.
    #[error("failed to parse sidecar '{path}'")]
    SidecarParse {
        /// Path to the sidecar file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to decode a frame image.
    #[error("failed to decode frame '{path}'")]
    FrameDecode {
        /// Path to the frame.
        path: std::path::PathBuf,
        /// Underlying decode error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to decode an audio file.
    #[error("failed to decode audio '{path}'")]
    AudioDecode {
        /// Path to the audio file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to resample audio.
    #[error("failed to resample audio: {reason}")]
    Resample {
        /// Description of the resampling failure.
        reason: String,
    },

    /// A filesystem watch could not be attached.
    #[error("failed to watch directory '{path}'")]
    WatchFailed {
        /// Path that could not be watched.
        path: std::path::PathBuf,
        /// Underlying notify error.
        #[source]
        source: notify::Error,
    },

    /// Transcription backend failed.
    #[error("transcription failed: {reason}")]
    Transcription {
        /// Description of the failure.
        reason: String,
    },

    /// Translation backend failed.
    #[error("translation failed: {reason}")]
    Translation {
        /// Description of the failure.
        reason: String,
    },

    /// Banner/channel recognition backend failed.
    #[error("banner detection failed: {reason}")]
    BannerDetection {
        /// Description of the failure.
        reason: String,
    },

    /// Verification controller failed.
    #[error("verification failed: {reason}")]
    Verification {
        /// Description of the failure.
        reason: String,
    },

    /// Object-store upload failed.
    #[error("object store upload failed for '{key}'")]
    ObjectStoreUpload {
        /// Destination key.
        key: String,
        /// Underlying HTTP error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// KPI request could not be parsed.
    #[error("invalid KPI request '{path}': {reason}")]
    InvalidKpiRequest {
        /// Path to the request file.
        path: std::path::PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// Host is not registered.
    #[error("host '{host_name}' is not registered")]
    HostNotRegistered {
        /// Name of the unregistered host.
        host_name: String,
    },

    /// A device is already locked by another owner.
    #[error("device '{device_id}' is already locked by '{locked_by}'")]
    DeviceLocked {
        /// Device id.
        device_id: String,
        /// Current lock owner.
        locked_by: String,
    },

    /// A filename did not match the pattern its producing stage expects.
    #[error("filename '{path}' does not match the expected pattern")]
    InvalidFilename {
        /// The offending path.
        path: std::path::PathBuf,
    },

    /// Internal error for unexpected failures.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
