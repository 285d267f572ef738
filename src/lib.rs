pub mod bands;
pub mod config;
pub mod cube;
pub mod discover;
pub mod fingerprint;
pub mod modules;
pub mod pipeline;
pub mod segmenter;
pub mod store;

/// Audio file extensions we accept as source tracks.
/// The segmenter re-encodes chunks to WAV, so this list is only about
/// what sox can read on the way in.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac", "mp3"];

/// Application name for config and log prefixes
pub const APP_NAME: &str = "waveprint";
