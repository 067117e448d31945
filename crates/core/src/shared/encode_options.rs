use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::media_type::MediaType;

/// Errors raised while loading [`EncodeOptions`] from disk.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("failed to read options file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse options file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Output encoding configuration. Fixed once a session is built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Output path or URL. `-` means stdout.
    pub file: String,
    /// Comma-separated container format candidates.
    pub format: Option<String>,
    /// `key=value` entries for the container.
    pub format_options: Vec<String>,
    /// Fixed output frame rate.
    pub fps: Option<f64>,
    /// Upper bound applied by producers when `auto_fps` is on.
    pub max_fps: Option<f64>,
    /// Comma-separated video encoder candidates.
    pub video_codec: Option<String>,
    pub video_options: Vec<String>,
    /// Comma-separated audio encoder candidates.
    pub audio_codec: Option<String>,
    pub audio_options: Vec<String>,
    pub hard_dup: bool,
    /// Presentation offset added to video timestamps, in seconds.
    pub video_offset: f64,
    /// Presentation offset added to audio timestamps, in seconds.
    pub audio_offset: f64,
    pub copy_ts: bool,
    pub raw_ts: bool,
    /// Take the frame rate reported by the video pipeline.
    pub auto_fps: bool,
    pub never_drop: bool,
    pub video_first: bool,
    pub audio_first: bool,
    /// Carry input metadata into the output.
    pub copy_metadata: bool,
    /// Tags to add or overwrite, applied in order.
    pub set_metadata: Vec<(String, String)>,
    /// Tags to drop.
    pub remove_metadata: Vec<String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            file: String::new(),
            format: None,
            format_options: Vec::new(),
            fps: None,
            max_fps: None,
            video_codec: None,
            video_options: Vec::new(),
            audio_codec: None,
            audio_options: Vec::new(),
            hard_dup: false,
            video_offset: 0.0,
            audio_offset: 0.0,
            copy_ts: false,
            raw_ts: false,
            auto_fps: false,
            never_drop: false,
            video_first: false,
            audio_first: false,
            copy_metadata: true,
            set_metadata: Vec::new(),
            remove_metadata: Vec::new(),
        }
    }
}

impl EncodeOptions {
    pub fn from_json_file(path: &Path) -> Result<Self, OptionsError> {
        let json = fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn codec_name(&self, media: MediaType) -> Option<&str> {
        match media {
            MediaType::Video => self.video_codec.as_deref(),
            MediaType::Audio => self.audio_codec.as_deref(),
        }
    }

    /// True when the user asked for a concrete encoder for `media`.
    pub fn requests_codec(&self, media: MediaType) -> bool {
        self.codec_name(media).is_some_and(|name| !name.is_empty())
    }

    pub fn codec_options(&self, media: MediaType) -> &[String] {
        match media {
            MediaType::Video => &self.video_options,
            MediaType::Audio => &self.audio_options,
        }
    }

    pub fn offset(&self, media: MediaType) -> f64 {
        match media {
            MediaType::Video => self.video_offset,
            MediaType::Audio => self.audio_offset,
        }
    }
}

/// Splits a comma-separated candidate list, dropping empty entries.
pub fn split_candidates(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
