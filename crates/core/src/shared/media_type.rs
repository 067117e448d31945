use serde::{Deserialize, Serialize};

/// Elementary stream kinds an encode session can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    pub const ALL: &[MediaType] = &[MediaType::Video, MediaType::Audio];

    /// Prefix used in diagnostics and in two-pass log file names.
    pub fn log_prefix(self) -> &'static str {
        match self {
            MediaType::Video => "vo-lavc",
            MediaType::Audio => "ao-lavc",
        }
    }

    /// Name of the per-codec option list, used in unknown-key warnings.
    pub fn options_name(self) -> &'static str {
        match self {
            MediaType::Video => "ovcopts",
            MediaType::Audio => "oacopts",
        }
    }

    pub fn other(self) -> MediaType {
        match self {
            MediaType::Video => MediaType::Audio,
            MediaType::Audio => MediaType::Video,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
        }
    }
}

/// One value per media type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerMedia<T> {
    pub video: T,
    pub audio: T,
}

impl<T> PerMedia<T> {
    pub fn new(video: T, audio: T) -> Self {
        Self { video, audio }
    }

    pub fn get(&self, media: MediaType) -> &T {
        match media {
            MediaType::Video => &self.video,
            MediaType::Audio => &self.audio,
        }
    }

    pub fn get_mut(&mut self, media: MediaType) -> &mut T {
        match media {
            MediaType::Video => &mut self.video,
            MediaType::Audio => &mut self.audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_symmetric() {
        for media in MediaType::ALL {
            assert_ne!(media.other(), *media);
            assert_eq!(media.other().other(), *media);
        }
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(MediaType::Video.log_prefix(), "vo-lavc");
        assert_eq!(MediaType::Audio.log_prefix(), "ao-lavc");
        assert_eq!(MediaType::Video.options_name(), "ovcopts");
        assert_eq!(MediaType::Audio.options_name(), "oacopts");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&MediaType::Audio).unwrap();
        assert_eq!(json, "\"audio\"");
        let parsed: MediaType = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(parsed, MediaType::Video);
    }

    #[test]
    fn test_per_media_access() {
        let mut bytes = PerMedia::new(1u64, 2u64);
        *bytes.get_mut(MediaType::Audio) += 5;
        assert_eq!(*bytes.get(MediaType::Video), 1);
        assert_eq!(*bytes.get(MediaType::Audio), 7);
    }
}
