use crate::muxing::domain::encoded_packet::EncodedPacket;
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::shared::colorspace::{ColorLevels, ColorSpace};
use crate::shared::media_type::MediaType;
use crate::shared::rational::Rational;

/// Failure reported by the container/codec library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("{operation} failed: {message} (code {code})")]
    Call {
        operation: &'static str,
        code: i32,
        message: String,
    },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl LibraryError {
    pub fn call(operation: &'static str, code: i32, message: impl Into<String>) -> Self {
        LibraryError::Call {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Negative status code as the library would return it.
    pub fn code(&self) -> i32 {
        match self {
            LibraryError::Call { code, .. } => *code,
            LibraryError::Unsupported(_) => -1,
        }
    }
}

/// Capabilities of an output container format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub name: String,
    pub long_name: String,
    pub extensions: Vec<String>,
    pub default_video_codec: Option<String>,
    pub default_audio_codec: Option<String>,
    /// False for formats that write to an implicit sink.
    pub needs_file: bool,
    /// Streams need their codec headers stored out of band.
    pub global_header: bool,
}

impl FormatDescriptor {
    pub fn default_codec(&self, media: MediaType) -> Option<&str> {
        match media {
            MediaType::Video => self.default_video_codec.as_deref(),
            MediaType::Audio => self.default_audio_codec.as_deref(),
        }
    }
}

/// Capabilities of an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderDescriptor {
    pub name: String,
    pub long_name: String,
    /// `None` for encoders of other kinds (subtitles, data).
    pub media_type: Option<MediaType>,
    /// Discrete frame rates the encoder accepts, if it restricts them.
    pub supported_frame_rates: Option<Vec<Rational>>,
    pub pixel_formats: Option<Vec<String>>,
    pub sample_formats: Option<Vec<String>>,
    pub experimental: bool,
}

/// Two-pass rate control stage selected through the `flags` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingPass {
    First,
    Second,
}

impl EncodingPass {
    pub fn flag_name(self) -> &'static str {
        match self {
            EncodingPass::First => "pass1",
            EncodingPass::Second => "pass2",
        }
    }
}

/// Entry point into the container/codec library: format and encoder
/// lookup plus creation of output writers.
pub trait ContainerLibrary {
    type Writer: ContainerWriter;

    /// Looks up a muxer by short name, or guesses one from `filename`.
    fn find_format(&self, name: Option<&str>, filename: &str) -> Option<FormatDescriptor>;

    fn find_encoder(&self, name: &str) -> Option<EncoderDescriptor>;

    /// The encoder the format would pick for `media` by default.
    fn default_encoder(
        &self,
        format: &FormatDescriptor,
        filename: &str,
        media: MediaType,
    ) -> Option<EncoderDescriptor>;

    fn create_writer(
        &self,
        format: &FormatDescriptor,
        url: &str,
    ) -> Result<Self::Writer, LibraryError>;

    fn muxers(&self) -> Vec<FormatDescriptor>;

    fn encoders(&self) -> Vec<EncoderDescriptor>;
}

/// An output container being assembled. Owns its streams and I/O handle;
/// dropping it releases both.
pub trait ContainerWriter: Send {
    type Codec: CodecContext;

    fn stream_count(&self) -> usize;

    /// Adds an untyped stream and returns its index.
    fn new_stream(&mut self) -> Result<usize, LibraryError>;

    fn set_stream_time_base(&mut self, index: usize, time_base: Rational);

    fn stream_time_base(&self, index: usize) -> Option<Rational>;

    fn alloc_codec(&mut self, encoder: &EncoderDescriptor) -> Result<Self::Codec, LibraryError>;

    /// Opens `codec` consuming the keys it recognises from `options`, then
    /// copies its parameters onto stream `stream`.
    fn open_codec(
        &mut self,
        stream: usize,
        codec: &mut Self::Codec,
        options: &mut OptionDictionary,
    ) -> Result<(), LibraryError>;

    fn open_io(&mut self) -> Result<(), LibraryError>;

    fn has_io(&self) -> bool;

    /// Bytes written to the I/O handle so far.
    fn io_size(&self) -> Option<u64>;

    fn close_io(&mut self);

    fn set_metadata(&mut self, key: &str, value: &str);

    /// Writes the header, consuming the keys the muxer recognises.
    fn write_header(&mut self, options: &mut OptionDictionary) -> Result<(), LibraryError>;

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), LibraryError>;

    fn write_trailer(&mut self) -> Result<(), LibraryError>;
}

/// An encoder instance bound to one stream.
pub trait CodecContext: Send {
    fn media_type(&self) -> MediaType;

    fn time_base(&self) -> Rational;

    fn set_time_base(&mut self, time_base: Rational);

    fn clear_pass_flag(&mut self, pass: EncodingPass);

    /// Statistics from a previous first pass, replayed during the second.
    /// The bytes are opaque to the session and passed through unchanged.
    fn set_stats_input(&mut self, stats: Vec<u8>);

    fn stats_input(&self) -> Option<Vec<u8>>;

    /// Statistics produced by the most recent encode call, if any.
    fn stats_output(&self) -> Option<Vec<u8>>;

    fn set_experimental(&mut self);

    fn color_space(&self) -> ColorSpace;

    fn set_color_space(&mut self, space: ColorSpace);

    fn color_levels(&self) -> ColorLevels;

    fn set_color_levels(&mut self, levels: ColorLevels);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_error_code() {
        let err = LibraryError::call("avio_open", -2, "No such file or directory");
        assert_eq!(err.code(), -2);
        assert_eq!(
            err.to_string(),
            "avio_open failed: No such file or directory (code -2)"
        );
        assert_eq!(LibraryError::Unsupported("x".into()).code(), -1);
    }

    #[test]
    fn test_default_codec_per_media() {
        let format = FormatDescriptor {
            name: "wav".into(),
            long_name: "WAV / WAVE".into(),
            extensions: vec!["wav".into()],
            default_video_codec: None,
            default_audio_codec: Some("pcm_s16le".into()),
            needs_file: true,
            global_header: false,
        };
        assert_eq!(format.default_codec(MediaType::Audio), Some("pcm_s16le"));
        assert_eq!(format.default_codec(MediaType::Video), None);
    }

    #[test]
    fn test_pass_flag_names() {
        assert_eq!(EncodingPass::First.flag_name(), "pass1");
        assert_eq!(EncodingPass::Second.flag_name(), "pass2");
    }
}
