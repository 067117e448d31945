use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::muxing::domain::container_library::{
    CodecContext, ContainerLibrary, ContainerWriter, EncoderDescriptor, EncodingPass,
    FormatDescriptor, LibraryError,
};
use crate::muxing::domain::encoded_packet::EncodedPacket;
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::shared::colorspace::{ColorLevels, ColorSpace};
use crate::shared::media_type::MediaType;
use crate::shared::rational::Rational;

/// Bytes a header occupies in the in-memory output.
pub const HEADER_BYTES: u64 = 64;
/// Bytes a trailer occupies in the in-memory output.
pub const TRAILER_BYTES: u64 = 16;

const FORMAT_OPTIONS: &[&str] = &["movflags", "fflags", "max_interleave_delta", "write_crc32"];
const CODEC_OPTIONS: &[&str] = &[
    "b", "g", "flags", "global_quality", "qmin", "qmax", "preset", "threads", "bf",
];

/// Library calls the in-memory backend should fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryFaults {
    pub alloc_codec: bool,
    pub open_codec: bool,
    pub open_io: bool,
    pub write_header: bool,
    pub write_packet: bool,
    pub write_trailer: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedStream {
    pub time_base: Option<Rational>,
    /// Set once a codec has been opened on the stream.
    pub media_type: Option<MediaType>,
    pub codec: Option<String>,
}

/// Everything the most recently created writer did, plus lifetime counters
/// across all writers and codecs of the library.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecord {
    pub writers_created: usize,
    pub writers_released: usize,
    pub streams: Vec<RecordedStream>,
    pub io_opened: usize,
    pub io_closed: usize,
    pub io_bytes: u64,
    pub headers_written: usize,
    pub trailers_written: usize,
    pub packets: Vec<EncodedPacket>,
    pub metadata: Vec<(String, String)>,
    pub codecs_allocated: usize,
    pub codecs_opened: Vec<String>,
    pub codecs_released: usize,
}

type SharedRecord = Arc<Mutex<MemoryRecord>>;

fn lock(record: &SharedRecord) -> MutexGuard<'_, MemoryRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deterministic container library with a small fixed catalog. Records
/// every call so tests can check what a session did.
#[derive(Debug, Clone)]
pub struct MemoryLibrary {
    formats: Vec<FormatDescriptor>,
    encoders: Vec<EncoderDescriptor>,
    faults: MemoryFaults,
    record: SharedRecord,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self {
            formats: default_formats(),
            encoders: default_encoders(),
            faults: MemoryFaults::default(),
            record: Arc::new(Mutex::new(MemoryRecord::default())),
        }
    }

    pub fn with_faults(mut self, faults: MemoryFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderDescriptor) -> Self {
        self.encoders.retain(|e| e.name != encoder.name);
        self.encoders.push(encoder);
        self
    }

    /// Snapshot of the recorded calls.
    pub fn record(&self) -> MemoryRecord {
        lock(&self.record).clone()
    }
}

impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn format(
    name: &str,
    long_name: &str,
    extensions: &[&str],
    video: Option<&str>,
    audio: Option<&str>,
    needs_file: bool,
    global_header: bool,
) -> FormatDescriptor {
    FormatDescriptor {
        name: name.to_string(),
        long_name: long_name.to_string(),
        extensions: extensions.iter().map(|s| s.to_string()).collect(),
        default_video_codec: video.map(str::to_string),
        default_audio_codec: audio.map(str::to_string),
        needs_file,
        global_header,
    }
}

fn default_formats() -> Vec<FormatDescriptor> {
    vec![
        format("matroska", "Matroska", &["mkv"], Some("mpeg4"), Some("vorbis"), true, true),
        format("mp4", "MP4 (MPEG-4 Part 14)", &["mp4", "m4v"], Some("mpeg4"), Some("aac"), true, true),
        format("wav", "WAV / WAVE (Waveform Audio)", &["wav"], None, Some("pcm_s16le"), true, false),
        format("null", "raw null video", &[], Some("rawvideo"), Some("pcm_s16le"), false, false),
    ]
}

fn encoder(name: &str, long_name: &str, media_type: Option<MediaType>) -> EncoderDescriptor {
    EncoderDescriptor {
        name: name.to_string(),
        long_name: long_name.to_string(),
        media_type,
        supported_frame_rates: None,
        pixel_formats: None,
        sample_formats: None,
        experimental: false,
    }
}

fn names(list: &[&str]) -> Option<Vec<String>> {
    Some(list.iter().map(|s| s.to_string()).collect())
}

fn default_encoders() -> Vec<EncoderDescriptor> {
    vec![
        EncoderDescriptor {
            pixel_formats: names(&["yuv420p"]),
            ..encoder("mpeg4", "MPEG-4 part 2", Some(MediaType::Video))
        },
        EncoderDescriptor {
            supported_frame_rates: Some(vec![
                Rational::new(24000, 1001),
                Rational::new(24, 1),
                Rational::new(25, 1),
                Rational::new(30000, 1001),
                Rational::new(30, 1),
                Rational::new(50, 1),
                Rational::new(60000, 1001),
                Rational::new(60, 1),
            ]),
            pixel_formats: names(&["yuv420p", "yuv422p"]),
            ..encoder("mpeg2video", "MPEG-2 video", Some(MediaType::Video))
        },
        encoder("rawvideo", "raw video", Some(MediaType::Video)),
        EncoderDescriptor {
            sample_formats: names(&["fltp"]),
            experimental: true,
            ..encoder("vorbis", "Vorbis", Some(MediaType::Audio))
        },
        EncoderDescriptor {
            sample_formats: names(&["fltp"]),
            ..encoder("aac", "AAC (Advanced Audio Coding)", Some(MediaType::Audio))
        },
        EncoderDescriptor {
            sample_formats: names(&["s16"]),
            ..encoder("pcm_s16le", "PCM signed 16-bit little-endian", Some(MediaType::Audio))
        },
        encoder("mov_text", "3GPP Timed Text subtitle", None),
    ]
}

fn extension(filename: &str) -> Option<&str> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

impl ContainerLibrary for MemoryLibrary {
    type Writer = MemoryWriter;

    fn find_format(&self, name: Option<&str>, filename: &str) -> Option<FormatDescriptor> {
        if let Some(found) = name.and_then(|n| self.formats.iter().find(|f| f.name == n)) {
            return Some(found.clone());
        }
        let ext = extension(filename)?;
        self.formats
            .iter()
            .find(|f| f.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .cloned()
    }

    fn find_encoder(&self, name: &str) -> Option<EncoderDescriptor> {
        self.encoders.iter().find(|e| e.name == name).cloned()
    }

    fn default_encoder(
        &self,
        format: &FormatDescriptor,
        _filename: &str,
        media: MediaType,
    ) -> Option<EncoderDescriptor> {
        self.find_encoder(format.default_codec(media)?)
    }

    fn create_writer(
        &self,
        format: &FormatDescriptor,
        url: &str,
    ) -> Result<MemoryWriter, LibraryError> {
        let mut record = lock(&self.record);
        record.writers_created += 1;
        record.streams.clear();
        record.packets.clear();
        record.metadata.clear();
        record.io_bytes = 0;
        drop(record);
        Ok(MemoryWriter {
            url: url.to_string(),
            format_name: format.name.clone(),
            io_open: false,
            faults: self.faults.clone(),
            record: Arc::clone(&self.record),
        })
    }

    fn muxers(&self) -> Vec<FormatDescriptor> {
        self.formats.clone()
    }

    fn encoders(&self) -> Vec<EncoderDescriptor> {
        self.encoders.clone()
    }
}

pub struct MemoryWriter {
    url: String,
    format_name: String,
    io_open: bool,
    faults: MemoryFaults,
    record: SharedRecord,
}

impl MemoryWriter {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format_name(&self) -> &str {
        &self.format_name
    }
}

impl ContainerWriter for MemoryWriter {
    type Codec = MemoryCodec;

    fn stream_count(&self) -> usize {
        lock(&self.record).streams.len()
    }

    fn new_stream(&mut self) -> Result<usize, LibraryError> {
        let mut record = lock(&self.record);
        record.streams.push(RecordedStream::default());
        Ok(record.streams.len() - 1)
    }

    fn set_stream_time_base(&mut self, index: usize, time_base: Rational) {
        if let Some(stream) = lock(&self.record).streams.get_mut(index) {
            stream.time_base = Some(time_base);
        }
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        lock(&self.record).streams.get(index)?.time_base
    }

    fn alloc_codec(&mut self, encoder: &EncoderDescriptor) -> Result<MemoryCodec, LibraryError> {
        if self.faults.alloc_codec {
            return Err(LibraryError::call("avcodec_alloc_context3", -12, "Cannot allocate memory"));
        }
        let media_type = encoder.media_type.ok_or_else(|| {
            LibraryError::Unsupported(format!("{} is neither audio nor video", encoder.name))
        })?;
        lock(&self.record).codecs_allocated += 1;
        Ok(MemoryCodec {
            name: encoder.name.clone(),
            media_type,
            time_base: Rational::new(0, 1),
            stats_in: None,
            stats_out: None,
            experimental: false,
            color_space: ColorSpace::Auto,
            color_levels: ColorLevels::Auto,
            cleared_passes: Vec::new(),
            opened_flags: None,
            record: Arc::clone(&self.record),
        })
    }

    fn open_codec(
        &mut self,
        stream: usize,
        codec: &mut MemoryCodec,
        options: &mut OptionDictionary,
    ) -> Result<(), LibraryError> {
        if self.faults.open_codec {
            return Err(LibraryError::call("avcodec_open2", -22, "Invalid argument"));
        }
        codec.opened_flags = options.get("flags").map(str::to_string);
        for key in CODEC_OPTIONS {
            options.remove(key);
        }
        let mut record = lock(&self.record);
        let Some(target) = record.streams.get_mut(stream) else {
            return Err(LibraryError::call(
                "avcodec_parameters_from_context",
                -22,
                "Invalid argument",
            ));
        };
        target.media_type = Some(codec.media_type);
        target.codec = Some(codec.name.clone());
        record.codecs_opened.push(codec.name.clone());
        Ok(())
    }

    fn open_io(&mut self) -> Result<(), LibraryError> {
        if self.faults.open_io {
            return Err(LibraryError::call("avio_open", -13, "Permission denied"));
        }
        self.io_open = true;
        lock(&self.record).io_opened += 1;
        Ok(())
    }

    fn has_io(&self) -> bool {
        self.io_open
    }

    fn io_size(&self) -> Option<u64> {
        self.io_open.then(|| lock(&self.record).io_bytes)
    }

    fn close_io(&mut self) {
        if self.io_open {
            self.io_open = false;
            lock(&self.record).io_closed += 1;
        }
    }

    fn set_metadata(&mut self, key: &str, value: &str) {
        lock(&self.record)
            .metadata
            .push((key.to_string(), value.to_string()));
    }

    fn write_header(&mut self, options: &mut OptionDictionary) -> Result<(), LibraryError> {
        if self.faults.write_header {
            return Err(LibraryError::call("avformat_write_header", -22, "Invalid argument"));
        }
        let mut record = lock(&self.record);
        if record.streams.iter().any(|s| s.media_type.is_none()) {
            return Err(LibraryError::call(
                "avformat_write_header",
                -22,
                "stream has no codec parameters",
            ));
        }
        for key in FORMAT_OPTIONS {
            options.remove(key);
        }
        record.headers_written += 1;
        record.io_bytes += HEADER_BYTES;
        Ok(())
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), LibraryError> {
        if self.faults.write_packet {
            return Err(LibraryError::call("av_interleaved_write_frame", -5, "Input/output error"));
        }
        let mut record = lock(&self.record);
        if packet.stream_index >= record.streams.len() {
            return Err(LibraryError::call("av_interleaved_write_frame", -22, "Invalid argument"));
        }
        record.io_bytes += packet.size() as u64;
        record.packets.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), LibraryError> {
        if self.faults.write_trailer {
            return Err(LibraryError::call("av_write_trailer", -5, "Input/output error"));
        }
        let mut record = lock(&self.record);
        record.trailers_written += 1;
        record.io_bytes += TRAILER_BYTES;
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        lock(&self.record).writers_released += 1;
    }
}

pub struct MemoryCodec {
    name: String,
    media_type: MediaType,
    time_base: Rational,
    stats_in: Option<Vec<u8>>,
    stats_out: Option<Vec<u8>>,
    experimental: bool,
    color_space: ColorSpace,
    color_levels: ColorLevels,
    cleared_passes: Vec<EncodingPass>,
    opened_flags: Option<String>,
    record: SharedRecord,
}

impl MemoryCodec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stands in for the encoder producing rate-control statistics.
    pub fn set_stats_output(&mut self, stats: Option<Vec<u8>>) {
        self.stats_out = stats;
    }

    pub fn is_experimental(&self) -> bool {
        self.experimental
    }

    pub fn cleared_passes(&self) -> &[EncodingPass] {
        &self.cleared_passes
    }

    /// The `flags` option the codec was opened with.
    pub fn opened_flags(&self) -> Option<&str> {
        self.opened_flags.as_deref()
    }
}

impl CodecContext for MemoryCodec {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn set_time_base(&mut self, time_base: Rational) {
        self.time_base = time_base;
    }

    fn clear_pass_flag(&mut self, pass: EncodingPass) {
        self.cleared_passes.push(pass);
    }

    fn set_stats_input(&mut self, stats: Vec<u8>) {
        self.stats_in = Some(stats);
    }

    fn stats_input(&self) -> Option<Vec<u8>> {
        self.stats_in.clone()
    }

    fn stats_output(&self) -> Option<Vec<u8>> {
        self.stats_out.clone()
    }

    fn set_experimental(&mut self) {
        self.experimental = true;
    }

    fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    fn set_color_space(&mut self, space: ColorSpace) {
        self.color_space = space;
    }

    fn color_levels(&self) -> ColorLevels {
        self.color_levels
    }

    fn set_color_levels(&mut self, levels: ColorLevels) {
        self.color_levels = levels;
    }
}

impl Drop for MemoryCodec {
    fn drop(&mut self) {
        lock(&self.record).codecs_released += 1;
    }
}
