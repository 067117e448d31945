use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use ffmpeg_next::codec::{self, Compliance};
use ffmpeg_next::ffi;
use ffmpeg_next::{format, media, Dictionary};

use crate::muxing::domain::container_library::{
    CodecContext, ContainerLibrary, ContainerWriter, EncoderDescriptor, EncodingPass,
    FormatDescriptor, LibraryError,
};
use crate::muxing::domain::encoded_packet::EncodedPacket;
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::shared::colorspace::{ColorLevels, ColorSpace};
use crate::shared::constants::MAX_INTERLEAVE_DELAY_SECS;
use crate::shared::media_type::MediaType;
use crate::shared::rational::Rational;

const AVERROR_EINVAL: c_int = -22;

fn call_error(operation: &'static str, code: c_int) -> LibraryError {
    LibraryError::call(operation, code, ffmpeg_next::Error::from(code).to_string())
}

fn library_error(operation: &'static str, error: ffmpeg_next::Error) -> LibraryError {
    LibraryError::call(operation, c_int::from(error), error.to_string())
}

fn c_string(value: &str) -> Result<CString, LibraryError> {
    CString::new(value)
        .map_err(|_| LibraryError::Unsupported(format!("'{value}' contains a NUL byte")))
}

fn media_of(kind: media::Type) -> Option<MediaType> {
    match kind {
        media::Type::Video => Some(MediaType::Video),
        media::Type::Audio => Some(MediaType::Audio),
        _ => None,
    }
}

fn av_media(media: MediaType) -> media::Type {
    match media {
        MediaType::Video => media::Type::Video,
        MediaType::Audio => media::Type::Audio,
    }
}

fn describe_format(format: &format::Output) -> FormatDescriptor {
    // Default codec ids have no accessor on the safe wrapper.
    let (video, audio) = unsafe {
        let raw = &*format.as_ptr();
        (raw.video_codec, raw.audio_codec)
    };
    let codec_name = |id: ffi::AVCodecID| {
        let id = codec::Id::from(id);
        (id != codec::Id::None).then(|| id.name().to_string())
    };
    let flags = format.flags();
    FormatDescriptor {
        name: format.name().to_string(),
        long_name: format.description().to_string(),
        extensions: format
            .extensions()
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        default_video_codec: codec_name(video),
        default_audio_codec: codec_name(audio),
        needs_file: !flags.contains(format::Flags::NO_FILE),
        global_header: flags.contains(format::Flags::GLOBAL_HEADER),
    }
}

/// Frame rates an encoder is restricted to, if it lists any.
fn supported_frame_rates(codec: &ffmpeg_next::Codec) -> Option<Vec<Rational>> {
    let rates = unsafe { (*codec.as_ptr()).supported_framerates };
    if rates.is_null() {
        return None;
    }
    let mut list = Vec::new();
    let mut i = 0;
    loop {
        let rate = unsafe { *rates.add(i) };
        if rate.den == 0 {
            break;
        }
        list.push(Rational::new(rate.num, rate.den));
        i += 1;
    }
    Some(list)
}

fn pixel_name(format: format::Pixel) -> String {
    format
        .descriptor()
        .map(|d| d.name().to_string())
        .unwrap_or_default()
}

fn describe_encoder(codec: ffmpeg_next::Codec) -> EncoderDescriptor {
    let pixel_formats = codec
        .video()
        .ok()
        .and_then(|video| video.formats())
        .map(|formats| formats.map(pixel_name).collect());
    let sample_formats = codec
        .audio()
        .ok()
        .and_then(|audio| audio.formats())
        .map(|formats| formats.map(|f| f.name().to_string()).collect());
    EncoderDescriptor {
        name: codec.name().to_string(),
        long_name: codec.description().to_string(),
        media_type: media_of(codec.medium()),
        supported_frame_rates: supported_frame_rates(&codec),
        pixel_formats,
        sample_formats,
        experimental: codec
            .capabilities()
            .contains(codec::Capabilities::EXPERIMENTAL),
    }
}

/// Copies `options` into a library dictionary, refusing entries the C side
/// could not represent.
fn to_dictionary(options: &OptionDictionary) -> Result<Dictionary<'static>, LibraryError> {
    let mut dict = Dictionary::new();
    for (key, value) in options.iter() {
        if key.contains('\0') || value.contains('\0') {
            return Err(LibraryError::Unsupported(format!(
                "option '{key}' contains a NUL byte"
            )));
        }
        dict.set(key, value);
    }
    Ok(dict)
}

/// Reads back the entries the library did not consume.
fn from_dictionary(dict: &Dictionary) -> OptionDictionary {
    let mut left = OptionDictionary::new();
    for (key, value) in dict.iter() {
        left.set(key, Some(value), false);
    }
    left
}

/// Container/codec library backed by the linked FFmpeg libraries.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegLibrary;

impl FfmpegLibrary {
    pub fn new() -> Result<Self, LibraryError> {
        ffmpeg_next::init().map_err(|e| library_error("ffmpeg init", e))?;
        Ok(Self)
    }

    fn lookup_format(name: Option<&str>, filename: &str) -> Option<format::Output> {
        let filename = CString::new(filename).ok()?;
        let name = name.map(CString::new).transpose().ok()?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());
        let raw = unsafe { ffi::av_guess_format(name_ptr, filename.as_ptr(), ptr::null()) };
        (!raw.is_null()).then(|| unsafe { format::Output::wrap(raw as _) })
    }
}

impl ContainerLibrary for FfmpegLibrary {
    type Writer = FfmpegWriter;

    fn find_format(&self, name: Option<&str>, filename: &str) -> Option<FormatDescriptor> {
        Self::lookup_format(name, filename).map(|format| describe_format(&format))
    }

    fn find_encoder(&self, name: &str) -> Option<EncoderDescriptor> {
        ffmpeg_next::encoder::find_by_name(name).map(describe_encoder)
    }

    fn default_encoder(
        &self,
        format: &FormatDescriptor,
        filename: &str,
        media: MediaType,
    ) -> Option<EncoderDescriptor> {
        let av_format = Self::lookup_format(Some(&format.name), filename)?;
        let id = av_format.codec(&filename, av_media(media));
        ffmpeg_next::encoder::find(id).map(describe_encoder)
    }

    fn create_writer(
        &self,
        format: &FormatDescriptor,
        url: &str,
    ) -> Result<FfmpegWriter, LibraryError> {
        let av_format = Self::lookup_format(Some(&format.name), url).ok_or_else(|| {
            LibraryError::Unsupported(format!("muxer {} is not available", format.name))
        })?;
        let url_c = c_string(url)?;
        // `format::output_as` opens the file immediately; the session opens
        // it only once every stream is set up, so allocate without I/O.
        let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut ctx,
                av_format.as_ptr() as _,
                ptr::null(),
                url_c.as_ptr(),
            )
        };
        if ret < 0 || ctx.is_null() {
            return Err(call_error("avformat_alloc_output_context2", ret));
        }
        let mut output = unsafe { format::context::Output::wrap(ctx) };
        unsafe {
            (*output.as_mut_ptr()).max_delay =
                (MAX_INTERLEAVE_DELAY_SECS * ffi::AV_TIME_BASE as f64) as c_int;
        }
        Ok(FfmpegWriter {
            output,
            url: url_c,
            needs_file: format.needs_file,
            metadata: Dictionary::new(),
        })
    }

    fn muxers(&self) -> Vec<FormatDescriptor> {
        let mut list = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();
        loop {
            let raw = unsafe { ffi::av_muxer_iterate(&mut opaque) };
            if raw.is_null() {
                break;
            }
            list.push(describe_format(&unsafe { format::Output::wrap(raw as _) }));
        }
        list
    }

    fn encoders(&self) -> Vec<EncoderDescriptor> {
        let mut list = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();
        loop {
            let raw = unsafe { ffi::av_codec_iterate(&mut opaque) };
            if raw.is_null() {
                break;
            }
            let codec = unsafe { ffmpeg_next::Codec::wrap(raw as _) };
            if codec.is_encoder() {
                list.push(describe_encoder(codec));
            }
        }
        list
    }
}

/// An output context being muxed into.
pub struct FfmpegWriter {
    output: format::context::Output,
    url: CString,
    needs_file: bool,
    metadata: Dictionary<'static>,
}

// Safety: FfmpegWriter owns its format context and metadata exclusively and
// is only used from one thread at a time.
unsafe impl Send for FfmpegWriter {}

impl ContainerWriter for FfmpegWriter {
    type Codec = FfmpegCodec;

    fn stream_count(&self) -> usize {
        self.output.nb_streams() as usize
    }

    fn new_stream(&mut self) -> Result<usize, LibraryError> {
        let stream = self
            .output
            .add_stream(ffmpeg_next::encoder::find(codec::Id::None))
            .map_err(|e| library_error("avformat_new_stream", e))?;
        Ok(stream.index())
    }

    fn set_stream_time_base(&mut self, index: usize, time_base: Rational) {
        if let Some(mut stream) = self.output.stream_mut(index) {
            stream.set_time_base(time_base);
        }
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.output
            .stream(index)
            .map(|stream| stream.time_base().into())
    }

    fn alloc_codec(&mut self, encoder: &EncoderDescriptor) -> Result<FfmpegCodec, LibraryError> {
        let media_type = encoder.media_type.ok_or_else(|| {
            LibraryError::Unsupported(format!("{} is neither audio nor video", encoder.name))
        })?;
        let codec = ffmpeg_next::encoder::find_by_name(&encoder.name).ok_or_else(|| {
            LibraryError::Unsupported(format!("encoder {} is not available", encoder.name))
        })?;
        let encoder = codec::context::Context::new_with_codec(codec).encoder();
        Ok(FfmpegCodec {
            encoder,
            codec,
            media_type,
            stats_in: None,
        })
    }

    fn open_codec(
        &mut self,
        index: usize,
        codec: &mut FfmpegCodec,
        options: &mut OptionDictionary,
    ) -> Result<(), LibraryError> {
        if index >= self.stream_count() {
            return Err(LibraryError::call(
                "avcodec_parameters_from_context",
                AVERROR_EINVAL,
                "no such stream",
            ));
        }
        // The safe `open_with` drops the dictionary the encoder leaves behind,
        // which is how unknown options get reported.
        let mut dict = unsafe { to_dictionary(options)?.disown() };
        let ret = unsafe {
            ffi::avcodec_open2(codec.encoder.as_mut_ptr(), codec.codec.as_ptr(), &mut dict)
        };
        *options = from_dictionary(&unsafe { Dictionary::own(dict) });
        if ret < 0 {
            return Err(call_error("avcodec_open2", ret));
        }
        if let Some(mut stream) = self.output.stream_mut(index) {
            stream.set_parameters(&codec.encoder);
        }
        Ok(())
    }

    fn open_io(&mut self) -> Result<(), LibraryError> {
        let ret = unsafe {
            ffi::avio_open(
                &mut (*self.output.as_mut_ptr()).pb,
                self.url.as_ptr(),
                ffi::AVIO_FLAG_WRITE as c_int,
            )
        };
        if ret < 0 {
            return Err(call_error("avio_open", ret));
        }
        Ok(())
    }

    fn has_io(&self) -> bool {
        unsafe { !(*self.output.as_ptr()).pb.is_null() }
    }

    fn io_size(&self) -> Option<u64> {
        if !self.has_io() {
            return None;
        }
        let size = unsafe { ffi::avio_size((*self.output.as_ptr()).pb) };
        u64::try_from(size).ok()
    }

    fn close_io(&mut self) {
        if self.needs_file && self.has_io() {
            unsafe { ffi::avio_closep(&mut (*self.output.as_mut_ptr()).pb) };
        }
    }

    fn set_metadata(&mut self, key: &str, value: &str) {
        if key.contains('\0') || value.contains('\0') {
            log::warn!("skipping metadata entry '{key}' with an embedded NUL");
            return;
        }
        self.metadata.set(key, value);
    }

    fn write_header(&mut self, options: &mut OptionDictionary) -> Result<(), LibraryError> {
        let dict = to_dictionary(options)?;
        let metadata = std::mem::replace(&mut self.metadata, Dictionary::new());
        self.output.set_metadata(metadata);
        let left = self
            .output
            .write_header_with(dict)
            .map_err(|e| library_error("avformat_write_header", e))?;
        *options = from_dictionary(&left);
        Ok(())
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), LibraryError> {
        let mut av_packet = ffmpeg_next::Packet::copy(&packet.data);
        av_packet.set_stream(packet.stream_index);
        av_packet.set_pts(packet.pts);
        av_packet.set_dts(packet.dts);
        av_packet.set_duration(packet.duration);
        if packet.keyframe {
            av_packet.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        av_packet
            .write_interleaved(&mut self.output)
            .map_err(|e| library_error("av_interleaved_write_frame", e))
    }

    fn write_trailer(&mut self) -> Result<(), LibraryError> {
        self.output
            .write_trailer()
            .map_err(|e| library_error("av_write_trailer", e))
    }
}

/// An encoder context plus the producer-side helpers needed to feed it.
pub struct FfmpegCodec {
    encoder: codec::encoder::Encoder,
    codec: ffmpeg_next::Codec,
    media_type: MediaType,
    stats_in: Option<CString>,
}

// Safety: the codec context is owned exclusively and never shared between
// threads concurrently.
unsafe impl Send for FfmpegCodec {}

impl FfmpegCodec {
    fn raw(&self) -> &ffi::AVCodecContext {
        unsafe { &*self.encoder.as_ptr() }
    }

    fn raw_mut(&mut self) -> &mut ffi::AVCodecContext {
        unsafe { &mut *self.encoder.as_mut_ptr() }
    }

    pub fn configure_video(&mut self, width: u32, height: u32, format: format::Pixel) {
        let raw = self.raw_mut();
        raw.width = width as c_int;
        raw.height = height as c_int;
        raw.pix_fmt = format.into();
        raw.framerate = ffi::AVRational {
            num: raw.time_base.den,
            den: raw.time_base.num,
        };
    }

    /// Sets rate and channel count and picks the encoder's preferred sample
    /// format.
    pub fn configure_audio(&mut self, sample_rate: u32, channels: u32) -> format::Sample {
        let preferred = self
            .codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(format::Sample::F32(format::sample::Type::Planar));
        let raw = self.raw_mut();
        raw.sample_rate = sample_rate as c_int;
        unsafe { ffi::av_channel_layout_default(&mut raw.ch_layout, channels as c_int) };
        raw.sample_fmt = preferred.into();
        preferred
    }

    /// Samples per audio frame the encoder expects, 0 when it accepts any.
    pub fn frame_size(&self) -> usize {
        self.raw().frame_size.max(0) as usize
    }

    pub fn sample_format(&self) -> format::Sample {
        self.raw().sample_fmt.into()
    }

    pub fn channels(&self) -> usize {
        self.raw().ch_layout.nb_channels.max(0) as usize
    }

    /// Allocates an audio frame matching the opened encoder's layout.
    pub fn new_audio_frame(
        &self,
        samples: usize,
    ) -> Result<ffmpeg_next::frame::Audio, LibraryError> {
        let ctx = self.raw();
        let mut frame = ffmpeg_next::frame::Audio::empty();
        unsafe {
            let raw = frame.as_mut_ptr();
            (*raw).format = ctx.sample_fmt as c_int;
            (*raw).nb_samples = samples as c_int;
            (*raw).sample_rate = ctx.sample_rate;
            let ret = ffi::av_channel_layout_copy(&mut (*raw).ch_layout, &ctx.ch_layout);
            if ret < 0 {
                return Err(call_error("av_channel_layout_copy", ret));
            }
            let ret = ffi::av_frame_get_buffer(raw, 0);
            if ret < 0 {
                return Err(call_error("av_frame_get_buffer", ret));
            }
        }
        Ok(frame)
    }

    /// Feeds one frame to the encoder, or starts draining with `None`.
    pub fn send_frame(&mut self, frame: Option<&ffmpeg_next::Frame>) -> Result<(), LibraryError> {
        match frame {
            Some(frame) => self.encoder.send_frame(frame),
            None => self.encoder.send_eof(),
        }
        .map_err(|e| library_error("avcodec_send_frame", e))
    }

    /// Pulls the next packet, or `None` when the encoder needs more input or
    /// is fully drained.
    pub fn receive_packet(
        &mut self,
        stream_index: usize,
    ) -> Result<Option<EncodedPacket>, LibraryError> {
        let mut packet = ffmpeg_next::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                return Ok(None)
            }
            Err(e) => return Err(library_error("avcodec_receive_packet", e)),
        }
        Ok(Some(EncodedPacket {
            stream_index,
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            keyframe: packet.is_key(),
            data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
        }))
    }
}

fn av_color_space(space: ColorSpace) -> ffi::AVColorSpace {
    use ffi::AVColorSpace::*;
    match space {
        ColorSpace::Auto => AVCOL_SPC_UNSPECIFIED,
        ColorSpace::Bt601 => AVCOL_SPC_BT470BG,
        ColorSpace::Bt709 => AVCOL_SPC_BT709,
        ColorSpace::Smpte240m => AVCOL_SPC_SMPTE240M,
        ColorSpace::Rgb => AVCOL_SPC_RGB,
        ColorSpace::Ycgco => AVCOL_SPC_YCGCO,
        ColorSpace::Bt2020Ncl => AVCOL_SPC_BT2020_NCL,
        ColorSpace::Bt2020Cl => AVCOL_SPC_BT2020_CL,
    }
}

fn color_space_of(space: ffi::AVColorSpace) -> ColorSpace {
    use ffi::AVColorSpace::*;
    match space {
        AVCOL_SPC_BT470BG | AVCOL_SPC_SMPTE170M => ColorSpace::Bt601,
        AVCOL_SPC_BT709 => ColorSpace::Bt709,
        AVCOL_SPC_SMPTE240M => ColorSpace::Smpte240m,
        AVCOL_SPC_RGB => ColorSpace::Rgb,
        AVCOL_SPC_YCGCO => ColorSpace::Ycgco,
        AVCOL_SPC_BT2020_NCL => ColorSpace::Bt2020Ncl,
        AVCOL_SPC_BT2020_CL => ColorSpace::Bt2020Cl,
        _ => ColorSpace::Auto,
    }
}

fn av_color_range(levels: ColorLevels) -> ffi::AVColorRange {
    match levels {
        ColorLevels::Auto => ffi::AVColorRange::AVCOL_RANGE_UNSPECIFIED,
        ColorLevels::Limited => ffi::AVColorRange::AVCOL_RANGE_MPEG,
        ColorLevels::Full => ffi::AVColorRange::AVCOL_RANGE_JPEG,
    }
}

/// Stats bytes as the encoder reads them: everything before the first NUL.
fn stats_c_string(mut stats: Vec<u8>) -> CString {
    if let Some(end) = stats.iter().position(|&b| b == 0) {
        stats.truncate(end);
    }
    CString::new(stats).unwrap_or_default()
}

impl CodecContext for FfmpegCodec {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn time_base(&self) -> Rational {
        ffmpeg_next::Rational::from(self.raw().time_base).into()
    }

    fn set_time_base(&mut self, time_base: Rational) {
        self.encoder.set_time_base(time_base);
    }

    fn clear_pass_flag(&mut self, pass: EncodingPass) {
        let flag = match pass {
            EncodingPass::First => ffi::AV_CODEC_FLAG_PASS1,
            EncodingPass::Second => ffi::AV_CODEC_FLAG_PASS2,
        };
        self.raw_mut().flags &= !(flag as c_int);
    }

    fn set_stats_input(&mut self, stats: Vec<u8>) {
        let stats = stats_c_string(stats);
        // The CString is kept alive in `stats_in` for as long as the
        // context points at it.
        self.raw_mut().stats_in = stats.as_ptr() as *mut c_char;
        self.stats_in = Some(stats);
    }

    fn stats_input(&self) -> Option<Vec<u8>> {
        self.stats_in.as_ref().map(|s| s.as_bytes().to_vec())
    }

    fn stats_output(&self) -> Option<Vec<u8>> {
        let out = self.raw().stats_out;
        if out.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(out) }.to_bytes().to_vec())
    }

    fn set_experimental(&mut self) {
        self.encoder.compliance(Compliance::Experimental);
    }

    fn color_space(&self) -> ColorSpace {
        color_space_of(self.raw().colorspace)
    }

    fn set_color_space(&mut self, space: ColorSpace) {
        self.raw_mut().colorspace = av_color_space(space);
    }

    fn color_levels(&self) -> ColorLevels {
        match self.raw().color_range {
            ffi::AVColorRange::AVCOL_RANGE_MPEG => ColorLevels::Limited,
            ffi::AVColorRange::AVCOL_RANGE_JPEG => ColorLevels::Full,
            _ => ColorLevels::Auto,
        }
    }

    fn set_color_levels(&mut self, levels: ColorLevels) {
        self.raw_mut().color_range = av_color_range(levels);
    }
}

impl Drop for FfmpegCodec {
    fn drop(&mut self) {
        // libavcodec must not free the buffer owned by `stats_in`.
        if self.stats_in.is_some() {
            self.raw_mut().stats_in = ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn library() -> FfmpegLibrary {
        FfmpegLibrary::new().unwrap()
    }

    #[test]
    fn test_color_space_mapping_round_trips() {
        for space in [
            ColorSpace::Bt601,
            ColorSpace::Bt709,
            ColorSpace::Smpte240m,
            ColorSpace::Rgb,
            ColorSpace::Ycgco,
            ColorSpace::Bt2020Ncl,
            ColorSpace::Bt2020Cl,
        ] {
            assert_eq!(color_space_of(av_color_space(space)), space);
        }
        assert_eq!(
            color_space_of(ffi::AVColorSpace::AVCOL_SPC_UNSPECIFIED),
            ColorSpace::Auto
        );
    }

    #[test]
    fn test_dictionary_round_trip_keeps_order() {
        let mut options = OptionDictionary::new();
        options.apply(None, "b=1M");
        options.apply(None, "flags=+pass1");
        let dict = to_dictionary(&options).unwrap();
        assert_eq!(from_dictionary(&dict), options);
    }

    #[test]
    fn test_dictionary_refuses_embedded_nul() {
        let mut options = OptionDictionary::new();
        options.apply(None, "title=a\0b");
        assert!(matches!(
            to_dictionary(&options),
            Err(LibraryError::Unsupported(_))
        ));
    }

    #[rstest]
    #[case::plain(b"S1\nS2\n".to_vec(), b"S1\nS2\n".to_vec())]
    #[case::non_utf8(b"S1 \xff\n".to_vec(), b"S1 \xff\n".to_vec())]
    #[case::embedded_nul(b"S1\n\0S2\n".to_vec(), b"S1\n".to_vec())]
    fn test_stats_c_string(#[case] stats: Vec<u8>, #[case] expected: Vec<u8>) {
        assert_eq!(stats_c_string(stats).as_bytes(), expected.as_slice());
    }

    #[test]
    #[ignore = "needs FFmpeg shared libraries"]
    fn test_guesses_matroska_from_extension() {
        let format = library().find_format(None, "out.mkv").unwrap();
        assert_eq!(format.name, "matroska");
        assert!(format.needs_file);
        assert!(format.global_header);
    }

    #[test]
    #[ignore = "needs FFmpeg shared libraries"]
    fn test_mpeg2video_lists_frame_rates() {
        let encoder = library().find_encoder("mpeg2video").unwrap();
        assert_eq!(encoder.media_type, Some(MediaType::Video));
        let rates = encoder.supported_frame_rates.unwrap();
        assert!(rates.contains(&Rational::new(25, 1)));
    }

    #[test]
    #[ignore = "needs FFmpeg shared libraries"]
    fn test_stats_input_survives_as_bytes() {
        let lib = library();
        let format = lib.find_format(None, "out.mkv").unwrap();
        let encoder = lib.find_encoder("mpeg4").unwrap();
        let mut writer = lib.create_writer(&format, "out.mkv").unwrap();
        let mut codec = writer.alloc_codec(&encoder).unwrap();
        codec.set_stats_input(b"S1 \xff\n".to_vec());
        assert_eq!(codec.stats_input().unwrap(), b"S1 \xff\n");
    }

    #[test]
    #[ignore = "needs FFmpeg shared libraries"]
    fn test_writes_header_and_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mkv");
        let url = path.to_str().unwrap();
        let lib = library();
        let format = lib.find_format(None, url).unwrap();
        let encoder = lib.find_encoder("mpeg4").unwrap();

        let mut writer = lib.create_writer(&format, url).unwrap();
        let index = writer.new_stream().unwrap();
        writer.set_stream_time_base(index, Rational::new(1, 25));
        let mut codec = writer.alloc_codec(&encoder).unwrap();
        codec.set_time_base(Rational::new(1, 25));
        codec.configure_video(64, 48, format::Pixel::YUV420P);
        let mut options = OptionDictionary::new();
        options.apply(None, "bogus_key=1");
        writer.open_codec(index, &mut codec, &mut options).unwrap();
        assert!(options.contains_key("bogus_key"));

        writer.set_metadata("title", "clip");
        writer.open_io().unwrap();
        let mut header_options = OptionDictionary::new();
        header_options.apply(None, "unknown_muxer_key=1");
        writer.write_header(&mut header_options).unwrap();
        assert!(header_options.contains_key("unknown_muxer_key"));
        writer.write_trailer().unwrap();
        assert!(writer.io_size().unwrap() > 0);
        writer.close_io();
        drop(codec);
        drop(writer);
        assert!(path.exists());
    }
}
