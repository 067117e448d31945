use std::sync::Arc;

use log::{debug, error, info, trace, warn};

use super::header_state::HeaderState;
use super::session_error::{describe, SessionError, TerminalState};
use super::session_hints::SessionHints;
use super::status::StatusSnapshot;
use super::stream_slot::{StreamHandle, StreamSlot};
use super::timebase::negotiate_frame_rate;
use super::two_pass;
use crate::muxing::domain::container_library::{
    CodecContext, ContainerLibrary, ContainerWriter, EncoderDescriptor, FormatDescriptor,
};
use crate::muxing::domain::encoded_packet::EncodedPacket;
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::muxing::domain::stats_storage::StatsStorage;
use crate::shared::colorspace::{ColorLevels, ColorSpace};
use crate::shared::constants::{FLAGS_KEY, GLOBAL_QUALITY_KEY};
use crate::shared::encode_options::{split_candidates, EncodeOptions};
use crate::shared::media_type::{MediaType, PerMedia};
use crate::shared::metadata::Tags;
use crate::shared::output_target::resolve_output_url;
use crate::shared::rational::Rational;

fn experimental_banner(media: MediaType, codec: &str) -> String {
    let (kind, symptoms) = match media {
        MediaType::Video => ("VIDEO", "Bad picture quality, blocks, blurriness."),
        MediaType::Audio => (
            "AUDIO",
            "Bad sound quality, noise, clicking, whistles, choppiness.",
        ),
    };
    let option = media.options_name();
    format!(
        "\n\n\
         \x20          ********************************************\n\
         \x20          **** Experimental {kind} codec selected! ****\n\
         \x20          ********************************************\n\n\
         This means the output file may be broken or bad.\n\
         Possible reasons, problems, workarounds:\n\
         - Codec implementation in the codec library is not finished yet.\n\
         \x20    Try updating the codec library.\n\
         - {symptoms}\n\
         \x20    Experiment with codec settings (--{option}) to maybe still get the\n\
         \x20    desired quality output at the expense of bitrate.\n\
         - Slow compression.\n\
         \x20    Bear with it.\n\
         - Crashes.\n\
         \x20    Happens. Try varying options to work around.\n\
         If none of this helps you, try another codec in place of {codec}.\n"
    )
}

/// Owns one output container and the (at most two) streams encoded into it.
///
/// Stream allocation, codec opening, header writing and `finish` must be
/// called from a single control thread. `write_frame` may be driven by one
/// producer per media type, and [`SessionHints`] can be cloned freely into
/// producer threads.
///
/// Once the session has failed or finished, every guarded operation
/// returns [`SessionError::Terminated`] without side effects.
pub struct EncodeSession<W: ContainerWriter> {
    options: Arc<EncodeOptions>,
    url: String,
    format: FormatDescriptor,
    writer: Option<W>,
    encoders: PerMedia<Option<EncoderDescriptor>>,
    /// Container stream reserved for each media type, placeholder or not.
    stream_index: PerMedia<Option<usize>>,
    slots: PerMedia<Option<StreamSlot<W::Codec>>>,
    time_base: Option<Rational>,
    header_state: HeaderState,
    format_options: Option<OptionDictionary>,
    metadata: Tags,
    stats_storage: Arc<dyn StatsStorage>,
    hints: SessionHints,
}

impl<W: ContainerWriter> EncodeSession<W> {
    /// Resolves the container format and the encoders for `options` and
    /// creates the container writer.
    pub fn new<L>(
        options: Arc<EncodeOptions>,
        library: &L,
        stats_storage: Arc<dyn StatsStorage>,
    ) -> Result<Self, SessionError>
    where
        L: ContainerLibrary<Writer = W>,
    {
        let url = resolve_output_url(&options.file);

        let Some(format) = resolve_format(library, &options, &url) else {
            error!("{}", SessionError::FormatNotFound);
            return Err(SessionError::FormatNotFound);
        };

        let encoders = PerMedia::new(
            resolve_encoder(library, &options, &format, &url, MediaType::Video),
            resolve_encoder(library, &options, &format, &url, MediaType::Audio),
        );
        if encoders.video.is_none() && encoders.audio.is_none() {
            error!("{}", SessionError::NoUsableCodec);
            return Err(SessionError::NoUsableCodec);
        }

        let writer = library.create_writer(&format, &url).map_err(|source| {
            let err = SessionError::WriterCreate(source);
            error!("{}", describe(&err));
            err
        })?;

        let format_options = OptionDictionary::from_entries(&options.format_options, "");

        let mut metadata = Tags::new();
        metadata.apply_edits(&options.set_metadata, &options.remove_metadata);

        Ok(Self {
            options,
            url,
            format,
            writer: Some(writer),
            encoders,
            stream_index: PerMedia::default(),
            slots: PerMedia::default(),
            time_base: None,
            header_state: HeaderState::NotStarted,
            format_options: Some(format_options),
            metadata,
            stats_storage,
            hints: SessionHints::new(),
        })
    }

    /// Cloneable handle for producer threads.
    pub fn hints(&self) -> SessionHints {
        self.hints.clone()
    }

    pub fn did_fail(&self) -> bool {
        self.hints.did_fail()
    }

    pub fn status(&self, fraction: f32) -> Result<StatusSnapshot, SessionError> {
        self.hints.status(fraction)
    }

    pub fn set_video_fps(&self, fps: f32) {
        self.hints.set_video_fps(fps);
    }

    pub fn set_audio_pts(&self, pts: f64) {
        self.hints.set_audio_pts(pts);
    }

    pub fn declare_expected_stream(&self, media: MediaType) -> Result<(), SessionError> {
        self.hints.declare_expected_stream(media)
    }

    pub fn signal_discontinuity(&self) -> Result<(), SessionError> {
        self.hints.signal_discontinuity()
    }

    pub fn header_state(&self) -> HeaderState {
        self.header_state
    }

    /// The time base shared by every stream, once negotiated.
    pub fn time_base(&self) -> Option<Rational> {
        self.time_base
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn output_format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn encoder(&self, media: MediaType) -> Option<&EncoderDescriptor> {
        self.encoders.get(media).as_ref()
    }

    pub fn metadata(&self) -> &Tags {
        &self.metadata
    }

    pub fn codec(&self, media: MediaType) -> Option<&W::Codec> {
        self.slots.get(media).as_ref()?.codec.as_ref()
    }

    /// Codec of an allocated stream, for the producer to configure before
    /// [`open_codec`](Self::open_codec) and to drive while encoding.
    pub fn codec_mut(&mut self, media: MediaType) -> Option<&mut W::Codec> {
        self.slots.get_mut(media).as_mut()?.codec.as_mut()
    }

    /// Time base the container settled on for `handle`'s stream.
    pub fn stream_time_base(&self, handle: StreamHandle) -> Option<Rational> {
        self.writer.as_ref()?.stream_time_base(handle.index)
    }

    pub fn is_available(&self) -> bool {
        self.hints.guard().is_ok() && self.writer.is_some()
    }

    pub fn supports_pixel_format(&self, name: &str) -> bool {
        if self.hints.guard().is_err() || name.is_empty() {
            return false;
        }
        match self.encoders.video.as_ref() {
            None => false,
            Some(encoder) => match encoder.pixel_formats.as_ref() {
                None => true,
                Some(list) => list.iter().any(|f| f == name),
            },
        }
    }

    /// Seconds added to the presentation timestamps of `media`.
    pub fn presentation_offset(&self, media: MediaType) -> f64 {
        if self.hints.guard().is_err() {
            return 0.0;
        }
        self.options.offset(media)
    }

    /// Replaces the output tags. Input tags are only carried over when
    /// metadata copying is on; the configured edits are applied on top.
    pub fn set_metadata(&mut self, source: Option<Tags>) -> Result<(), SessionError> {
        self.hints.guard()?;
        let mut metadata = match source {
            Some(tags) if self.options.copy_metadata => tags,
            _ => Tags::new(),
        };
        for (key, value) in &self.options.set_metadata {
            debug!("setting metadata value '{value}' for key '{key}'");
        }
        for key in &self.options.remove_metadata {
            debug!("removing metadata key '{key}'");
        }
        metadata.apply_edits(&self.options.set_metadata, &self.options.remove_metadata);
        self.metadata = metadata;
        Ok(())
    }

    /// Creates the stream and codec for `media`.
    ///
    /// Returns [`SessionError::NoStream`] without failing the session when
    /// no encoder exists and none was wanted for this output.
    pub fn alloc_stream(&mut self, media: MediaType) -> Result<StreamHandle, SessionError> {
        self.hints.guard()?;
        if self.header_state.attempted() {
            return Err(SessionError::HeaderAlreadyStarted);
        }
        if self.slots.get(media).is_some() {
            return Err(SessionError::StreamExists(media));
        }

        let Some(encoder) = self.encoders.get(media).clone() else {
            if self.format.default_codec(media).is_some() || self.options.requests_codec(media) {
                return Err(self.fail_with(SessionError::EncoderNotFound(media)));
            }
            return Err(SessionError::NoStream(media));
        };

        match self.build_slot(media, &encoder) {
            Ok(handle) => Ok(handle),
            Err(err) => Err(self.fail_with(err)),
        }
    }

    fn negotiated_time_base(&mut self) -> Rational {
        if let Some(time_base) = self.time_base {
            return time_base;
        }
        let supported = self
            .encoders
            .video
            .as_ref()
            .and_then(|e| e.supported_frame_rates.as_deref());
        let rate = negotiate_frame_rate(
            self.options.fps,
            self.options.auto_fps,
            self.hints.reported_fps(),
            supported,
        );
        let time_base = rate.invert();
        self.time_base = Some(time_base);
        time_base
    }

    fn build_slot(
        &mut self,
        media: MediaType,
        encoder: &EncoderDescriptor,
    ) -> Result<StreamHandle, SessionError> {
        let time_base = self.negotiated_time_base();
        let Some(writer) = self.writer.as_mut() else {
            return Err(SessionError::Terminated(TerminalState::Finished));
        };
        let stream_alloc = |source| SessionError::StreamAlloc { media, source };

        let other = media.other();
        let other_first = match media {
            MediaType::Video => self.options.audio_first,
            MediaType::Audio => self.options.video_first,
        };
        if writer.stream_count() == 0 && other_first {
            info!(
                "{}: preallocated {other} stream for later use",
                media.log_prefix()
            );
            let placeholder = writer.new_stream().map_err(stream_alloc)?;
            *self.stream_index.get_mut(other) = Some(placeholder);
        }

        let index = match *self.stream_index.get(media) {
            Some(index) => index,
            None => {
                let index = writer.new_stream().map_err(stream_alloc)?;
                *self.stream_index.get_mut(media) = Some(index);
                index
            }
        };

        writer.set_stream_time_base(index, time_base);
        let mut codec = writer.alloc_codec(encoder).map_err(stream_alloc)?;
        codec.set_time_base(time_base);

        let mut options =
            OptionDictionary::from_entries(self.options.codec_options(media), media.log_prefix());
        if options.contains_key(GLOBAL_QUALITY_KEY) {
            options.apply(Some(FLAGS_KEY), "+qscale");
        }
        if self.format.global_header {
            options.apply(Some(FLAGS_KEY), "+global_header");
        }

        let stats = two_pass::prepare(
            &self.url,
            media,
            &mut options,
            &mut codec,
            self.stats_storage.as_ref(),
        );

        let handle = StreamHandle { media, index };
        let mut slot = StreamSlot::new(handle, codec, options);
        slot.stats = stats;
        *self.slots.get_mut(media) = Some(slot);
        Ok(handle)
    }

    /// Opens the codec of `handle` with its options and copies its
    /// parameters onto the container stream. Opening twice is a no-op.
    pub fn open_codec(&mut self, handle: StreamHandle) -> Result<(), SessionError> {
        self.hints.guard()?;
        let media = handle.media;
        let Some(encoder) = self.encoders.get(media).as_ref() else {
            return Err(SessionError::NoStream(media));
        };
        let Some(slot) = self.slots.get_mut(media).as_mut() else {
            return Err(SessionError::NoStream(media));
        };
        if slot.handle != handle {
            return Err(SessionError::WrongStream {
                media,
                expected: slot.handle.index,
                actual: handle.index,
            });
        }
        if slot.opened {
            return Ok(());
        }
        let (Some(codec), Some(writer)) = (slot.codec.as_mut(), self.writer.as_mut()) else {
            return Err(SessionError::Terminated(TerminalState::Finished));
        };

        info!(
            "Opening {media} encoder: {} [{}]",
            encoder.long_name, encoder.name
        );
        if encoder.experimental {
            codec.set_experimental();
            warn!("{}", experimental_banner(media, &encoder.name));
        }

        let mut options = slot.options.take().unwrap_or_default();
        let result = writer.open_codec(handle.index, codec, &mut options);
        for key in options.keys() {
            warn!("{}: key '{key}' not found.", media.options_name());
        }
        slot.opened = result.is_ok();

        result.map_err(|source| self.fail_with(SessionError::CodecOpen(media, source)))
    }

    /// Writes the container header. Succeeds again without side effects
    /// once the header is written; a failed attempt is never retried.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.hints.guard()?;
        match self.header_state {
            HeaderState::Started => return Ok(()),
            HeaderState::StartFailed => return Err(SessionError::HeaderStartFailed),
            HeaderState::NotStarted => {}
        }

        for &media in MediaType::ALL {
            let wanted =
                self.format.default_codec(media).is_some() || self.options.requests_codec(media);
            if self.hints.expects(media) && self.slots.get(media).is_none() && wanted {
                return Err(self.fail_with(SessionError::ExpectedStreamMissing(media)));
            }
        }

        self.header_state = HeaderState::StartFailed;
        if let Err(err) = self.write_header() {
            return Err(self.fail_with(err));
        }
        self.header_state = HeaderState::Started;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), SessionError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(SessionError::Terminated(TerminalState::Finished));
        };

        if self.format.needs_file {
            info!("Opening output file: {}", self.url);
            writer.open_io().map_err(|source| SessionError::OutputOpen {
                url: self.url.clone(),
                source,
            })?;
        }

        self.hints.restart_clock();
        info!(
            "Opening muxer: {} [{}]",
            self.format.long_name, self.format.name
        );

        for (key, value) in self.metadata.iter() {
            writer.set_metadata(key, value);
        }

        let mut format_options = self.format_options.take().unwrap_or_default();
        writer
            .write_header(&mut format_options)
            .map_err(SessionError::HeaderWrite)?;
        for key in format_options.keys() {
            warn!("ofopts: key '{key}' not found.");
        }
        self.hints.set_output_size(writer.io_size());
        Ok(())
    }

    /// Appends the statistics the codec of `handle` produced last to its
    /// pass-1 log.
    pub fn write_stats(&mut self, handle: StreamHandle) -> Result<(), SessionError> {
        self.hints.guard()?;
        if let Some(slot) = self.slots.get_mut(handle.media).as_mut() {
            slot.write_stats();
        }
        Ok(())
    }

    /// Hands `packet` to the muxer. A write error is returned but does not
    /// fail the session.
    pub fn write_frame(
        &mut self,
        handle: StreamHandle,
        packet: EncodedPacket,
    ) -> Result<(), SessionError> {
        self.hints.guard()?;
        let Some(slot) = self.slots.get(handle.media).as_ref() else {
            error!("Called write_frame on a {} stream that was never allocated", handle.media);
            return Err(SessionError::NoStream(handle.media));
        };
        let expected = slot.handle.index;
        if slot.handle != handle || packet.stream_index != expected {
            error!("Called write_frame on the wrong stream");
            let actual = if packet.stream_index != expected {
                packet.stream_index
            } else {
                handle.index
            };
            return Err(SessionError::WrongStream {
                media: handle.media,
                expected,
                actual,
            });
        }
        if !self.header_state.is_started() {
            return Err(SessionError::HeaderNotStarted);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(SessionError::Terminated(TerminalState::Finished));
        };

        let time_base = writer
            .stream_time_base(handle.index)
            .or(self.time_base)
            .unwrap_or(Rational::new(0, 1));
        trace!(
            "write frame: stream {} pts {:?} ({:.3}) dts {:?} ({:.3}) size {}",
            packet.stream_index,
            packet.pts,
            time_base.ticks_to_seconds(packet.pts.unwrap_or(0)),
            packet.dts,
            time_base.ticks_to_seconds(packet.dts.unwrap_or(0)),
            packet.size()
        );

        let bytes = packet.size() as u64;
        match handle.media {
            MediaType::Video => self.hints.record_video(bytes),
            MediaType::Audio => self
                .hints
                .record_audio(bytes, time_base.ticks_to_seconds(packet.duration)),
        }

        let result = writer
            .write_interleaved(packet)
            .map_err(SessionError::Write);
        self.hints.set_output_size(writer.io_size());
        result
    }

    /// Refuses once header writing was attempted.
    pub fn set_color_space(&mut self, media: MediaType, space: ColorSpace) -> bool {
        if self.hints.guard().is_err() {
            return false;
        }
        let Some(codec) = self.slots.get_mut(media).as_mut().and_then(|s| s.codec.as_mut()) else {
            return false;
        };
        if self.header_state.attempted() {
            if codec.color_space() != space {
                warn!("can not change color space during encoding");
            }
            return false;
        }
        codec.set_color_space(space);
        true
    }

    /// Refuses once header writing was attempted.
    pub fn set_color_levels(&mut self, media: MediaType, levels: ColorLevels) -> bool {
        if self.hints.guard().is_err() {
            return false;
        }
        let Some(codec) = self.slots.get_mut(media).as_mut().and_then(|s| s.codec.as_mut()) else {
            return false;
        };
        if self.header_state.attempted() {
            if codec.color_levels() != levels {
                warn!("can not change color levels during encoding");
            }
            return false;
        }
        codec.set_color_levels(levels);
        true
    }

    pub fn color_space(&self, media: MediaType) -> Option<ColorSpace> {
        self.hints.guard().ok()?;
        self.codec(media).map(CodecContext::color_space)
    }

    pub fn color_levels(&self, media: MediaType) -> Option<ColorLevels> {
        self.hints.guard().ok()?;
        self.codec(media).map(CodecContext::color_levels)
    }

    /// Writes the trailer if the header made it out, then releases every
    /// codec, statistics log and the container. Idempotent.
    pub fn finish(&mut self) {
        if self.hints.is_finished() {
            return;
        }

        if let Some(writer) = self.writer.as_mut() {
            if self.header_state.is_started() {
                if let Err(e) = writer.write_trailer() {
                    warn!("could not write trailer: {e}");
                }
            }

            for &media in MediaType::ALL {
                if let Some(mut slot) = self.slots.get_mut(media).take() {
                    slot.release();
                }
            }
            self.stream_index = PerMedia::default();

            let counters = self.hints.counters();
            info!("vo-lavc: encoded {} bytes", counters.video_bytes);
            info!("ao-lavc: encoded {} bytes", counters.audio_bytes);
            if writer.has_io() {
                let size = writer.io_size().unwrap_or(0) as i64;
                let payload = (counters.video_bytes + counters.audio_bytes) as i64;
                info!("muxing overhead {} bytes", size - payload);
                self.hints.set_output_size(Some(size as u64));
                writer.close_io();
            }
        }

        self.writer = None;
        self.hints.mark_finished();
    }

    /// Logs `err` and, the first time, tears the session down.
    pub fn fail(&mut self, err: SessionError) {
        error!("{}", describe(&err));
        if self.hints.mark_failed() {
            self.finish();
        }
    }

    fn fail_with(&mut self, err: SessionError) -> SessionError {
        self.fail(err.clone());
        err
    }
}

impl<W: ContainerWriter> Drop for EncodeSession<W> {
    fn drop(&mut self) {
        if !self.hints.is_finished() {
            self.fail(SessionError::FreedWithoutFinish);
        }
    }
}

fn resolve_format<L: ContainerLibrary>(
    library: &L,
    options: &EncodeOptions,
    url: &str,
) -> Option<FormatDescriptor> {
    let candidates = options
        .format
        .as_deref()
        .map(split_candidates)
        .unwrap_or_default();
    if candidates.is_empty() {
        return library.find_format(None, url);
    }
    candidates
        .iter()
        .find_map(|name| library.find_format(Some(name), url))
}

fn resolve_encoder<L: ContainerLibrary>(
    library: &L,
    options: &EncodeOptions,
    format: &FormatDescriptor,
    url: &str,
    media: MediaType,
) -> Option<EncoderDescriptor> {
    match options.codec_name(media).filter(|name| !name.is_empty()) {
        Some(list) => split_candidates(list)
            .iter()
            .filter_map(|name| library.find_encoder(name))
            .find(|e| e.media_type == Some(media)),
        None => library.default_encoder(format, url, media),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxing::infrastructure::memory_library::{
        MemoryFaults, MemoryLibrary, MemoryWriter,
    };
    use crate::muxing::infrastructure::memory_stats_storage::MemoryStatsStorage;
    use rstest::rstest;

    fn session_with(
        library: &MemoryLibrary,
        options: EncodeOptions,
    ) -> Result<EncodeSession<MemoryWriter>, SessionError> {
        EncodeSession::new(
            Arc::new(options),
            library,
            Arc::new(MemoryStatsStorage::new()),
        )
    }

    fn mkv(library: &MemoryLibrary) -> EncodeSession<MemoryWriter> {
        session_with(
            library,
            EncodeOptions {
                file: "out.mkv".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[rstest]
    #[case::by_extension(None, "out.mkv", "matroska")]
    #[case::explicit(Some("mp4"), "out.mkv", "mp4")]
    #[case::first_known_candidate(Some("bogus, wav ,mp4"), "out", "wav")]
    #[case::unknown_name_falls_back(Some("bogus"), "out.mkv", "matroska")]
    #[case::empty_list(Some(""), "out.mp4", "mp4")]
    fn test_format_resolution(
        #[case] format: Option<&str>,
        #[case] file: &str,
        #[case] expected: &str,
    ) {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: file.into(),
                format: format.map(str::to_string),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.output_format().name, expected);
        session.finish();
    }

    #[test]
    fn test_unknown_format_is_fatal() {
        let library = MemoryLibrary::new();
        let result = session_with(
            &library,
            EncodeOptions {
                file: "out.xyz".into(),
                ..Default::default()
            },
        );
        assert_eq!(result.err(), Some(SessionError::FormatNotFound));
        assert_eq!(library.record().writers_created, 0);
    }

    #[test]
    fn test_no_codec_at_all_is_fatal() {
        let library = MemoryLibrary::new();
        let result = session_with(
            &library,
            EncodeOptions {
                file: "out.wav".into(),
                audio_codec: Some("mpeg4".into()),
                ..Default::default()
            },
        );
        assert_eq!(result.err(), Some(SessionError::NoUsableCodec));
    }

    #[test]
    fn test_codec_candidates_skip_wrong_media() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                video_codec: Some("vorbis,nope,mpeg2video".into()),
                audio_codec: Some("aac".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.encoder(MediaType::Video).unwrap().name, "mpeg2video");
        assert_eq!(session.encoder(MediaType::Audio).unwrap().name, "aac");
        session.finish();
    }

    #[test]
    fn test_stdout_url() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "-".into(),
                format: Some("matroska".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.url(), "pipe:1");
        session.finish();
    }

    #[test]
    fn test_codec_options_get_injected_flags() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                video_options: vec!["qscale=4".into(), "g=12".into()],
                ..Default::default()
            },
        )
        .unwrap();
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        session.open_codec(handle).unwrap();
        assert_eq!(
            session.codec(MediaType::Video).unwrap().opened_flags(),
            Some("+qscale+global_header")
        );
        session.finish();
    }

    #[test]
    fn test_wav_has_no_global_header() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.wav".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let handle = session.alloc_stream(MediaType::Audio).unwrap();
        session.open_codec(handle).unwrap();
        assert_eq!(session.codec(MediaType::Audio).unwrap().opened_flags(), None);
        assert_eq!(
            session.alloc_stream(MediaType::Video),
            Err(SessionError::NoStream(MediaType::Video))
        );
        assert!(!session.did_fail());
        session.finish();
    }

    #[test]
    fn test_time_base_snaps_to_encoder_rates() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                video_codec: Some("mpeg2video".into()),
                fps: Some(26.0),
                ..Default::default()
            },
        )
        .unwrap();
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        assert_eq!(session.time_base(), Some(Rational::new(1, 25)));
        assert_eq!(session.stream_time_base(handle), Some(Rational::new(1, 25)));
        assert_eq!(
            session.codec(MediaType::Video).unwrap().time_base(),
            Rational::new(1, 25)
        );
        session.finish();
    }

    #[test]
    fn test_auto_fps_uses_reported_rate() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                auto_fps: true,
                ..Default::default()
            },
        )
        .unwrap();
        session.set_video_fps(30.0);
        session.alloc_stream(MediaType::Video).unwrap();
        assert_eq!(session.time_base(), Some(Rational::new(1, 30)));
        session.finish();
    }

    #[test]
    fn test_huge_fps_does_not_panic() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                fps: Some(1e19),
                ..Default::default()
            },
        )
        .unwrap();
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        assert_eq!(session.time_base(), Some(Rational::new(0, 1)));
        assert_eq!(session.stream_time_base(handle), Some(Rational::new(0, 1)));
        assert!(!session.did_fail());
        session.finish();
    }

    #[test]
    fn test_experimental_codec_is_flagged() {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        let handle = session.alloc_stream(MediaType::Audio).unwrap();
        assert!(!session.codec(MediaType::Audio).unwrap().is_experimental());
        session.open_codec(handle).unwrap();
        assert!(session.codec(MediaType::Audio).unwrap().is_experimental());
        session.finish();
    }

    #[test]
    fn test_open_codec_twice_is_noop() {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        session.open_codec(handle).unwrap();
        session.open_codec(handle).unwrap();
        assert_eq!(library.record().codecs_opened, vec!["mpeg4".to_string()]);
        session.finish();
    }

    #[test]
    fn test_open_codec_failure_fails_session() {
        let library = MemoryLibrary::new().with_faults(MemoryFaults {
            open_codec: true,
            ..Default::default()
        });
        let mut session = mkv(&library);
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        let err = session.open_codec(handle).unwrap_err();
        assert!(matches!(err, SessionError::CodecOpen(MediaType::Video, _)));
        assert!(session.did_fail());
        assert_eq!(library.record().codecs_released, 1);
        assert_eq!(library.record().writers_released, 1);
    }

    #[test]
    fn test_alloc_after_header_is_refused() {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        session.open_codec(handle).unwrap();
        session.start().unwrap();
        assert_eq!(
            session.alloc_stream(MediaType::Audio),
            Err(SessionError::HeaderAlreadyStarted)
        );
        assert!(!session.did_fail());
        session.finish();
    }

    #[test]
    fn test_second_alloc_of_same_media_is_refused() {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        session.alloc_stream(MediaType::Video).unwrap();
        assert_eq!(
            session.alloc_stream(MediaType::Video),
            Err(SessionError::StreamExists(MediaType::Video))
        );
        session.finish();
    }

    #[test]
    fn test_alloc_failure_fails_session() {
        let library = MemoryLibrary::new().with_faults(MemoryFaults {
            alloc_codec: true,
            ..Default::default()
        });
        let mut session = mkv(&library);
        let err = session.alloc_stream(MediaType::Video).unwrap_err();
        assert!(matches!(err, SessionError::StreamAlloc { media: MediaType::Video, .. }));
        assert!(session.did_fail());
    }

    #[test]
    fn test_color_space_locked_after_start() {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        let handle = session.alloc_stream(MediaType::Video).unwrap();

        assert!(session.set_color_space(MediaType::Video, ColorSpace::Bt709));
        assert!(session.set_color_levels(MediaType::Video, ColorLevels::Limited));
        assert!(!session.set_color_space(MediaType::Audio, ColorSpace::Bt709));

        session.open_codec(handle).unwrap();
        session.start().unwrap();

        assert!(!session.set_color_space(MediaType::Video, ColorSpace::Bt601));
        assert!(!session.set_color_space(MediaType::Video, ColorSpace::Bt709));
        assert!(!session.set_color_levels(MediaType::Video, ColorLevels::Full));
        assert_eq!(session.color_space(MediaType::Video), Some(ColorSpace::Bt709));
        assert_eq!(session.color_levels(MediaType::Video), Some(ColorLevels::Limited));
        session.finish();
        assert_eq!(session.color_space(MediaType::Video), None);
    }

    #[rstest]
    #[case::listed("yuv420p", true)]
    #[case::unlisted("rgb24", false)]
    #[case::empty("", false)]
    fn test_pixel_format_support(#[case] name: &str, #[case] expected: bool) {
        let library = MemoryLibrary::new();
        let mut session = mkv(&library);
        assert_eq!(session.supports_pixel_format(name), expected);
        session.finish();
        assert!(!session.supports_pixel_format("yuv420p"));
    }

    #[test]
    fn test_pixel_format_without_list_or_encoder() {
        let library = MemoryLibrary::new();
        let mut raw = session_with(
            &library,
            EncodeOptions {
                file: "out".into(),
                format: Some("null".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(raw.supports_pixel_format("rgb24"));
        raw.finish();

        let mut wav = session_with(
            &library,
            EncodeOptions {
                file: "out.wav".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!wav.supports_pixel_format("yuv420p"));
        wav.finish();
    }

    #[test]
    fn test_metadata_copy_and_edits() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                set_metadata: vec![("title".into(), "Encoded".into())],
                remove_metadata: vec!["comment".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.metadata().get("title"), Some("Encoded"));

        let input: Tags = [("Artist", "someone"), ("Comment", "drop me"), ("TITLE", "old")]
            .into_iter()
            .collect();
        session.set_metadata(Some(input)).unwrap();

        let tags = session.metadata();
        assert_eq!(tags.get("artist"), Some("someone"));
        assert_eq!(tags.get("title"), Some("Encoded"));
        assert_eq!(tags.get("comment"), None);

        let handle = session.alloc_stream(MediaType::Video).unwrap();
        session.open_codec(handle).unwrap();
        session.start().unwrap();
        assert!(library
            .record()
            .metadata
            .contains(&("TITLE".to_string(), "Encoded".to_string())));
        session.finish();
    }

    #[test]
    fn test_metadata_not_copied_when_disabled() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                copy_metadata: false,
                ..Default::default()
            },
        )
        .unwrap();
        session
            .set_metadata(Some([("artist", "someone")].into_iter().collect()))
            .unwrap();
        assert!(session.metadata().is_empty());
        session.finish();
    }

    #[test]
    fn test_presentation_offset() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                video_offset: 1.5,
                audio_offset: -0.25,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.presentation_offset(MediaType::Video), 1.5);
        assert_eq!(session.presentation_offset(MediaType::Audio), -0.25);
        assert!(session.is_available());
        session.finish();
        assert_eq!(session.presentation_offset(MediaType::Video), 0.0);
        assert!(!session.is_available());
    }

    #[test]
    fn test_unknown_format_options_survive_header() {
        let library = MemoryLibrary::new();
        let mut session = session_with(
            &library,
            EncodeOptions {
                file: "out.mkv".into(),
                format_options: vec!["fflags=+bitexact".into(), "nonsense".into()],
                ..Default::default()
            },
        )
        .unwrap();
        let handle = session.alloc_stream(MediaType::Video).unwrap();
        session.open_codec(handle).unwrap();
        session.start().unwrap();
        assert_eq!(session.header_state(), HeaderState::Started);
        session.finish();
    }

    #[test]
    fn test_experimental_banner_names_codec_and_option() {
        let banner = experimental_banner(MediaType::Audio, "vorbis");
        assert!(banner.contains("**** Experimental AUDIO codec selected! ****"));
        assert!(banner.contains("(--oacopts)"));
        assert!(banner.contains("in place of vorbis."));
    }
}
