mod test_pattern;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Parser};
use crossbeam_channel::select;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use log::{info, warn};

use encode_session_core::muxing::domain::container_library::CodecContext;
use encode_session_core::muxing::infrastructure::ffmpeg_library::{FfmpegLibrary, FfmpegWriter};
use encode_session_core::muxing::infrastructure::file_stats_storage::FileStatsStorage;
use encode_session_core::session::encode_session::EncodeSession;
use encode_session_core::session::help::show_help;
use encode_session_core::session::session_error::SessionError;
use encode_session_core::session::session_hints::SessionHints;
use encode_session_core::session::stream_slot::StreamHandle;
use encode_session_core::shared::colorspace::{ColorLevels, ColorSpace};
use encode_session_core::shared::encode_options::EncodeOptions;
use encode_session_core::shared::media_type::MediaType;
use encode_session_core::shared::metadata::Tags;
use encode_session_core::shared::output_target::{is_stdout_destination, resolve_output_url};
use encode_session_core::shared::rational::Rational;

use test_pattern::TestPattern;

const STATUS_INTERVAL: Duration = Duration::from_millis(500);
const FALLBACK_AUDIO_FRAME: usize = 1024;
const PATTERN_CHANNELS: u32 = 2;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Encodes a synthetic test pattern through an encode session.
#[derive(Parser)]
#[command(name = "encode-session")]
struct Cli {
    /// Output file or URL, `-` for stdout.
    #[arg(short = 'o')]
    output: Option<String>,

    /// Container format candidates (comma-separated), or `help`.
    #[arg(long = "of")]
    format: Option<String>,

    /// Container options as key=value (comma-separated).
    #[arg(long = "ofopts", value_delimiter = ',')]
    format_options: Vec<String>,

    /// Fixed output frame rate.
    #[arg(long = "ofps")]
    fps: Option<f64>,

    /// Upper bound for the frame rate taken from the source.
    #[arg(long = "omaxfps")]
    max_fps: Option<f64>,

    /// Video encoder candidates (comma-separated), or `help`.
    #[arg(long = "ovc")]
    video_codec: Option<String>,

    /// Video encoder options as key=value (comma-separated).
    #[arg(long = "ovcopts", value_delimiter = ',')]
    video_options: Vec<String>,

    /// Audio encoder candidates (comma-separated), or `help`.
    #[arg(long = "oac")]
    audio_codec: Option<String>,

    /// Audio encoder options as key=value (comma-separated).
    #[arg(long = "oacopts", value_delimiter = ',')]
    audio_options: Vec<String>,

    #[arg(long = "oharddup")]
    hard_dup: bool,

    /// Video presentation offset in seconds.
    #[arg(long = "ovoffset", default_value = "0.0", allow_negative_numbers = true)]
    video_offset: f64,

    /// Audio presentation offset in seconds.
    #[arg(long = "oaoffset", default_value = "0.0", allow_negative_numbers = true)]
    audio_offset: f64,

    #[arg(long = "ocopyts")]
    copy_ts: bool,

    #[arg(long = "orawts")]
    raw_ts: bool,

    /// Use the source frame rate when --ofps is not given.
    #[arg(long = "oautofps")]
    auto_fps: bool,

    #[arg(long = "oneverdrop")]
    never_drop: bool,

    /// Put the video stream first in the container.
    #[arg(long = "ovfirst")]
    video_first: bool,

    /// Put the audio stream first in the container.
    #[arg(long = "oafirst")]
    audio_first: bool,

    /// Carry source metadata into the output.
    #[arg(long = "ocopy-metadata", default_value_t = true, action = ArgAction::Set)]
    copy_metadata: bool,

    /// Metadata to set as key=value (comma-separated).
    #[arg(long = "oset-metadata", value_delimiter = ',')]
    set_metadata: Vec<String>,

    /// Metadata keys to drop (comma-separated).
    #[arg(long = "oremove-metadata", value_delimiter = ',')]
    remove_metadata: Vec<String>,

    /// Load the encoding options from a JSON file instead.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Length of the generated pattern in seconds.
    #[arg(long, default_value = "5.0")]
    duration: f64,

    /// Pattern size as WIDTHxHEIGHT.
    #[arg(long, default_value = "320x240")]
    size: String,

    /// Frame rate the pattern source reports.
    #[arg(long, default_value = "25.0")]
    rate: f32,

    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    no_audio: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.output.as_deref().unwrap_or_default());

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(output: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if is_stdout_destination(&resolve_output_url(output)) {
        builder.target(env_logger::Target::Stderr);
    }
    builder.init();
}

fn run(cli: Cli) -> CliResult<()> {
    let options = Arc::new(build_options(&cli)?);
    let library = FfmpegLibrary::new()?;
    if show_help(&library, &options) {
        return Ok(());
    }
    validate(&cli, &options)?;
    let (width, height) = parse_size(&cli.size)?;

    let mut session: EncodeSession<FfmpegWriter> = EncodeSession::new(
        Arc::clone(&options),
        &library,
        Arc::new(FileStatsStorage::new()),
    )?;

    let pattern = TestPattern::new(width, height, cli.sample_rate);
    let result = encode(&mut session, &cli, &options, &pattern);
    session.finish();
    result?;

    if session.did_fail() {
        return Err("encoding failed".into());
    }
    info!("Output written to {}", session.url());
    Ok(())
}

fn build_options(cli: &Cli) -> CliResult<EncodeOptions> {
    if let Some(path) = &cli.config {
        let mut options = EncodeOptions::from_json_file(path)?;
        if let Some(output) = &cli.output {
            options.file = output.clone();
        }
        return Ok(options);
    }

    let set_metadata = cli
        .set_metadata
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("Metadata entry must be key=value, got '{entry}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EncodeOptions {
        file: cli.output.clone().unwrap_or_default(),
        format: cli.format.clone(),
        format_options: cli.format_options.clone(),
        fps: cli.fps,
        max_fps: cli.max_fps,
        video_codec: cli.video_codec.clone(),
        video_options: cli.video_options.clone(),
        audio_codec: cli.audio_codec.clone(),
        audio_options: cli.audio_options.clone(),
        hard_dup: cli.hard_dup,
        video_offset: cli.video_offset,
        audio_offset: cli.audio_offset,
        copy_ts: cli.copy_ts,
        raw_ts: cli.raw_ts,
        auto_fps: cli.auto_fps,
        never_drop: cli.never_drop,
        video_first: cli.video_first,
        audio_first: cli.audio_first,
        copy_metadata: cli.copy_metadata,
        set_metadata,
        remove_metadata: cli.remove_metadata.clone(),
    })
}

fn validate(cli: &Cli, options: &EncodeOptions) -> CliResult<()> {
    if options.file.is_empty() {
        return Err("Output file is required (-o)".into());
    }
    if options.video_first && options.audio_first {
        return Err("--ovfirst and --oafirst are mutually exclusive".into());
    }
    if cli.no_video && cli.no_audio {
        return Err("--no-video and --no-audio leave nothing to encode".into());
    }
    if cli.duration.is_nan() || cli.duration <= 0.0 {
        return Err(format!("Duration must be positive, got {}", cli.duration).into());
    }
    if cli.rate.is_nan() || cli.rate <= 0.0 {
        return Err(format!("Rate must be positive, got {}", cli.rate).into());
    }
    if cli.sample_rate == 0 {
        return Err("Sample rate must be positive".into());
    }
    Ok(())
}

fn parse_size(size: &str) -> CliResult<(u32, u32)> {
    let parsed = size
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 && w % 2 == 0 && h % 2 == 0 => Ok((w, h)),
        _ => Err(format!("Size must be WIDTHxHEIGHT with even dimensions, got '{size}'").into()),
    }
}

/// Allocates a stream, treating "not wanted for this output" as absent.
fn alloc(
    session: &mut EncodeSession<FfmpegWriter>,
    media: MediaType,
) -> CliResult<Option<StreamHandle>> {
    match session.alloc_stream(media) {
        Ok(handle) => Ok(Some(handle)),
        Err(SessionError::NoStream(_)) => {
            info!("no {media} encoder for this output, skipping {media}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn encode(
    session: &mut EncodeSession<FfmpegWriter>,
    cli: &Cli,
    options: &EncodeOptions,
    pattern: &TestPattern,
) -> CliResult<()> {
    if !cli.no_video {
        session.declare_expected_stream(MediaType::Video)?;
        let reported = options
            .max_fps
            .filter(|max| *max > 0.0)
            .map_or(cli.rate, |max| cli.rate.min(max as f32));
        session.set_video_fps(reported);
    }
    if !cli.no_audio {
        session.declare_expected_stream(MediaType::Audio)?;
        session.set_audio_pts(0.0);
    }

    let video = if cli.no_video {
        None
    } else {
        alloc(session, MediaType::Video)?
    };
    let audio = if cli.no_audio {
        None
    } else {
        alloc(session, MediaType::Audio)?
    };
    if video.is_none() && audio.is_none() {
        return Err("no stream could be allocated".into());
    }

    let (width, height) = parse_size(&cli.size)?;
    if let Some(handle) = video {
        if !session.supports_pixel_format("yuv420p") {
            return Err("the video encoder does not accept yuv420p".into());
        }
        session.set_color_space(MediaType::Video, ColorSpace::Bt709);
        session.set_color_levels(MediaType::Video, ColorLevels::Limited);
        let codec = session.codec_mut(MediaType::Video).ok_or("video codec missing")?;
        codec.configure_video(width, height, Pixel::YUV420P);
        session.open_codec(handle)?;
    }
    if let Some(handle) = audio {
        let codec = session.codec_mut(MediaType::Audio).ok_or("audio codec missing")?;
        codec.set_time_base(Rational::new(1, cli.sample_rate as i32));
        codec.configure_audio(cli.sample_rate, PATTERN_CHANNELS);
        session.open_codec(handle)?;
    }

    let source: Tags = [("title", "test pattern"), ("encoder", "encode-session")]
        .into_iter()
        .collect();
    session.set_metadata(Some(source))?;
    session.start()?;

    let progress = Arc::new(AtomicU32::new(0f32.to_bits()));
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let reporter = spawn_status_reporter(session.hints(), Arc::clone(&progress), stop_rx);

    let result = produce(session, cli, pattern, video, audio, &progress);

    drop(stop_tx);
    if reporter.join().is_err() {
        warn!("status reporter panicked");
    }
    eprintln!();
    result
}

fn spawn_status_reporter(
    hints: SessionHints,
    progress: Arc<AtomicU32>,
    stop: crossbeam_channel::Receiver<()>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let ticker = crossbeam_channel::tick(STATUS_INTERVAL);
        loop {
            select! {
                recv(ticker) -> _ => {
                    let fraction = f32::from_bits(progress.load(Ordering::Relaxed));
                    match hints.status(fraction) {
                        Ok(status) => eprint!("\rEncoding {status}"),
                        Err(_) => break,
                    }
                }
                recv(stop) -> _ => break,
            }
        }
    })
}

fn produce(
    session: &mut EncodeSession<FfmpegWriter>,
    cli: &Cli,
    pattern: &TestPattern,
    video: Option<StreamHandle>,
    audio: Option<StreamHandle>,
    progress: &AtomicU32,
) -> CliResult<()> {
    let (width, height) = parse_size(&cli.size)?;
    let frame_rate = session
        .time_base()
        .map(|tb| tb.invert())
        .unwrap_or(Rational::new(25, 1));
    let total_frames = (cli.duration * frame_rate.to_f64()).ceil() as u64;
    let total_samples = (cli.duration * cli.sample_rate as f64).ceil() as u64;
    let video_offset =
        (session.presentation_offset(MediaType::Video) * frame_rate.to_f64()).round() as i64;
    let audio_offset =
        (session.presentation_offset(MediaType::Audio) * cli.sample_rate as f64).round() as i64;

    let mut frames_sent = if video.is_some() { 0 } else { total_frames };
    let mut samples_sent = if audio.is_some() { 0 } else { total_samples };

    let audio_frame_size = match session.codec(MediaType::Audio) {
        Some(codec) if codec.frame_size() > 0 => codec.frame_size(),
        _ => FALLBACK_AUDIO_FRAME,
    };

    while frames_sent < total_frames || samples_sent < total_samples {
        if session.did_fail() {
            return Err("encoding failed".into());
        }
        let video_pos = frames_sent as f64 / frame_rate.to_f64();
        let audio_pos = samples_sent as f64 / cli.sample_rate as f64;
        let video_turn = frames_sent < total_frames
            && (samples_sent >= total_samples || video_pos <= audio_pos);

        if let (true, Some(handle)) = (video_turn, video) {
            let mut picture = frame::Video::new(Pixel::YUV420P, width, height);
            pattern.fill_video(&mut picture, frames_sent);
            picture.set_pts(Some(frames_sent as i64 + video_offset));
            let codec = session
                .codec_mut(MediaType::Video)
                .ok_or("video codec missing")?;
            codec.send_frame(Some(&*picture))?;
            drain(session, handle)?;
            frames_sent += 1;
        } else if let Some(handle) = audio {
            let codec = session.codec_mut(MediaType::Audio).ok_or("audio codec missing")?;
            let format = codec.sample_format();
            let channels = codec.channels();
            let mut samples = codec.new_audio_frame(audio_frame_size)?;
            pattern.fill_audio(&mut samples, format, channels, samples_sent, audio_frame_size)?;
            samples.set_pts(Some(samples_sent as i64 + audio_offset));
            codec.send_frame(Some(&*samples))?;
            drain(session, handle)?;
            samples_sent += audio_frame_size as u64;
        }

        let done = (frames_sent as f64 / total_frames.max(1) as f64)
            .min(samples_sent as f64 / total_samples.max(1) as f64);
        progress.store((done as f32).to_bits(), Ordering::Relaxed);
    }

    for handle in [video, audio].into_iter().flatten() {
        let codec = session.codec_mut(handle.media).ok_or("codec missing")?;
        codec.send_frame(None)?;
        drain(session, handle)?;
    }
    Ok(())
}

/// Moves every packet the encoder has ready into the container.
fn drain(session: &mut EncodeSession<FfmpegWriter>, handle: StreamHandle) -> CliResult<()> {
    loop {
        let codec = session.codec_mut(handle.media).ok_or("codec missing")?;
        let codec_time_base = codec.time_base();
        let Some(mut packet) = codec.receive_packet(handle.index)? else {
            return Ok(());
        };
        session.write_stats(handle)?;

        let stream_time_base = session
            .stream_time_base(handle)
            .unwrap_or(codec_time_base);
        packet.rescale_ts(codec_time_base, stream_time_base);
        match session.write_frame(handle, packet) {
            Ok(()) => {}
            Err(SessionError::Write(e)) => warn!("{}: {e}", handle.media.log_prefix()),
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default("320x240", Some((320, 240)))]
    #[case::odd("321x240", None)]
    #[case::zero("0x240", None)]
    #[case::garbage("big", None)]
    fn test_parse_size(#[case] size: &str, #[case] expected: Option<(u32, u32)>) {
        assert_eq!(parse_size(size).ok(), expected);
    }

    #[test]
    fn test_options_from_flags() {
        let cli = Cli::parse_from([
            "encode-session",
            "-o",
            "out.mkv",
            "--ovc",
            "libx264,mpeg4",
            "--ovcopts",
            "qscale=4,flags=+pass1",
            "--oset-metadata",
            "title=Demo,artist=someone",
            "--ocopy-metadata",
            "false",
            "--oaoffset",
            "-0.5",
            "--oafirst",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.file, "out.mkv");
        assert_eq!(options.video_codec.as_deref(), Some("libx264,mpeg4"));
        assert_eq!(options.video_options, ["qscale=4", "flags=+pass1"]);
        assert_eq!(
            options.set_metadata,
            [
                ("title".to_string(), "Demo".to_string()),
                ("artist".to_string(), "someone".to_string())
            ]
        );
        assert!(!options.copy_metadata);
        assert_eq!(options.audio_offset, -0.5);
        assert!(options.audio_first);
        assert!(validate(&cli, &options).is_ok());
    }

    #[test]
    fn test_malformed_metadata_is_rejected() {
        let cli = Cli::parse_from(["encode-session", "-o", "out.mkv", "--oset-metadata", "title"]);
        assert!(build_options(&cli).is_err());
    }

    #[test]
    fn test_validate_rejects_conflicts() {
        let cli = Cli::parse_from(["encode-session", "-o", "out.mkv", "--ovfirst", "--oafirst"]);
        let options = build_options(&cli).unwrap();
        assert!(validate(&cli, &options).is_err());

        let cli = Cli::parse_from(["encode-session"]);
        let options = build_options(&cli).unwrap();
        assert!(validate(&cli, &options).is_err());
    }

    #[test]
    fn test_options_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"file": "a.mkv", "video_codec": "mpeg4", "fps": 30.0}"#,
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::parse_from(["encode-session", "--config", &path, "-o", "b.mkv"]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.file, "b.mkv");
        assert_eq!(options.video_codec.as_deref(), Some("mpeg4"));
        assert_eq!(options.fps, Some(30.0));
        assert!(options.copy_metadata);
    }
}
