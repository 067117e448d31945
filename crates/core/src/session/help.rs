use std::io::{self, Write};

use crate::muxing::domain::container_library::{ContainerLibrary, EncoderDescriptor};
use crate::shared::encode_options::EncodeOptions;
use crate::shared::media_type::MediaType;

const HELP: &str = "help";

fn asks_for_help(value: Option<&str>) -> bool {
    value == Some(HELP)
}

fn encoder_lines(encoders: &[EncoderDescriptor], media: MediaType, flag: &str) -> Vec<String> {
    encoders
        .iter()
        .filter(|e| e.media_type == Some(media))
        .map(|e| format!("  --{flag}={:<12} {}", e.name, e.long_name))
        .collect()
}

/// Lines of every catalog `options` asks for with a `help` value.
pub fn catalog_lines<L: ContainerLibrary>(library: &L, options: &EncodeOptions) -> Vec<String> {
    let mut lines = Vec::new();

    if asks_for_help(options.format.as_deref()) {
        lines.push("Available output formats:".to_string());
        lines.extend(
            library
                .muxers()
                .iter()
                .map(|f| format!("  --of={:<13} {}", f.name, f.long_name)),
        );
        lines.push(String::new());
    }

    let encoders = library.encoders();
    if asks_for_help(options.video_codec.as_deref()) {
        lines.push("Available output video codecs:".to_string());
        lines.extend(encoder_lines(&encoders, MediaType::Video, "ovc"));
        lines.push(String::new());
    }
    if asks_for_help(options.audio_codec.as_deref()) {
        lines.push("Available output audio codecs:".to_string());
        lines.extend(encoder_lines(&encoders, MediaType::Audio, "oac"));
        lines.push(String::new());
    }

    lines
}

/// Writes the requested catalogs to `out`. Returns true if any was asked for.
pub fn write_help<L: ContainerLibrary>(
    library: &L,
    options: &EncodeOptions,
    out: &mut impl Write,
) -> io::Result<bool> {
    let lines = catalog_lines(library, options);
    for line in &lines {
        writeln!(out, "{line}")?;
    }
    Ok(!lines.is_empty())
}

/// Prints the requested catalogs to stdout.
pub fn show_help<L: ContainerLibrary>(library: &L, options: &EncodeOptions) -> bool {
    let mut stdout = io::stdout().lock();
    write_help(library, options, &mut stdout).unwrap_or(true)
}
