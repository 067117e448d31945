use log::warn;

use crate::muxing::domain::container_library::{CodecContext, EncodingPass};
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::muxing::domain::stats_storage::{StatsChannel, StatsStorage};
use crate::shared::constants::{FLAGS_KEY, STATS_READ_LIMIT};
use crate::shared::media_type::MediaType;

/// Where the first pass leaves its statistics for `media`.
pub fn stats_log_path(url: &str, media: MediaType) -> String {
    format!("{url}-{}-pass1.log", media.log_prefix())
}

/// Wires two-pass statistics for one stream according to its `flags`
/// option.
///
/// For a second pass the log is read back into the codec; for a first pass
/// the log is opened for writing and returned so encoded statistics can be
/// appended. Either side degrades to single-pass with a warning when its
/// log cannot be used.
pub(crate) fn prepare<C: CodecContext>(
    url: &str,
    media: MediaType,
    options: &mut OptionDictionary,
    codec: &mut C,
    storage: &dyn StatsStorage,
) -> Option<Box<dyn StatsChannel>> {
    let prefix = media.log_prefix();
    let path = stats_log_path(url, media);

    if options.has_flag(FLAGS_KEY, EncodingPass::Second.flag_name()) {
        match storage.open_read(&path) {
            Err(_) => {
                warn!("{prefix}: could not open '{path}', disabling 2-pass encoding at pass 2");
                codec.clear_pass_flag(EncodingPass::Second);
                options.apply(Some(FLAGS_KEY), "-pass2");
            }
            Ok(mut reader) => {
                match reader.read_complete(STATS_READ_LIMIT) {
                    Ok(content) => codec.set_stats_input(content),
                    Err(_) => {
                        warn!("{prefix}: could not read '{path}', disabling 2-pass encoding at pass 1")
                    }
                }
                if let Err(e) = reader.close() {
                    warn!("{prefix}: closing '{path}' failed: {e}");
                }
            }
        }
    }

    if options.has_flag(FLAGS_KEY, EncodingPass::First.flag_name()) {
        match storage.open_write(&path) {
            Ok(writer) => return Some(writer),
            Err(_) => {
                warn!("{prefix}: could not open '{path}', disabling 2-pass encoding at pass 1");
                options.apply(Some(FLAGS_KEY), "-pass1");
            }
        }
    }

    None
}
