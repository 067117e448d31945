use log::warn;

use crate::muxing::domain::container_library::CodecContext;
use crate::muxing::domain::option_dictionary::OptionDictionary;
use crate::muxing::domain::stats_storage::StatsChannel;
use crate::shared::media_type::MediaType;

/// Identifies an allocated stream to the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub media: MediaType,
    /// Index of the stream inside the container.
    pub index: usize,
}

/// One container stream with the codec feeding it and, under two-pass,
/// the statistics log it writes.
pub(crate) struct StreamSlot<C> {
    pub handle: StreamHandle,
    pub codec: Option<C>,
    /// Codec options; taken when the codec is opened.
    pub options: Option<OptionDictionary>,
    pub stats: Option<Box<dyn StatsChannel>>,
    pub opened: bool,
}

impl<C: CodecContext> StreamSlot<C> {
    pub fn new(handle: StreamHandle, codec: C, options: OptionDictionary) -> Self {
        Self {
            handle,
            codec: Some(codec),
            options: Some(options),
            stats: None,
            opened: false,
        }
    }

    /// Appends whatever statistics the codec produced last to the pass-1 log.
    pub fn write_stats(&mut self) {
        let (Some(codec), Some(stats)) = (self.codec.as_ref(), self.stats.as_mut()) else {
            return;
        };
        if let Some(out) = codec.stats_output().filter(|s| !s.is_empty()) {
            if let Err(e) = stats.append(&out) {
                warn!(
                    "{}: could not write two-pass statistics: {e}",
                    self.handle.media.log_prefix()
                );
            }
        }
    }

    /// Releases the codec after flushing its final statistics, then closes
    /// the log.
    pub fn release(&mut self) {
        self.write_stats();
        self.codec = None;
        self.options = None;
        if let Some(stats) = self.stats.take() {
            if let Err(e) = stats.close() {
                warn!(
                    "{}: closing two-pass statistics failed: {e}",
                    self.handle.media.log_prefix()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxing::domain::container_library::{ContainerLibrary, ContainerWriter};
    use crate::muxing::domain::stats_storage::StatsStorage;
    use crate::muxing::infrastructure::memory_library::{MemoryCodec, MemoryLibrary};
    use crate::muxing::infrastructure::memory_stats_storage::MemoryStatsStorage;

    fn slot(library: &MemoryLibrary) -> StreamSlot<MemoryCodec> {
        let format = library.find_format(Some("matroska"), "out.mkv").unwrap();
        let mut writer = library.create_writer(&format, "out.mkv").unwrap();
        let encoder = library.find_encoder("mpeg4").unwrap();
        let codec = writer.alloc_codec(&encoder).unwrap();
        let handle = StreamHandle {
            media: MediaType::Video,
            index: 0,
        };
        StreamSlot::new(handle, codec, OptionDictionary::new())
    }

    #[test]
    fn test_write_stats_appends_codec_output() {
        let library = MemoryLibrary::new();
        let storage = MemoryStatsStorage::new();
        let mut slot = slot(&library);
        slot.stats = Some(storage.open_write("log").unwrap());

        slot.codec.as_mut().unwrap().set_stats_output(Some("S1\n".into()));
        slot.write_stats();
        slot.codec.as_mut().unwrap().set_stats_output(None);
        slot.write_stats();
        slot.codec.as_mut().unwrap().set_stats_output(Some("S2\n".into()));
        slot.write_stats();

        assert_eq!(storage.contents("log").unwrap(), b"S1\nS2\n");
    }

    #[test]
    fn test_release_flushes_and_frees() {
        let library = MemoryLibrary::new();
        let storage = MemoryStatsStorage::new();
        let mut slot = slot(&library);
        slot.stats = Some(storage.open_write("log").unwrap());
        slot.codec.as_mut().unwrap().set_stats_output(Some("final\n".into()));

        slot.release();

        assert!(slot.codec.is_none());
        assert!(slot.stats.is_none());
        assert_eq!(storage.contents("log").unwrap(), b"final\n");
        assert_eq!(library.record().codecs_released, 1);
    }

    #[test]
    fn test_write_stats_without_channel_is_noop() {
        let library = MemoryLibrary::new();
        let mut slot = slot(&library);
        slot.codec.as_mut().unwrap().set_stats_output(Some("S1\n".into()));
        slot.write_stats();
        slot.release();
        assert_eq!(library.record().codecs_released, 1);
    }
}
