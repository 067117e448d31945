use crate::shared::rational::Rational;

/// One compressed packet ready for the muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

impl EncodedPacket {
    pub fn new(stream_index: usize, data: Vec<u8>) -> Self {
        Self {
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            keyframe: false,
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Converts timestamps and duration from `from` units to `to` units.
    pub fn rescale_ts(&mut self, from: Rational, to: Rational) {
        self.pts = self.pts.map(|v| from.rescale(v, to));
        self.dts = self.dts.map(|v| from.rescale(v, to));
        self.duration = from.rescale(self.duration, to);
    }
}
