use std::f32::consts::TAU;

use ffmpeg_next::format::sample::Type;
use ffmpeg_next::format::Sample;
use ffmpeg_next::frame;

/// Frequency of the generated tone, in Hz.
pub const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.25;

/// Moving luma gradient plus a sine tone, so both encoders get real input.
pub struct TestPattern {
    width: u32,
    height: u32,
    sample_rate: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, sample_rate: u32) -> Self {
        Self {
            width,
            height,
            sample_rate,
        }
    }

    /// Fills a yuv420p frame with the gradient for `index`.
    pub fn fill_video(&self, frame: &mut frame::Video, index: u64) {
        let stride = frame.stride(0);
        let luma = frame.data_mut(0);
        for y in 0..self.height as usize {
            let row = &mut luma[y * stride..y * stride + self.width as usize];
            for (x, px) in row.iter_mut().enumerate() {
                *px = luma_at(x as u32, y as u32, index);
            }
        }
        for plane in 1..3 {
            frame.data_mut(plane).fill(128);
        }
    }

    /// Fills `samples` samples of every channel, starting at `first_sample`.
    pub fn fill_audio(
        &self,
        frame: &mut frame::Audio,
        format: Sample,
        channels: usize,
        first_sample: u64,
        samples: usize,
    ) -> Result<(), String> {
        let width = sample_width(format)?;
        let planar = matches!(format, Sample::F32(Type::Planar) | Sample::I16(Type::Planar));
        for i in 0..samples {
            let value = tone(first_sample + i as u64, self.sample_rate);
            let bytes = encode_sample(value, format)?;
            for ch in 0..channels {
                let (plane, slot) = if planar { (ch, i) } else { (0, i * channels + ch) };
                let data = frame.data_mut(plane);
                data[slot * width..(slot + 1) * width].copy_from_slice(&bytes[..width]);
            }
        }
        Ok(())
    }
}

/// Diagonal ramp that shifts one step per frame.
pub fn luma_at(x: u32, y: u32, index: u64) -> u8 {
    ((x as u64 + y as u64 + index * 4) % 220 + 16) as u8
}

pub fn tone(sample: u64, sample_rate: u32) -> f32 {
    let t = sample as f64 / sample_rate as f64;
    TONE_AMPLITUDE * (TAU * TONE_HZ * t as f32).sin()
}

fn sample_width(format: Sample) -> Result<usize, String> {
    match format {
        Sample::F32(_) => Ok(4),
        Sample::I16(_) => Ok(2),
        other => Err(format!("unsupported sample format {other:?}")),
    }
}

/// Native-endian bytes of `value` in `format`, padded to four bytes.
pub fn encode_sample(value: f32, format: Sample) -> Result<[u8; 4], String> {
    match format {
        Sample::F32(_) => Ok(value.to_ne_bytes()),
        Sample::I16(_) => {
            let scaled = (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            let [a, b] = scaled.to_ne_bytes();
            Ok([a, b, 0, 0])
        }
        other => Err(format!("unsupported sample format {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case::origin(0, 0, 0, 16)]
    #[case::moves_with_frame(0, 0, 1, 20)]
    #[case::wraps(219, 0, 0, 235)]
    #[case::wraps_past_range(220, 0, 0, 16)]
    fn test_luma_stays_in_video_range(
        #[case] x: u32,
        #[case] y: u32,
        #[case] index: u64,
        #[case] expected: u8,
    ) {
        assert_eq!(luma_at(x, y, index), expected);
    }

    #[test]
    fn test_tone_period() {
        assert_abs_diff_eq!(tone(0, 44000), 0.0);
        assert_abs_diff_eq!(tone(25, 44000), TONE_AMPLITUDE, epsilon = 1e-4);
        assert_abs_diff_eq!(tone(100, 44000), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_encode_sample() {
        let f = encode_sample(0.5, Sample::F32(Type::Planar)).unwrap();
        assert_eq!(f32::from_ne_bytes(f), 0.5);

        let s = encode_sample(1.5, Sample::I16(Type::Packed)).unwrap();
        assert_eq!(i16::from_ne_bytes([s[0], s[1]]), i16::MAX);

        assert!(encode_sample(0.0, Sample::U8(Type::Packed)).is_err());
    }
}
