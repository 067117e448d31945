use ffmpeg_next::ffi;
use ffmpeg_next::Rescale;

/// A rational number `num/den`, used for frame rates and time bases.
///
/// A zero denominator means "unset", matching how the container library
/// reports missing values. Arithmetic goes through libavutil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn num(&self) -> i32 {
        self.num
    }

    pub fn den(&self) -> i32 {
        self.den
    }

    pub fn is_unset(&self) -> bool {
        self.den == 0
    }

    /// Swaps numerator and denominator (frame rate <-> time base).
    pub fn invert(&self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn to_f64(&self) -> f64 {
        f64::from(ffmpeg_next::Rational::from(*self))
    }

    /// Best rational approximation of `value` whose numerator and
    /// denominator both stay within `max`. Magnitudes beyond `i32::MAX`
    /// come back as `±1/0`, NaN as `0/0`.
    pub fn from_f64(value: f64, max: i32) -> Self {
        let approx = unsafe { ffi::av_d2q(value, max) };
        ffmpeg_next::Rational::from(approx).into()
    }

    /// Index of the entry in `candidates` closest to `self`. Ties keep the
    /// earlier entry. Returns 0 for an empty list.
    pub fn nearest_index(&self, candidates: &[Rational]) -> usize {
        let mut list: Vec<ffi::AVRational> = candidates
            .iter()
            .take_while(|r| !r.is_unset())
            .map(|&r| ffmpeg_next::Rational::from(r).into())
            .collect();
        list.push(ffi::AVRational { num: 0, den: 0 });
        let target = ffmpeg_next::Rational::from(*self).into();
        let index = unsafe { ffi::av_find_nearest_q_idx(target, list.as_ptr()) };
        index.max(0) as usize
    }

    /// Converts a tick count from this time base into seconds.
    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        if self.is_unset() {
            return 0.0;
        }
        ticks as f64 * self.to_f64()
    }

    /// Rescales `value` expressed in `self` units into `target` units,
    /// rounding to nearest with halves away from zero. Values are passed
    /// through when either side cannot express a time base.
    pub fn rescale(&self, value: i64, target: Rational) -> i64 {
        if self.den <= 0 || self.num < 0 || target.num <= 0 || target.den < 0 {
            return value;
        }
        value.rescale(*self, target)
    }
}

impl From<ffmpeg_next::Rational> for Rational {
    fn from(value: ffmpeg_next::Rational) -> Self {
        Self::new(value.numerator(), value.denominator())
    }
}

impl From<Rational> for ffmpeg_next::Rational {
    fn from(value: Rational) -> Self {
        ffmpeg_next::Rational::new(value.num, value.den)
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
