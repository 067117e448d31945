use log::info;

use crate::shared::constants::DEFAULT_FRAME_RATE;
use crate::shared::rational::Rational;

fn rate_from_fps(fps: f64) -> Rational {
    Rational::from_f64(fps, (fps * 1001.0 + 2.0) as i32)
}

/// Picks the frame rate every stream of the session is timed against.
///
/// A fixed rate wins; otherwise the rate reported by the video pipeline is
/// used when `auto_fps` is on; otherwise [`DEFAULT_FRAME_RATE`]. When the
/// video encoder only accepts discrete rates, the result is snapped to the
/// nearest one.
pub fn negotiate_frame_rate(
    fixed: Option<f64>,
    auto_fps: bool,
    reported: Option<f32>,
    supported: Option<&[Rational]>,
) -> Rational {
    let rate = match (fixed.filter(|f| *f > 0.0), reported.filter(|f| *f > 0.0)) {
        (Some(fps), _) => rate_from_fps(fps),
        (None, Some(fps)) if auto_fps => {
            let rate = rate_from_fps(fps as f64);
            info!("option --ofps not specified but --oautofps is active, using guess of {rate}");
            rate
        }
        _ => {
            info!(
                "option --ofps not specified and fps could not be inferred, using guess of {DEFAULT_FRAME_RATE}"
            );
            DEFAULT_FRAME_RATE
        }
    };

    match supported {
        Some(list) if !list.is_empty() => list[rate.nearest_index(list)],
        _ => rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MPEG2_RATES: &[Rational] = &[
        Rational::new(24000, 1001),
        Rational::new(24, 1),
        Rational::new(25, 1),
        Rational::new(30000, 1001),
        Rational::new(30, 1),
        Rational::new(50, 1),
        Rational::new(60000, 1001),
        Rational::new(60, 1),
    ];

    #[rstest]
    #[case::fixed(Some(25.0), false, None, Rational::new(25, 1))]
    #[case::fixed_beats_hint(Some(30000.0 / 1001.0), true, Some(50.0), Rational::new(30000, 1001))]
    #[case::auto(None, true, Some(50.0), Rational::new(50, 1))]
    #[case::hint_ignored_without_auto(None, false, Some(50.0), Rational::new(24000, 1))]
    #[case::no_hint(None, true, None, Rational::new(24000, 1))]
    #[case::zero_fixed(Some(0.0), true, Some(0.0), Rational::new(24000, 1))]
    #[case::huge_fixed(Some(1e19), false, None, Rational::new(1, 0))]
    #[case::huge_hint(None, true, Some(f32::MAX), Rational::new(1, 0))]
    fn test_precedence(
        #[case] fixed: Option<f64>,
        #[case] auto_fps: bool,
        #[case] reported: Option<f32>,
        #[case] expected: Rational,
    ) {
        assert_eq!(negotiate_frame_rate(fixed, auto_fps, reported, None), expected);
    }

    #[test]
    fn test_snaps_to_supported_rates() {
        assert_eq!(
            negotiate_frame_rate(None, false, None, Some(MPEG2_RATES)),
            Rational::new(60, 1)
        );
        assert_eq!(
            negotiate_frame_rate(Some(26.0), false, None, Some(MPEG2_RATES)),
            Rational::new(25, 1)
        );
    }

    #[test]
    fn test_empty_supported_list_is_ignored() {
        assert_eq!(
            negotiate_frame_rate(Some(25.0), false, None, Some(&[])),
            Rational::new(25, 1)
        );
    }
}
