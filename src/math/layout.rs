//! Seven-band layout computation.
//!
//! Given a center tick, a total range width in percent, and a fee tier,
//! produces the tick bounds of seven contiguous equal-width bands centered
//! on the aligned center tick. The middle band (index 3) straddles the
//! center; three bands extend to each side.

use crate::errors::LayoutError;

use super::tick::{align_tick, fee_to_tick_spacing, usable_tick_bounds};

/// Number of bands a keeper maintains per pool.
pub const BAND_COUNT: usize = 7;

/// Half-open tick interval `[lower, upper)` of one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

/// Result of a layout computation: seven contiguous ranges plus the common
/// band width in ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    pub bands: Vec<TickRange>,
    pub band_tick_width: i32,
}

impl BandLayout {
    /// Tick span covered by all seven bands.
    pub fn total_range(&self) -> (i32, i32) {
        (self.bands[0].lower, self.bands[BAND_COUNT - 1].upper)
    }
}

/// Compute the seven-band layout around `center_tick`.
///
/// `width_percent` is the total price range as a percent (e.g. `3.0` covers
/// roughly ±1.5% around the center). The band width comes out as
/// `floor(2·offset / 7)` snapped down to the tick spacing, never below one
/// spacing. Extremes are clamped to the usable tick bounds; a band that
/// collapses under clamping fails the layout.
pub fn compute_band_layout(
    center_tick: i32,
    width_percent: f64,
    fee: u32,
) -> Result<BandLayout, LayoutError> {
    if !width_percent.is_finite() || width_percent <= 0.0 {
        return Err(LayoutError::InvalidWidth(width_percent));
    }
    let spacing = fee_to_tick_spacing(fee)?;

    // Half-width of the total range in ticks: price factor 1 + w/200 on
    // each side of the center.
    let tick_offset = ((1.0 + width_percent / 200.0).ln() / 1.0001_f64.ln()).floor() as i32;

    let raw_band_width = (2 * tick_offset) / BAND_COUNT as i32;
    let band_tick_width = ((raw_band_width / spacing) * spacing).max(spacing);

    let center = align_tick(center_tick, spacing);
    let half = band_tick_width / 2;

    // Middle band straddles the aligned center; the remaining six extend
    // contiguously to each side.
    let center_lower = align_tick(center - half, spacing);
    let (min_usable, max_usable) = usable_tick_bounds(spacing);

    let mut bands = Vec::with_capacity(BAND_COUNT);
    for i in 0..BAND_COUNT as i32 {
        let lower = center_lower + (i - 3) * band_tick_width;
        let upper = lower + band_tick_width;
        let lower = lower.clamp(min_usable, max_usable);
        let upper = upper.clamp(min_usable, max_usable);
        if lower >= upper {
            return Err(LayoutError::CollapsedBand {
                index: i as usize,
                lower,
                upper,
            });
        }
        bands.push(TickRange { lower, upper });
    }

    Ok(BandLayout {
        bands,
        band_tick_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick::MAX_TICK;

    #[test]
    fn test_layout_center_zero_three_percent() {
        // 3% width at fee tier 100 (spacing 1): offset ≈ 148 ticks each
        // side, band width floor(296/7) = 42.
        let layout = compute_band_layout(0, 3.0, 100).unwrap();
        assert_eq!(layout.band_tick_width, 42);
        let lowers: Vec<i32> = layout.bands.iter().map(|b| b.lower).collect();
        assert_eq!(lowers, vec![-147, -105, -63, -21, 21, 63, 105]);
        assert_eq!(layout.total_range(), (-147, 147));
    }

    #[test]
    fn test_layout_contiguous_and_equal_width() {
        let layout = compute_band_layout(1234, 5.0, 3000).unwrap();
        assert_eq!(layout.bands.len(), BAND_COUNT);
        assert_eq!(layout.band_tick_width % 60, 0);
        for pair in layout.bands.windows(2) {
            assert_eq!(pair[0].upper, pair[1].lower);
        }
        for b in &layout.bands {
            assert_eq!(b.upper - b.lower, layout.band_tick_width);
            assert_eq!(b.lower % 60, 0);
            assert_eq!(b.upper % 60, 0);
        }
    }

    #[test]
    fn test_layout_symmetric_around_aligned_center() {
        let layout = compute_band_layout(0, 3.0, 100).unwrap();
        let (lo, hi) = layout.total_range();
        assert_eq!(lo, -hi);
    }

    #[test]
    fn test_layout_width_never_below_spacing() {
        // Tiny width at a coarse spacing: band width floors to one spacing.
        let layout = compute_band_layout(0, 0.05, 3000).unwrap();
        assert_eq!(layout.band_tick_width, 60);
    }

    #[test]
    fn test_layout_rejects_bad_width() {
        assert!(matches!(
            compute_band_layout(0, 0.0, 100),
            Err(LayoutError::InvalidWidth(_))
        ));
        assert!(matches!(
            compute_band_layout(0, f64::NAN, 100),
            Err(LayoutError::InvalidWidth(_))
        ));
    }

    #[test]
    fn test_layout_rejects_unknown_fee() {
        assert!(matches!(
            compute_band_layout(0, 3.0, 42),
            Err(LayoutError::UnknownFeeTier(42))
        ));
    }

    #[test]
    fn test_layout_collapses_at_tick_boundary() {
        // Centered at the usable maximum every band above the center clamps
        // flat, which must fail rather than produce empty ranges.
        let res = compute_band_layout(MAX_TICK, 3.0, 100);
        assert!(matches!(res, Err(LayoutError::CollapsedBand { .. })));
    }
}
