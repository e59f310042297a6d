//! In-memory ledger of the keeper's band positions.
//!
//! Holds the ordered seven-band set for one pool: lowest tick range first,
//! contiguous, equal width. Mutated only by the engine under its rebalance
//! lock; the ledger itself is not thread-safe.

use alloy::primitives::U256;

use crate::errors::LedgerError;
use crate::math::{TickRange, BAND_COUNT};
use crate::persist::PersistedBand;

/// Which side the price drifted toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Lower,
    Upper,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Lower => "Lower",
            Direction::Upper => "Upper",
        }
    }
}

/// Classification of a tick against the band set.
///
/// With the full seven bands: the center three are the safe zone, the two
/// bands on each flank (and anything outside the set) are triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickZone {
    Safe,
    LowerTrigger,
    UpperTrigger,
    NoAction,
}

/// Insertion edge for a freshly minted band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

/// One concentrated-liquidity position the keeper owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// NFT token id. Opaque: compared by equality, never arithmetic.
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

impl Band {
    pub fn range(&self) -> TickRange {
        TickRange {
            lower: self.tick_lower,
            upper: self.tick_upper,
        }
    }

    pub fn to_persisted(&self) -> PersistedBand {
        PersistedBand {
            token_id: self.token_id,
            tick_lower: self.tick_lower,
            tick_upper: self.tick_upper,
        }
    }
}

impl From<PersistedBand> for Band {
    fn from(p: PersistedBand) -> Self {
        Band {
            token_id: p.token_id,
            tick_lower: p.tick_lower,
            tick_upper: p.tick_upper,
        }
    }
}

/// Ordered band set plus the fixed band width.
#[derive(Debug, Clone, Default)]
pub struct BandLedger {
    bands: Vec<Band>,
    band_tick_width: i32,
}

impl BandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_tick_width(&self) -> i32 {
        self.band_tick_width
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Whether the ledger holds the full seven-band set.
    pub fn is_full(&self) -> bool {
        self.bands.len() == BAND_COUNT
    }

    pub fn clear(&mut self) {
        self.bands.clear();
        self.band_tick_width = 0;
    }

    pub fn to_persisted(&self) -> Vec<PersistedBand> {
        self.bands.iter().map(Band::to_persisted).collect()
    }

    /// Install a full seven-band set. Sorts by `tick_lower`, then asserts
    /// count, uniqueness, contiguity, and equal width.
    pub fn set_bands(&mut self, mut bands: Vec<Band>, width: i32) -> Result<(), LedgerError> {
        if bands.len() != BAND_COUNT {
            return Err(LedgerError::WrongBandCount {
                expected: BAND_COUNT,
                got: bands.len(),
            });
        }
        bands.sort_by_key(|b| b.tick_lower);
        Self::check_unique_ids(&bands)?;
        for (i, pair) in bands.windows(2).enumerate() {
            if pair[0].tick_upper != pair[1].tick_lower {
                return Err(LedgerError::NotContiguous {
                    left: i,
                    right: i + 1,
                });
            }
        }
        for (i, b) in bands.iter().enumerate() {
            let w = b.tick_upper - b.tick_lower;
            if w != width {
                return Err(LedgerError::WrongWidth {
                    index: i,
                    width: w,
                    expected: width,
                });
            }
        }
        self.bands = bands;
        self.band_tick_width = width;
        Ok(())
    }

    /// Install bands adopted from pre-existing on-chain positions. Any
    /// count is accepted and contiguity is not required; the keeper will
    /// not rebalance a partial set, only run it down or monitor it.
    pub fn adopt_bands(&mut self, mut bands: Vec<Band>, width: i32) -> Result<(), LedgerError> {
        bands.sort_by_key(|b| b.tick_lower);
        Self::check_unique_ids(&bands)?;
        self.bands = bands;
        self.band_tick_width = width;
        Ok(())
    }

    fn check_unique_ids(bands: &[Band]) -> Result<(), LedgerError> {
        for (i, b) in bands.iter().enumerate() {
            if bands[i + 1..].iter().any(|o| o.token_id == b.token_id) {
                return Err(LedgerError::DuplicateTokenId(b.token_id.to_string()));
            }
        }
        Ok(())
    }

    /// Index of the band containing `tick` under the half-open
    /// `[lower, upper)` rule.
    pub fn band_index_for_tick(&self, tick: i32) -> Option<usize> {
        self.bands
            .iter()
            .position(|b| b.tick_lower <= tick && tick < b.tick_upper)
    }

    /// Classify a tick: safe zone (center three), lower trigger (bottom
    /// two or below the set), upper trigger (top two or above the set).
    pub fn classify(&self, tick: i32) -> TickZone {
        if self.bands.is_empty() {
            return TickZone::NoAction;
        }
        match self.band_index_for_tick(tick) {
            Some(2..=4) => TickZone::Safe,
            Some(0..=1) => TickZone::LowerTrigger,
            Some(5..=6) => TickZone::UpperTrigger,
            Some(_) => TickZone::NoAction,
            None => {
                if tick < self.bands[0].tick_lower {
                    TickZone::LowerTrigger
                } else if tick >= self.bands[self.bands.len() - 1].tick_upper {
                    TickZone::UpperTrigger
                } else {
                    // Gap inside an adopted, non-contiguous set.
                    TickZone::NoAction
                }
            }
        }
    }

    /// The band a rebalance dissolves: the one farthest from the drift.
    /// Price drifting lower dissolves the highest band and vice versa.
    pub fn band_to_dissolve(&self, direction: Direction) -> Option<&Band> {
        match direction {
            Direction::Lower => self.bands.last(),
            Direction::Upper => self.bands.first(),
        }
    }

    /// Tick bounds of the band a rebalance mints ahead of the drift.
    pub fn new_band_ticks(&self, direction: Direction) -> Option<TickRange> {
        let width = self.band_tick_width;
        match direction {
            Direction::Lower => self.bands.first().map(|b| TickRange {
                lower: b.tick_lower - width,
                upper: b.tick_lower,
            }),
            Direction::Upper => self.bands.last().map(|b| TickRange {
                lower: b.tick_upper,
                upper: b.tick_upper + width,
            }),
        }
    }

    /// Remove a band by token id.
    pub fn remove(&mut self, token_id: U256) -> Result<Band, LedgerError> {
        let idx = self
            .bands
            .iter()
            .position(|b| b.token_id == token_id)
            .ok_or_else(|| LedgerError::UnknownTokenId(token_id.to_string()))?;
        Ok(self.bands.remove(idx))
    }

    /// Insert a band at one edge of the set.
    pub fn add(&mut self, band: Band, edge: Edge) -> Result<(), LedgerError> {
        if self.bands.iter().any(|b| b.token_id == band.token_id) {
            return Err(LedgerError::DuplicateTokenId(band.token_id.to_string()));
        }
        match edge {
            Edge::Start => {
                if let Some(first) = self.bands.first() {
                    if band.tick_upper != first.tick_lower {
                        return Err(LedgerError::NotContiguous { left: 0, right: 1 });
                    }
                }
                self.bands.insert(0, band);
            }
            Edge::End => {
                if let Some(last) = self.bands.last() {
                    if last.tick_upper != band.tick_lower {
                        return Err(LedgerError::NotContiguous {
                            left: self.bands.len() - 1,
                            right: self.bands.len(),
                        });
                    }
                }
                self.bands.push(band);
            }
        }
        Ok(())
    }
}
