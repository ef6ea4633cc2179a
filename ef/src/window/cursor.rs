//! Cursor state machine
//!
//! Single state, cyclic transition:
//! `start <- (start + step) mod (modulus - size)`, `end <- start + size`.

use serde::Serialize;
use tracing::debug;

/// Window size, advance step and modulus bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    /// Lines past the first line of a window (S)
    pub size: u64,
    /// Lines advanced per request (V)
    pub step: u64,
    /// Total addressable line count (M)
    pub modulus: u64,
}

impl WindowGeometry {
    /// Reject geometries the transition cannot handle
    pub fn validate(&self) -> eyre::Result<()> {
        if self.size == 0 {
            return Err(eyre::eyre!("window.size must be at least 1"));
        }
        if self.modulus <= self.size {
            return Err(eyre::eyre!(
                "window.modulus ({}) must be greater than window.size ({})",
                self.modulus,
                self.size
            ));
        }
        Ok(())
    }

    /// Number of distinct start positions
    pub fn period(&self) -> u64 {
        self.modulus - self.size
    }
}

/// Inclusive line range `[start, end]` against a 1-based line counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: u64,
    pub end: u64,
}

impl LineRange {
    pub fn contains(&self, line: u64) -> bool {
        self.start <= line && line <= self.end
    }
}

/// Feed progress between requests
#[derive(Debug, Clone)]
pub struct Cursor {
    geometry: WindowGeometry,
    range: LineRange,
    advances: u64,
}

impl Cursor {
    /// Start at `[0, size]`
    ///
    /// Fails when the geometry is rejected by [`WindowGeometry::validate`].
    pub fn new(geometry: WindowGeometry) -> eyre::Result<Self> {
        debug!(?geometry, "Cursor::new: called");
        geometry.validate()?;
        Ok(Self {
            geometry,
            range: LineRange {
                start: 0,
                end: geometry.size,
            },
            advances: 0,
        })
    }

    /// State after `k` advances from the initial state
    pub fn after(geometry: WindowGeometry, k: u64) -> eyre::Result<Self> {
        geometry.validate()?;
        let period = geometry.period();
        // (k * step) mod period without overflowing for large k
        let start = ((k % period) as u128 * geometry.step as u128 % period as u128) as u64;
        Ok(Self {
            geometry,
            range: LineRange {
                start,
                end: start + geometry.size,
            },
            advances: k,
        })
    }

    /// Apply one transition and return the new range
    pub fn advance(&mut self) -> LineRange {
        let period = self.geometry.period();
        let start = (self.range.start % period + self.geometry.step % period) % period;
        self.range = LineRange {
            start,
            end: start + self.geometry.size,
        };
        self.advances += 1;
        debug!(start, end = self.range.end, advances = self.advances, "Cursor::advance");
        self.range
    }

    pub fn current_range(&self) -> LineRange {
        self.range
    }

    /// Transitions applied so far
    pub fn advances(&self) -> u64 {
        self.advances
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }
}
