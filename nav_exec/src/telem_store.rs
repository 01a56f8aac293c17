//! # Telemetry Store
//!
//! Holds the most recent vehicle state parsed from the telemetry feed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use comms_if::eqpt::telem::{TelemParseError, VehicleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Store of the latest telemetry snapshot.
///
/// The store holds at most one snapshot, always the last one to be successfully parsed. Failing
/// to parse a record never removes the previous snapshot. Readers always get a complete snapshot
/// as snapshots are replaced whole.
#[derive(Debug, Default)]
pub struct TelemStore {
    latest: RwLock<Option<(VehicleState, Instant)>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl TelemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw telemetry record, replacing the stored snapshot if it is valid.
    pub fn update(&self, raw: &str) -> Result<(), TelemParseError> {
        let state: VehicleState = raw.parse()?;
        self.set(state);
        Ok(())
    }

    /// Replace the stored snapshot.
    pub fn set(&self, state: VehicleState) {
        let entry = Some((state, Instant::now()));
        match self.latest.write() {
            Ok(mut l) => *l = entry,
            // A panicked writer can't have left a partial snapshot, the replace is a single move
            Err(poisoned) => *poisoned.into_inner() = entry,
        }
    }

    /// The latest snapshot regardless of its age.
    pub fn latest(&self) -> Option<VehicleState> {
        self.latest_with_age().map(|(s, _)| s)
    }

    /// The latest snapshot and how long ago it was received.
    pub fn latest_with_age(&self) -> Option<(VehicleState, Duration)> {
        let guard = match self.latest.read() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.map(|(s, t)| (s, t.elapsed()))
    }

    /// The latest snapshot if it was received no longer than `max_age` ago.
    pub fn latest_fresh(&self, max_age: Duration) -> Option<VehicleState> {
        match self.latest_with_age() {
            Some((s, age)) if age <= max_age => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
