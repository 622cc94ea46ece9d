//! Temporal debouncing of per-frame observations.
//!
//! A single noisy frame must never decide the gate. Observations accumulate in
//! a fixed-capacity window; only a full window is judged, and the rule is
//! deliberately asymmetric:
//!
//! - one compliant frame anywhere in the window clears the subject (a detector
//!   miss must not hold the gate shut),
//! - every frame non-compliant confirms the violation, and the oldest frame of
//!   the window becomes the evidence.
//!
//! Once a decision fires, the latch holds: further observations keep rotating
//! through the window but produce no decision until [`Debouncer::reset`].

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use crate::compliance::{FrameObservation, RequiredEquipment};
use crate::detect::EquipmentClass;
use crate::frame::GateFrame;

/// Window size used when none is configured.
pub const DEFAULT_WINDOW_CAPACITY: usize = 7;

/// Debounce latch. `Decided` suppresses further decisions until reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionState {
    Pending,
    Decided,
}

/// Evidence captured for a violation decision: the oldest frame of the full
/// window and the classes it lacked.
#[derive(Clone, Debug)]
pub struct ViolationEvidence {
    pub frame: GateFrame,
    pub missing: BTreeSet<EquipmentClass>,
}

/// A final decision for the current debounce cycle.
#[derive(Clone, Debug)]
pub enum Decision {
    FinalSafe,
    FinalViolation(ViolationEvidence),
}

impl Decision {
    pub fn is_violation(&self) -> bool {
        matches!(self, Decision::FinalViolation(_))
    }
}

// ----------------------------------------------------------------------------
// ObservationWindow: fixed slot ring
// ----------------------------------------------------------------------------

/// Fixed-capacity FIFO over the most recent observations.
///
/// Slot array with a head index and length; pushing into a full window
/// overwrites the oldest slot and advances the head. Capacity never changes
/// after construction.
#[derive(Debug)]
pub struct ObservationWindow {
    slots: Box<[Option<FrameObservation>]>,
    head: usize,
    len: usize,
}

impl ObservationWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("observation window capacity must be at least 1"));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Append an observation, evicting the oldest when full.
    pub fn push(&mut self, obs: FrameObservation) {
        let cap = self.slots.len();
        if self.len < cap {
            let tail = (self.head + self.len) % cap;
            self.slots[tail] = Some(obs);
            self.len += 1;
        } else {
            self.slots[self.head] = Some(obs);
            self.head = (self.head + 1) % cap;
        }
    }

    /// Observations in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &FrameObservation> {
        let cap = self.slots.len();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % cap].as_ref())
    }

    pub fn oldest(&self) -> Option<&FrameObservation> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ----------------------------------------------------------------------------
// Debouncer
// ----------------------------------------------------------------------------

/// Sliding-window debouncer with a one-shot decision latch per cycle.
#[derive(Debug)]
pub struct Debouncer {
    window: ObservationWindow,
    state: DecisionState,
    required: RequiredEquipment,
}

impl Debouncer {
    pub fn new(required: RequiredEquipment, capacity: usize) -> Result<Self> {
        Ok(Self {
            window: ObservationWindow::new(capacity)?,
            state: DecisionState::Pending,
            required,
        })
    }

    pub fn state(&self) -> DecisionState {
        self.state
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Feed one observation. Returns a decision exactly once per cycle: the
    /// first time the window is full while the latch is still pending.
    pub fn observe(&mut self, obs: FrameObservation) -> Option<Decision> {
        self.window.push(obs);

        if self.state == DecisionState::Decided {
            return None;
        }
        if !self.window.is_full() {
            return None;
        }

        let decision = if self.window.iter().any(|o| o.compliant) {
            Decision::FinalSafe
        } else {
            // Window is full and capacity >= 1, so an oldest observation
            // exists; it is the representative evidence for the whole window.
            let oldest = self.window.oldest()?;
            Decision::FinalViolation(ViolationEvidence {
                frame: oldest.frame.clone(),
                missing: self.required.missing_from(&oldest.present),
            })
        };

        self.state = DecisionState::Decided;
        log::debug!(
            "debounce window full ({} frames): {}",
            self.window.capacity(),
            if decision.is_violation() {
                "violation confirmed"
            } else {
                "compliant frame present"
            }
        );
        Some(decision)
    }

    /// Start a fresh cycle: empty window, latch back to `Pending`. Callers own
    /// the policy of when (or whether) to call this.
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = DecisionState::Pending;
    }
}
