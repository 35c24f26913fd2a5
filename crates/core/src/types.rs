//! Core type definitions shared by the scheduler, config, and telemetry crates

use crate::error::{Error, Result};

/// A positive scheduling weight used by Weighted Fair Queueing.
///
/// Constructed once at port init from configuration and never mutated by
/// the data path. A non-positive weight is a configuration fault.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Weight(f64);

impl Weight {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Configuration(format!(
                "queue weight must be a positive finite number, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// A positive per-round byte quantum used by Weighted Round Robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quantum(u32);

impl Quantum {
    pub fn new(bytes: u32) -> Result<Self> {
        if bytes == 0 {
            return Err(Error::Configuration(
                "queue quantum must be a positive number of bytes".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// A classified, egress-bound packet as seen by the scheduler core.
///
/// The scheduler never parses headers: `class` and `ect` are handed in by
/// the external classifier collaborator. `ce` and `enqueue_ts_ns` are the
/// only fields the core itself writes.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Wire length in bytes, used for all accounting and shaping math.
    pub len_bytes: u32,
    /// Class-of-service index assigned by the classifier (pre-clamp).
    pub class: usize,
    /// ECN-Capable Transport bit. Marking never touches a non-ECT packet.
    pub ect: bool,
    /// Congestion-Experienced bit. Writable only by the marker.
    pub ce: bool,
    /// Enqueue timestamp in nanoseconds, stashed by the Latency/CoDel
    /// markers on enqueue and read back on dequeue. `None` until stamped.
    pub enqueue_ts_ns: Option<u64>,
}

impl Packet {
    pub fn new(len_bytes: u32, class: usize, ect: bool) -> Self {
        Self {
            len_bytes,
            class,
            ect,
            ce: false,
            enqueue_ts_ns: None,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every finite, positive `f64` is accepted and round-trips through
        /// `get()` unchanged — construction never silently clamps or scales.
        #[test]
        fn weight_accepts_and_preserves_every_positive_finite_value(v in 1e-9f64..1e12) {
            let w = Weight::new(v).unwrap();
            prop_assert_eq!(w.get(), v);
        }

        /// Non-positive or non-finite values are always rejected, never
        /// silently coerced to a usable weight.
        #[test]
        fn weight_rejects_every_non_positive_value(v in -1e12f64..=0.0) {
            prop_assert!(Weight::new(v).is_err());
        }

        /// Every positive `u32` is accepted and round-trips unchanged.
        #[test]
        fn quantum_accepts_and_preserves_every_positive_value(v in 1u32..u32::MAX) {
            let q = Quantum::new(v).unwrap();
            prop_assert_eq!(q.get(), v);
        }

        /// A freshly constructed packet is always unmarked and timestamp-free,
        /// regardless of the caller-supplied length/class/ECT bit.
        #[test]
        fn new_packet_is_always_unmarked(len in 0u32..u32::MAX, class in 0usize..1_000, ect: bool) {
            let pkt = Packet::new(len, class, ect);
            prop_assert!(!pkt.ce);
            prop_assert!(pkt.enqueue_ts_ns.is_none());
            prop_assert_eq!(pkt.len_bytes, len);
            prop_assert_eq!(pkt.class, class);
            prop_assert_eq!(pkt.ect, ect);
        }
    }
}
