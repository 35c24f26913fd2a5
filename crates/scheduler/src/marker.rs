//! ECN marking policies: four enqueue-time threshold schemes, two
//! dequeue-time sojourn-based schemes, plus the optional CoDel marker that
//! can run instead of either dequeue-time scheme.

use crate::estimator::EPSILON;

/// Which marking policy a port applies at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkingScheme {
    /// Mark when the packet's own queue exceeds its static threshold.
    PerQueue,
    /// Mark when total port occupancy exceeds a single shared threshold.
    PerPort,
    /// Mark when the queue exceeds a threshold proportional to its share
    /// of the active weight/quantum sum (works for both WFQ and WRR).
    MqEcnGeneric,
    /// Mark when the queue exceeds a threshold proportional to its share
    /// of estimated round-robin service rate.
    MqEcnRoundRobin,
    /// Mark based on dequeue-time sojourn delay against a fixed target.
    Latency,
    /// Mark based on an estimated queueing delay derived from the
    /// per-queue drain-rate estimator (queue_bytes / drain_rate).
    PieLike,
}

/// Configuration and policy logic for marking ECT packets CE.
pub struct Marker {
    pub scheme: MarkingScheme,
    pub port_thresh_bytes: u64,
    pub link_capacity_bps: u64,
    pub latency_thresh_ns: u64,
    /// When set, CoDel runs instead of `Latency`/`PieLike` at dequeue time,
    /// independent of which enqueue-time scheme (if any) is also active.
    pub codel_enabled: bool,
    pub codel_target_ns: u64,
    pub codel_interval_ns: u64,
}

impl Marker {
    /// Enqueue-time marking decision for `PerQueue`/`PerPort`/`MqEcnGeneric`/
    /// `MqEcnRoundRobin`. Returns `false` (never marks here) for the
    /// dequeue-time schemes.
    #[allow(clippy::too_many_arguments)]
    pub fn mark_on_enqueue(
        &self,
        queue_bytes: u64,
        queue_mark_thresh_bytes: u64,
        port_bytes: u64,
        weight_share: Option<(f64, f64)>,
        quantum_round: Option<(u32, f64)>,
    ) -> bool {
        match self.scheme {
            MarkingScheme::PerQueue => queue_bytes > queue_mark_thresh_bytes,
            MarkingScheme::PerPort => port_bytes > self.port_thresh_bytes,
            MarkingScheme::MqEcnGeneric => {
                let thresh = match weight_share {
                    Some((w_q, w_hat)) if w_hat > EPSILON => (w_q / w_hat
                        * self.port_thresh_bytes as f64)
                        .min(self.port_thresh_bytes as f64),
                    _ => self.port_thresh_bytes as f64,
                };
                queue_bytes as f64 > thresh
            }
            MarkingScheme::MqEcnRoundRobin => {
                let thresh = match quantum_round {
                    Some((quantum, round_time_ns))
                        if round_time_ns > EPSILON && self.link_capacity_bps > 0 =>
                    {
                        let estimate_rate_bps = (quantum as f64 * 8.0 * 1_000_000_000.0
                            / round_time_ns)
                            .min(self.link_capacity_bps as f64);
                        estimate_rate_bps * self.port_thresh_bytes as f64
                            / self.link_capacity_bps as f64
                    }
                    _ => self.port_thresh_bytes as f64,
                };
                queue_bytes as f64 > thresh
            }
            MarkingScheme::Latency | MarkingScheme::PieLike => false,
        }
    }

    /// Dequeue-time marking decision for `Latency`/`PieLike`/CoDel. `codel`
    /// is the packet's queue's CoDel state, mutated only when
    /// `codel_enabled`.
    pub fn mark_on_dequeue(
        &self,
        enqueue_ts_ns: Option<u64>,
        now_ns: u64,
        drain_rate_bps: Option<f64>,
        queue_bytes_before_pop: u64,
        codel: &mut CodelState,
    ) -> bool {
        if self.codel_enabled {
            return codel.should_mark(
                enqueue_ts_ns,
                now_ns,
                self.codel_target_ns,
                self.codel_interval_ns,
            );
        }
        match self.scheme {
            MarkingScheme::Latency => match enqueue_ts_ns {
                Some(ts) => now_ns.saturating_sub(ts) > self.latency_thresh_ns,
                None => false,
            },
            MarkingScheme::PieLike => match drain_rate_bps {
                Some(rate) if rate > EPSILON => {
                    let estimated_delay_ns =
                        queue_bytes_before_pop as f64 * 8.0 * 1_000_000_000.0 / rate;
                    estimated_delay_ns > self.latency_thresh_ns as f64
                }
                _ => false,
            },
            _ => false,
        }
    }
}

const REC_INV_SQRT_BITS: u32 = 16;
const REC_INV_SQRT_SHIFT: u32 = 32 - REC_INV_SQRT_BITS;

/// CoDel marking state, carried per queue. Time is kept in plain
/// nanoseconds rather than the kernel's quantized `codel_time_t` — at our
/// precision this is a units simplification, not a behavior change, since
/// every comparison in the control law is relative.
#[derive(Debug, Clone)]
pub struct CodelState {
    count: u32,
    lastcount: u32,
    marking: bool,
    rec_inv_sqrt: u16,
    first_above_time_ns: Option<u64>,
    mark_next_ns: u64,
}

impl CodelState {
    pub fn new() -> Self {
        Self {
            count: 0,
            lastcount: 0,
            marking: false,
            rec_inv_sqrt: 0,
            first_above_time_ns: None,
            mark_next_ns: 0,
        }
    }

    /// Called when the queue drains to empty: CoDel leaves marking state.
    pub fn reset_on_empty(&mut self) {
        self.marking = false;
    }

    /// `new_invsqrt = (invsqrt/2) * (3 - count*invsqrt^2)`, one iteration
    /// of Newton's method towards `1/sqrt(count)` in Q0.32 fixed point.
    fn newton_step(&mut self) {
        let invsqrt = (self.rec_inv_sqrt as u64) << REC_INV_SQRT_SHIFT;
        let invsqrt2 = (invsqrt * invsqrt) >> 32;
        let val = (3u64 << 32).wrapping_sub(self.count as u64 * invsqrt2);
        let val = val >> 2;
        let val = (val * invsqrt) >> (32 - 2 + 1);
        self.rec_inv_sqrt = (val >> REC_INV_SQRT_SHIFT) as u16;
    }

    /// `t + interval / sqrt(count)`, computed via the maintained reciprocal
    /// to avoid a real sqrt or divide.
    fn control_law(&self, t: u64, interval_ns: u64) -> u64 {
        let inv = (self.rec_inv_sqrt as u128) << REC_INV_SQRT_SHIFT;
        t + ((interval_ns as u128 * inv) >> 32) as u64
    }

    fn sojourn_above_target(&mut self, sojourn_ns: u64, now_ns: u64, target_ns: u64, interval_ns: u64) -> bool {
        if sojourn_ns < target_ns {
            self.first_above_time_ns = None;
            return false;
        }
        match self.first_above_time_ns {
            None => {
                self.first_above_time_ns = Some(now_ns + interval_ns);
                false
            }
            Some(t) if now_ns > t => true,
            Some(_) => false,
        }
    }

    pub fn should_mark(
        &mut self,
        enqueue_ts_ns: Option<u64>,
        now_ns: u64,
        target_ns: u64,
        interval_ns: u64,
    ) -> bool {
        let sojourn_ns = match enqueue_ts_ns {
            Some(ts) => now_ns.saturating_sub(ts),
            None => return false,
        };
        let above_target = self.sojourn_above_target(sojourn_ns, now_ns, target_ns, interval_ns);

        if self.marking {
            if !above_target {
                self.marking = false;
                false
            } else if now_ns >= self.mark_next_ns {
                self.count += 1;
                self.newton_step();
                self.mark_next_ns = self.control_law(self.mark_next_ns, interval_ns);
                true
            } else {
                false
            }
        } else if above_target {
            self.marking = true;
            let delta = self.count.wrapping_sub(self.lastcount);
            if delta > 1 && now_ns.saturating_sub(self.mark_next_ns) < (interval_ns << 4) {
                self.count = delta;
                self.newton_step();
            } else {
                self.count = 1;
                self.rec_inv_sqrt = u16::MAX;
            }
            self.lastcount = self.count;
            self.mark_next_ns = self.control_law(now_ns, interval_ns);
            true
        } else {
            false
        }
    }
}

impl Default for CodelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_queue_marks_only_on_its_own_threshold() {
        let m = Marker {
            scheme: MarkingScheme::PerQueue,
            port_thresh_bytes: 1_000_000,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        assert!(m.mark_on_enqueue(2_000, 1_000, 500_000, None, None));
        assert!(!m.mark_on_enqueue(500, 1_000, 2_000_000, None, None));
    }

    #[test]
    fn mq_ecn_generic_scales_threshold_by_weight_share() {
        let m = Marker {
            scheme: MarkingScheme::MqEcnGeneric,
            port_thresh_bytes: 100_000,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        // weight share 1/4 -> threshold 25_000 bytes.
        assert!(m.mark_on_enqueue(30_000, 0, 0, Some((1.0, 4.0)), None));
        assert!(!m.mark_on_enqueue(20_000, 0, 0, Some((1.0, 4.0)), None));
    }

    #[test]
    fn mq_ecn_generic_falls_back_to_port_thresh_when_estimate_is_zero() {
        let m = Marker {
            scheme: MarkingScheme::MqEcnGeneric,
            port_thresh_bytes: 50_000,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        assert!(!m.mark_on_enqueue(40_000, 0, 0, Some((1.0, 0.0)), None));
        assert!(m.mark_on_enqueue(60_000, 0, 0, Some((1.0, 0.0)), None));
    }

    #[test]
    fn mq_ecn_round_robin_scales_threshold_by_estimated_rate_share() {
        let m = Marker {
            scheme: MarkingScheme::MqEcnRoundRobin,
            port_thresh_bytes: 100_000,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        // quantum 1500B / round_time 12us -> estimated rate 1 Gbps, i.e. the
        // full link, so the threshold converges to the full port threshold.
        assert!(m.mark_on_enqueue(150_000, 0, 0, None, Some((1500, 12_000.0))));
        assert!(!m.mark_on_enqueue(50_000, 0, 0, None, Some((1500, 12_000.0))));
    }

    #[test]
    fn mq_ecn_round_robin_falls_back_to_port_thresh_when_round_time_is_zero() {
        let m = Marker {
            scheme: MarkingScheme::MqEcnRoundRobin,
            port_thresh_bytes: 50_000,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        assert!(!m.mark_on_enqueue(40_000, 0, 0, None, Some((1500, 0.0))));
        assert!(m.mark_on_enqueue(60_000, 0, 0, None, Some((1500, 0.0))));
    }

    #[test]
    fn pie_like_marks_when_estimated_queueing_delay_exceeds_threshold() {
        let m = Marker {
            scheme: MarkingScheme::PieLike,
            port_thresh_bytes: 0,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 1_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        let mut codel = CodelState::new();
        // 200_000 bytes at an estimated 1 Gbps drain rate -> 1.6ms, over the
        // 1ms threshold.
        assert!(m.mark_on_dequeue(None, 0, Some(1_000_000_000.0), 200_000, &mut codel));
        // 50_000 bytes at the same rate -> 0.4ms, under the threshold.
        assert!(!m.mark_on_dequeue(None, 0, Some(1_000_000_000.0), 50_000, &mut codel));
    }

    #[test]
    fn pie_like_never_marks_before_a_drain_rate_estimate_exists() {
        let m = Marker {
            scheme: MarkingScheme::PieLike,
            port_thresh_bytes: 0,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 1_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        let mut codel = CodelState::new();
        assert!(!m.mark_on_dequeue(None, 0, None, 1_000_000, &mut codel));
    }

    #[test]
    fn latency_marks_when_sojourn_exceeds_threshold() {
        let m = Marker {
            scheme: MarkingScheme::Latency,
            port_thresh_bytes: 0,
            link_capacity_bps: 1_000_000_000,
            latency_thresh_ns: 1_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
        };
        let mut codel = CodelState::new();
        assert!(m.mark_on_dequeue(Some(0), 5_000, None, 0, &mut codel));
        assert!(!m.mark_on_dequeue(Some(4_500), 5_000, None, 0, &mut codel));
    }

    #[test]
    fn codel_stays_quiet_below_target() {
        let mut codel = CodelState::new();
        assert!(!codel.should_mark(Some(0), 1_000_000, 5_000_000, 100_000_000));
    }

    #[test]
    fn codel_enters_marking_state_once_above_target_for_an_interval() {
        let mut codel = CodelState::new();
        // Sojourn is 6ms (above a 5ms target) continuously.
        let target = 5_000_000;
        let interval = 100_000_000;
        assert!(!codel.should_mark(Some(0), 6_000_000, target, interval)); // first_above_time set
        assert!(!codel.should_mark(Some(0), 50_000_000, target, interval)); // still within interval
        assert!(codel.should_mark(Some(0), 110_000_000, target, interval)); // past first_above_time
    }
}
