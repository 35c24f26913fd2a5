//! Online estimators feeding MQ-ECN and PIE-like marking.
//!
//! Three independent state machines live here:
//!
//! - [`SumEstimator`]: an EWMA of a scalar "sum" sample (active weight sum
//!   for MQ-ECN-Gen, active quantum sum for the generic-vs-RR split), fed
//!   either by an explicit timer or by data-path polling.
//! - [`RoundTimeEstimator`]: an EWMA of WRR round-completion time, fed by
//!   round-boundary events in the discipline.
//! - [`DrainRateState`]: the per-queue dequeue-rate sampler used by
//!   PIE-like marking.

/// Minimum magnitude below which a sum/rate estimate is treated as
/// uninitialized for threshold-collapse purposes.
pub const EPSILON: f64 = 1e-9;

/// EWMA of a port-wide scalar sum, sampled on a timer or by data-path
/// polling at the same nominal cadence.
///
/// The two feed paths use slightly different decay formulas by design: the
/// timer path applies one decay step per tick; the polling path applies an
/// idle-decay catch-up of possibly many steps the next time data flows.
/// Both converge to the same value after an idle period of the same
/// duration.
#[derive(Debug, Clone)]
pub struct SumEstimator {
    alpha: f64,
    /// Sampling/decay period in nanoseconds, derived from
    /// `interval_bytes * 8 / link_capacity_bps`.
    period_ns: u64,
    estimate: f64,
    /// Wall-clock time of the last sample or decay step.
    last_update_ns: u64,
    /// Wall-clock time the port last went idle (sum dropped to zero).
    last_idle_ns: u64,
    max_idle_iterations: u32,
}

impl SumEstimator {
    pub fn new(alpha: f64, period_ns: u64, now_ns: u64) -> Self {
        Self {
            alpha,
            period_ns,
            estimate: 0.0,
            last_update_ns: now_ns,
            last_idle_ns: now_ns,
            max_idle_iterations: 1_000_000,
        }
    }

    pub fn value(&self) -> f64 {
        self.estimate
    }

    /// Timer-path update: called once per `period_ns` regardless of data
    /// path activity, with the instantaneous sample.
    pub fn timer_tick(&mut self, sample: f64, now_ns: u64) {
        self.estimate = self.alpha * self.estimate + (1.0 - self.alpha) * sample;
        self.last_update_ns = now_ns;
    }

    /// Data-path polling update: called on every dequeue/enqueue with the
    /// instantaneous sample; only actually updates once the nominal period
    /// has (almost) elapsed, i.e. `elapsed >= 0.995*T`.
    pub fn poll(&mut self, sample: f64, now_ns: u64) {
        if self.period_ns == 0 {
            return;
        }
        let elapsed = now_ns.saturating_sub(self.last_update_ns);
        if elapsed as f64 >= 0.995 * self.period_ns as f64 {
            self.estimate = self.alpha * self.estimate + (1.0 - self.alpha) * sample;
            self.last_update_ns = now_ns;
        }
    }

    /// Record the start of an idle period (sum dropped to zero).
    pub fn mark_idle(&mut self, now_ns: u64) {
        self.last_idle_ns = now_ns;
    }

    /// Apply exponential decay for an idle period of length `now_ns -
    /// last_idle_ns`, matching `Ŵ <- Ŵ * alpha^(delta/T)`.
    pub fn decay_idle(&mut self, now_ns: u64) {
        if self.period_ns == 0 {
            self.estimate = 0.0;
            self.last_update_ns = now_ns;
            return;
        }
        let idle_ns = now_ns.saturating_sub(self.last_idle_ns);
        let exponent = idle_ns as f64 / self.period_ns as f64;
        self.estimate *= self.alpha.powf(exponent);
        self.last_update_ns = now_ns;
    }

    /// Integer-step idle decay used by the round-time estimator's reset
    /// path: decays by a whole number of periods, capped at
    /// `max_idle_iterations` to bound the loop for very long idles.
    fn decay_idle_stepwise(&mut self, now_ns: u64, decay_alpha: f64) {
        if self.period_ns == 0 {
            self.estimate = 0.0;
            self.last_update_ns = now_ns;
            return;
        }
        let idle_ns = now_ns.saturating_sub(self.last_idle_ns);
        let steps = idle_ns / self.period_ns;
        if steps as u64 > self.max_idle_iterations as u64 {
            self.estimate = 0.0;
        } else {
            self.estimate *= decay_alpha.powi(steps as i32);
        }
        self.last_update_ns = now_ns;
    }
}

/// EWMA of WRR round-completion time, updated on round-boundary events.
pub struct RoundTimeEstimator {
    inner: SumEstimator,
}

impl RoundTimeEstimator {
    pub fn new(alpha: f64, idle_period_ns: u64, now_ns: u64) -> Self {
        Self {
            inner: SumEstimator::new(alpha, idle_period_ns, now_ns),
        }
    }

    pub fn value_ns(&self) -> f64 {
        self.inner.value()
    }

    pub fn on_round_boundary(&mut self, sample_ns: f64, now_ns: u64) {
        self.inner.timer_tick(sample_ns, now_ns);
    }

    pub fn mark_idle(&mut self, now_ns: u64) {
        self.inner.mark_idle(now_ns);
    }

    /// Idle-decay reset path. `quantum_alpha` is accepted as a separate
    /// parameter because the NS2 MQ-ECN-RR idle-reset path decays
    /// `round_time` using the quantum-sum alpha rather than its own alpha —
    /// a known discrepancy we reproduce deliberately rather than silently
    /// "fix" (see DESIGN.md). Pass the queue's own round alpha here instead
    /// to get the corrected behavior.
    pub fn decay_idle_with_alpha(&mut self, now_ns: u64, alpha: f64) {
        self.inner.decay_idle_stepwise(now_ns, alpha);
    }
}

/// Sentinel states for the per-queue drain-rate sample window.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DrainWindow {
    /// `dq_count = INVALID`: no measurement window open.
    Invalid,
    /// `dq_count` accumulating bytes since `tstamp_ns`.
    Accumulating { tstamp_ns: u64, count_bytes: u64 },
}

/// Per-queue drain-rate estimator, feeding PIE-like marking.
#[derive(Debug, Clone)]
pub struct DrainRateState {
    window: DrainWindow,
    /// Average dequeue rate in bits/sec; `None` while uninitialized.
    avg_dq_rate_bps: Option<f64>,
}

impl DrainRateState {
    pub fn new() -> Self {
        Self {
            window: DrainWindow::Invalid,
            avg_dq_rate_bps: None,
        }
    }

    pub fn avg_rate_bps(&self) -> Option<f64> {
        self.avg_dq_rate_bps
    }

    /// Called on every dequeue from this queue, after the packet has been
    /// popped. `queue_bytes_after` is the queue's occupancy after the pop.
    /// `dq_thresh_bytes` and `link_capacity_bps` and `beta` come from
    /// configuration.
    pub fn on_dequeue(
        &mut self,
        pkt_len_bytes: u32,
        queue_bytes_after: u64,
        now_ns: u64,
        dq_thresh_bytes: u64,
        link_capacity_bps: u64,
        beta: f64,
    ) {
        let pkt_tx_ns = if link_capacity_bps > 0 {
            (pkt_len_bytes as u64 * 8 * 1_000_000_000) / link_capacity_bps
        } else {
            0
        };

        match self.window {
            DrainWindow::Invalid => {
                if queue_bytes_after >= dq_thresh_bytes {
                    self.window = DrainWindow::Accumulating {
                        tstamp_ns: now_ns,
                        count_bytes: 0,
                    };
                }
            }
            DrainWindow::Accumulating {
                tstamp_ns,
                count_bytes,
            } => {
                let count_bytes = count_bytes + pkt_len_bytes as u64;
                if count_bytes >= dq_thresh_bytes {
                    let interval_ns = (now_ns.saturating_sub(tstamp_ns)) + pkt_tx_ns;
                    let rate_bps = if interval_ns > 0 {
                        (count_bytes as f64 * 8.0 * 1_000_000_000.0) / interval_ns as f64
                    } else {
                        0.0
                    };
                    self.avg_dq_rate_bps = Some(match self.avg_dq_rate_bps {
                        Some(prev) => beta * prev + (1.0 - beta) * rate_bps,
                        None => rate_bps,
                    });

                    self.window = if queue_bytes_after < dq_thresh_bytes {
                        DrainWindow::Invalid
                    } else {
                        // Rollover subtracts one packet's transmission time
                        // from the next window's start, matching the
                        // reference estimator bit-for-bit.
                        DrainWindow::Accumulating {
                            tstamp_ns: now_ns + pkt_tx_ns,
                            count_bytes: 0,
                        }
                    };
                } else {
                    self.window = DrainWindow::Accumulating {
                        tstamp_ns,
                        count_bytes,
                    };
                }
            }
        }
    }
}

impl Default for DrainRateState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_estimator_timer_tick_is_plain_ewma() {
        let mut est = SumEstimator::new(0.5, 1000, 0);
        est.timer_tick(10.0, 1000);
        assert!((est.value() - 5.0).abs() < 1e-9);
        est.timer_tick(10.0, 2000);
        assert!((est.value() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn sum_estimator_poll_only_updates_after_period() {
        let mut est = SumEstimator::new(0.5, 1000, 0);
        est.poll(10.0, 500); // elapsed 500 < 995 -> no update
        assert_eq!(est.value(), 0.0);
        est.poll(10.0, 995); // elapsed 995 >= 0.995*1000 -> updates
        assert!((est.value() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn sum_estimator_idle_decay_matches_continuous_formula() {
        let mut est = SumEstimator::new(0.5, 1000, 0);
        est.timer_tick(100.0, 0);
        est.mark_idle(0);
        est.decay_idle(2000); // two full periods idle
        assert!((est.value() - 50.0 * 0.25).abs() < 1e-6);
    }

    #[test]
    fn drain_rate_stays_invalid_below_threshold() {
        let mut st = DrainRateState::new();
        st.on_dequeue(500, 100, 1000, 10_000, 1_000_000_000, 0.875);
        assert!(st.avg_rate_bps().is_none());
    }

    #[test]
    fn drain_rate_produces_a_sample_once_threshold_crossed() {
        let mut st = DrainRateState::new();
        // First dequeue opens the window (queue still has plenty left).
        st.on_dequeue(5_000, 20_000, 0, 10_000, 1_000_000_000, 0.875);
        assert!(st.avg_rate_bps().is_none());
        // Second dequeue crosses dq_thresh_bytes -> produces a sample.
        st.on_dequeue(6_000, 14_000, 1_000_000, 10_000, 1_000_000_000, 0.875);
        assert!(st.avg_rate_bps().is_some());
    }
}
