//! Scheduling disciplines: SP, WRR (deficit-based), WFQ, and the two-tier
//! Priority+WRR / Priority+WFQ compositions.
//!
//! The NS2/kernel reference this is ported from keeps a whole scheduler file
//! per discipline. Here it's one tagged enum behind a uniform method set, so
//! every variant lives in this one module instead of five near-identical
//! copies.

use std::collections::VecDeque;

use crate::estimator::{RoundTimeEstimator, SumEstimator};
use crate::queue::{CosQueue, INFINITE_FINISH_TIME};

/// Per-queue WRR bookkeeping the active list needs beyond what lives on
/// `CosQueue` itself (the active list's order is the scheduler's to own,
/// never the queue's).
pub struct WrrState {
    active_list: VecDeque<usize>,
    quantum_sum: u32,
    quantum_sum_estimate: SumEstimator,
    round_time: RoundTimeEstimator,
    round_alpha: f64,
    quantum_alpha: f64,
    max_rotation_steps: u32,
}

impl WrrState {
    pub fn new(quantum_alpha: f64, round_alpha: f64, idle_period_ns: u64, now_ns: u64) -> Self {
        Self {
            active_list: VecDeque::new(),
            quantum_sum: 0,
            quantum_sum_estimate: SumEstimator::new(quantum_alpha, idle_period_ns, now_ns),
            round_time: RoundTimeEstimator::new(round_alpha, idle_period_ns, now_ns),
            round_alpha,
            quantum_alpha,
            max_rotation_steps: 10_000,
        }
    }

    pub fn quantum_sum_estimate(&self) -> f64 {
        self.quantum_sum_estimate.value()
    }

    pub fn round_time_ns(&self) -> f64 {
        self.round_time.value_ns()
    }

    /// Idle-decay reset, called by `Port` the moment a new packet arrives
    /// into a tier that had been fully empty. Reproduces the NS2 reference's
    /// discrepancy: `round_time` decays with the quantum-sum alpha rather
    /// than its own alpha (see DESIGN.md). `quantum_sum_estimate` decays
    /// correctly with its own alpha via the continuous formula.
    pub fn decay_idle(&mut self, now_ns: u64) {
        self.quantum_sum_estimate.decay_idle(now_ns);
        self.round_time.decay_idle_with_alpha(now_ns, self.quantum_alpha);
    }

    pub fn mark_idle(&mut self, now_ns: u64) {
        self.quantum_sum_estimate.mark_idle(now_ns);
        self.round_time.mark_idle(now_ns);
    }

    pub fn poll_quantum_sum_estimate(&mut self, now_ns: u64) {
        self.quantum_sum_estimate.poll(self.quantum_sum as f64, now_ns);
    }

    pub fn timer_tick_quantum_sum_estimate(&mut self, now_ns: u64) {
        self.quantum_sum_estimate.timer_tick(self.quantum_sum as f64, now_ns);
    }

    fn on_enqueue(&mut self, queues: &mut [CosQueue], idx: usize, now_ns: u64) {
        let q = &mut queues[idx];
        if !q.active {
            q.active = true;
            q.current = false;
            q.deficit_counter = 0;
            q.round_start_time_ns = now_ns;
            self.active_list.push_back(idx);
            self.quantum_sum += q.quantum.expect("WRR queue must have a quantum").get();
        }
    }

    fn select_candidate(&mut self, queues: &mut [CosQueue], now_ns: u64) -> Option<usize> {
        let mut steps = 0u32;
        loop {
            let &head = self.active_list.front()?;
            let q = &mut queues[head];

            if !q.current {
                q.current = true;
                q.deficit_counter += q.quantum.expect("WRR queue must have a quantum").get();
            }

            let head_len = q
                .peek_head_len()
                .expect("active-listed queue must be non-empty");

            if head_len <= q.deficit_counter {
                return Some(head);
            }

            // Packet too large for the remaining deficit this round:
            // record a round-time sample, rotate to the tail, and try
            // again. This mirrors the reference's tight `for (;;)` retry
            // loop rather than waiting for a future `dequeue` call.
            let sample_ns = (now_ns.saturating_sub(q.round_start_time_ns)) as f64;
            self.round_time.on_round_boundary(sample_ns, now_ns);
            q.current = false;
            q.round_start_time_ns = now_ns;

            self.active_list.pop_front();
            self.active_list.push_back(head);

            steps += 1;
            if steps > self.max_rotation_steps {
                panic!(
                    "WRR scheduler failed to find an eligible queue after {steps} rotations \
                     — not work-conserving (quantum too small relative to packet size?)"
                );
            }
        }
    }

    fn on_dequeue_committed(
        &mut self,
        queues: &mut [CosQueue],
        idx: usize,
        pkt_len: u32,
        now_ns: u64,
        link_capacity_bps: u64,
    ) {
        let q = &mut queues[idx];
        q.deficit_counter -= pkt_len;

        if q.is_empty() {
            q.active = false;
            q.current = false;
            let transmission_time_ns = if link_capacity_bps > 0 {
                pkt_len as f64 * 8.0 * 1_000_000_000.0 / link_capacity_bps as f64
            } else {
                0.0
            };
            let sample_ns =
                now_ns.saturating_sub(q.round_start_time_ns) as f64 + transmission_time_ns;
            self.round_time.on_round_boundary(sample_ns, now_ns);
            self.quantum_sum -= q.quantum.expect("WRR queue must have a quantum").get();

            if let Some(pos) = self.active_list.iter().position(|&i| i == idx) {
                self.active_list.remove(pos);
            }
        }
    }
}

/// Port-wide WFQ bookkeeping: the virtual-time clock and the exact and
/// EWMA'd active-weight sums MQ-ECN-Gen marking needs.
pub struct WfqState {
    virtual_time: f64,
    active_weight_sum: f64,
    weight_sum_estimate: SumEstimator,
}

impl WfqState {
    pub fn new(alpha: f64, period_ns: u64, now_ns: u64) -> Self {
        Self {
            virtual_time: 0.0,
            active_weight_sum: 0.0,
            weight_sum_estimate: SumEstimator::new(alpha, period_ns, now_ns),
        }
    }

    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    pub fn weight_sum_estimate(&self) -> f64 {
        self.weight_sum_estimate.value()
    }

    pub fn decay_idle(&mut self, now_ns: u64) {
        self.weight_sum_estimate.decay_idle(now_ns);
    }

    pub fn mark_idle(&mut self, now_ns: u64) {
        self.weight_sum_estimate.mark_idle(now_ns);
    }

    pub fn poll_weight_sum_estimate(&mut self, now_ns: u64) {
        self.weight_sum_estimate.poll(self.active_weight_sum, now_ns);
    }

    pub fn timer_tick_weight_sum_estimate(&mut self, now_ns: u64) {
        self.weight_sum_estimate.timer_tick(self.active_weight_sum, now_ns);
    }

    fn on_enqueue(&mut self, queues: &mut [CosQueue], idx: usize, _now_ns: u64) {
        let q = &mut queues[idx];
        let weight = q.weight.expect("WFQ queue must have a weight").get();

        if q.packet_count() == 1 {
            // Queue was empty before this packet arrived.
            let pkt_len = q.peek_head_len().unwrap();
            q.head_finish_time = self.virtual_time + pkt_len as f64 / weight;
            self.virtual_time = self.virtual_time.max(q.head_finish_time);
            self.active_weight_sum += weight;
        }
    }

    fn select_candidate(&self, queues: &[CosQueue]) -> Option<usize> {
        queues
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .min_by(|(ia, a), (ib, b)| {
                a.head_finish_time
                    .partial_cmp(&b.head_finish_time)
                    .unwrap()
                    .then(ia.cmp(ib))
            })
            .map(|(i, _)| i)
    }

    fn on_dequeue_committed(&mut self, queues: &mut [CosQueue], idx: usize, _now_ns: u64) {
        let q = &mut queues[idx];
        let weight = q.weight.expect("WFQ queue must have a weight").get();

        if let Some(next_len) = q.peek_head_len() {
            q.head_finish_time += next_len as f64 / weight;
            self.virtual_time = self.virtual_time.max(q.head_finish_time);
        } else {
            q.head_finish_time = INFINITE_FINISH_TIME;
            self.active_weight_sum -= weight;
        }
    }
}

/// The discipline in force for a port: strict priority, one of the two
/// weighted disciplines, or a two-tier priority composition over one.
pub enum Discipline {
    Sp,
    Wrr(WrrState),
    Wfq(WfqState),
    /// Queues `[0, prio_num)` are strict priority; `[prio_num, len)` are
    /// served by the wrapped WRR discipline.
    PrioWrr { prio_num: usize, lower: WrrState },
    /// Same composition with a WFQ lower tier.
    PrioWfq { prio_num: usize, lower: WfqState },
}

fn sp_select(queues: &[CosQueue], from: usize) -> Option<usize> {
    (from..queues.len()).find(|&i| !queues[i].is_empty())
}

impl Discipline {
    pub fn on_enqueue(&mut self, queues: &mut [CosQueue], idx: usize, now_ns: u64) {
        match self {
            Discipline::Sp => {}
            Discipline::Wrr(state) => state.on_enqueue(queues, idx, now_ns),
            Discipline::Wfq(state) => state.on_enqueue(queues, idx, now_ns),
            Discipline::PrioWrr { prio_num, lower } => {
                if idx >= *prio_num {
                    lower.on_enqueue(queues, idx, now_ns);
                }
            }
            Discipline::PrioWfq { prio_num, lower } => {
                if idx >= *prio_num {
                    lower.on_enqueue(queues, idx, now_ns);
                }
            }
        }
    }

    pub fn select_candidate(&mut self, queues: &mut [CosQueue], now_ns: u64) -> Option<usize> {
        match self {
            Discipline::Sp => sp_select(queues, 0),
            Discipline::Wrr(state) => state.select_candidate(queues, now_ns),
            Discipline::Wfq(state) => state.select_candidate(queues),
            Discipline::PrioWrr { prio_num, lower } => {
                sp_select(queues, 0).filter(|&i| i < *prio_num).or_else(|| {
                    if queues[*prio_num..].iter().all(CosQueue::is_empty) {
                        None
                    } else {
                        lower.select_candidate(queues, now_ns)
                    }
                })
            }
            Discipline::PrioWfq { prio_num, lower } => sp_select(queues, 0)
                .filter(|&i| i < *prio_num)
                .or_else(|| lower.select_candidate(queues)),
        }
    }

    pub fn on_dequeue_committed(
        &mut self,
        queues: &mut [CosQueue],
        idx: usize,
        pkt_len: u32,
        now_ns: u64,
        link_capacity_bps: u64,
    ) {
        match self {
            Discipline::Sp => {}
            Discipline::Wrr(state) => {
                state.on_dequeue_committed(queues, idx, pkt_len, now_ns, link_capacity_bps)
            }
            Discipline::Wfq(state) => state.on_dequeue_committed(queues, idx, now_ns),
            Discipline::PrioWrr { prio_num, lower } => {
                if idx >= *prio_num {
                    lower.on_dequeue_committed(queues, idx, pkt_len, now_ns, link_capacity_bps);
                }
            }
            Discipline::PrioWfq { prio_num, lower } => {
                if idx >= *prio_num {
                    lower.on_dequeue_committed(queues, idx, now_ns);
                }
            }
        }
    }

    /// `(w_q, weight_sum_estimate)` for generic MQ-ECN marking, if this
    /// discipline maintains such a quantity for queue `idx`.
    pub fn weight_share(&self, queues: &[CosQueue], idx: usize) -> Option<(f64, f64)> {
        match self {
            Discipline::Sp => None,
            Discipline::Wrr(state) => queues[idx]
                .quantum
                .map(|q| (q.get() as f64, state.quantum_sum_estimate())),
            Discipline::Wfq(state) => queues[idx]
                .weight
                .map(|w| (w.get(), state.weight_sum_estimate())),
            Discipline::PrioWrr { prio_num, lower } => {
                if idx < *prio_num {
                    None
                } else {
                    queues[idx]
                        .quantum
                        .map(|q| (q.get() as f64, lower.quantum_sum_estimate()))
                }
            }
            Discipline::PrioWfq { prio_num, lower } => {
                if idx < *prio_num {
                    None
                } else {
                    queues[idx]
                        .weight
                        .map(|w| (w.get(), lower.weight_sum_estimate()))
                }
            }
        }
    }

    /// `(quantum, round_time_ns)` for round-robin-proportional MQ-ECN
    /// marking, only meaningful for WRR-family disciplines.
    pub fn quantum_and_round_time(&self, queues: &[CosQueue], idx: usize) -> Option<(u32, f64)> {
        match self {
            Discipline::Wrr(state) => queues[idx].quantum.map(|q| (q.get(), state.round_time_ns())),
            Discipline::PrioWrr { prio_num, lower } if idx >= *prio_num => {
                queues[idx].quantum.map(|q| (q.get(), lower.round_time_ns()))
            }
            _ => None,
        }
    }

    /// Poll-mode EWMA update, called on every enqueue/dequeue when the
    /// estimator timer is disabled.
    pub fn poll_sum_estimate(&mut self, now_ns: u64) {
        match self {
            Discipline::Wrr(state) => state.poll_quantum_sum_estimate(now_ns),
            Discipline::Wfq(state) => state.poll_weight_sum_estimate(now_ns),
            Discipline::PrioWrr { lower, .. } => lower.poll_quantum_sum_estimate(now_ns),
            Discipline::PrioWfq { lower, .. } => lower.poll_weight_sum_estimate(now_ns),
            Discipline::Sp => {}
        }
    }

    /// Timer-mode EWMA update, called once per estimator period.
    pub fn timer_tick_sum_estimate(&mut self, now_ns: u64) {
        match self {
            Discipline::Wrr(state) => state.timer_tick_quantum_sum_estimate(now_ns),
            Discipline::Wfq(state) => state.timer_tick_weight_sum_estimate(now_ns),
            Discipline::PrioWrr { lower, .. } => lower.timer_tick_quantum_sum_estimate(now_ns),
            Discipline::PrioWfq { lower, .. } => lower.timer_tick_weight_sum_estimate(now_ns),
            Discipline::Sp => {}
        }
    }

    pub fn mark_idle(&mut self, now_ns: u64) {
        match self {
            Discipline::Wrr(state) => state.mark_idle(now_ns),
            Discipline::Wfq(state) => state.mark_idle(now_ns),
            Discipline::PrioWrr { lower, .. } => lower.mark_idle(now_ns),
            Discipline::PrioWfq { lower, .. } => lower.mark_idle(now_ns),
            Discipline::Sp => {}
        }
    }

    /// Idle-decay catch-up, called when the port transitions from fully
    /// idle back to carrying traffic.
    pub fn decay_idle(&mut self, now_ns: u64) {
        match self {
            Discipline::Wrr(state) => state.decay_idle(now_ns),
            Discipline::Wfq(state) => state.decay_idle(now_ns),
            Discipline::PrioWrr { lower, .. } => lower.decay_idle(now_ns),
            Discipline::PrioWfq { lower, .. } => lower.decay_idle(now_ns),
            Discipline::Sp => {}
        }
    }

    pub fn virtual_time(&self) -> Option<f64> {
        match self {
            Discipline::Wfq(state) => Some(state.virtual_time()),
            Discipline::PrioWfq { lower, .. } => Some(lower.virtual_time()),
            _ => None,
        }
    }
}
