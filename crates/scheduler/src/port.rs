//! `Port`: the single egress scheduling point composing admission,
//! per-queue buffering, a scheduling discipline, an ECN marker, the online
//! estimators, and the token-bucket shaper into one state machine.

use std::sync::Arc;

use flowgate_core::traits::{Lifecycle, Validate};
use flowgate_core::{Clock, Error as CoreError, Packet, Result as CoreResult};
use tracing::{debug, trace, warn};

use flowgate_core::{Quantum, Weight};

use crate::buffer::{BufferMode, DropReason};
use crate::discipline::Discipline;
use crate::marker::Marker;
use crate::queue::CosQueue;
use crate::shaper::{ShaperDecision, TokenBucket};

/// How the port-wide sum estimators (weight/quantum sum, round time) are
/// fed: a periodic timer task, or inline polling on the data path.
#[derive(Debug, Clone, Copy)]
pub enum EstimatorDrive {
    Timer { period_ns: u64 },
    Poll,
}

/// Result of attempting to admit a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Admitted,
    Dropped(DropReason),
}

/// Result of attempting to dequeue a packet for transmission.
#[derive(Debug)]
pub enum DequeueOutcome {
    Packet(Packet),
    Empty,
    /// The shaper has no tokens; the caller must not retry before
    /// `wake_at_ns`.
    Throttled { wake_at_ns: u64 },
}

/// Clamp an out-of-range classification index into a port's queue range.
/// This is a contract, not an error: the classifier collaborator (or a
/// test exercising it directly) can reuse the exact clamp semantics the
/// data path applies on every `enqueue`.
pub fn clamp_queue_index(idx: usize, queue_num: usize) -> usize {
    idx.min(queue_num.saturating_sub(1))
}

/// Static, per-port wiring: queue count, discipline, marker, shaper, and
/// buffer policy. Built once at startup (or on reconfiguration) and handed
/// to `Port::new`.
pub struct PortSpec {
    pub queue_count: usize,
    pub discipline: Discipline,
    pub marker: Marker,
    pub shaper: Option<TokenBucket>,
    pub buffer_mode: BufferMode,
    pub queue_mark_thresh_bytes: Vec<u64>,
    pub queue_hard_cap_bytes: Vec<Option<u64>>,
    /// WFQ/WRR weight per queue, parallel to `queue_mark_thresh_bytes`.
    /// `None` for a queue that isn't a weight/quantum-bearing member (e.g.
    /// strict-priority-only ports).
    pub queue_weights: Vec<Option<Weight>>,
    /// WRR quantum per queue, parallel to `queue_mark_thresh_bytes`.
    pub queue_quanta: Vec<Option<Quantum>>,
    pub dq_thresh_bytes: u64,
    pub drain_beta: f64,
    pub link_capacity_bps: u64,
    pub estimator_drive: EstimatorDrive,
}

pub struct Port {
    queues: Vec<CosQueue>,
    discipline: Discipline,
    marker: Marker,
    shaper: Option<TokenBucket>,
    buffer_mode: BufferMode,
    total_bytes: u64,
    clock: Arc<dyn Clock>,
    dq_thresh_bytes: u64,
    drain_beta: f64,
    link_capacity_bps: u64,
    estimator_drive: EstimatorDrive,
    last_timer_tick_ns: u64,
    dropped_total: u64,
    admitted_total: u64,
    marked_total: u64,
}

impl Port {
    pub fn new(spec: PortSpec, clock: Arc<dyn Clock>) -> Self {
        let now_ns = clock.now_ns();
        let queue_count = spec.queue_mark_thresh_bytes.len();
        let mut queues: Vec<CosQueue> = spec
            .queue_mark_thresh_bytes
            .iter()
            .zip(spec.queue_hard_cap_bytes.iter())
            .map(|(&thresh, &cap)| {
                let mut q = CosQueue::new(thresh);
                q.hard_cap_bytes = cap;
                q
            })
            .collect();
        for i in 0..queue_count {
            if let Some(w) = spec.queue_weights.get(i).copied().flatten() {
                queues[i].weight = Some(w);
            }
            if let Some(q) = spec.queue_quanta.get(i).copied().flatten() {
                queues[i].quantum = Some(q);
            }
        }

        Self {
            queues,
            discipline: spec.discipline,
            marker: spec.marker,
            shaper: spec.shaper,
            buffer_mode: spec.buffer_mode,
            total_bytes: 0,
            clock,
            dq_thresh_bytes: spec.dq_thresh_bytes,
            drain_beta: spec.drain_beta,
            link_capacity_bps: spec.link_capacity_bps,
            estimator_drive: spec.estimator_drive,
            last_timer_tick_ns: now_ns,
            dropped_total: 0,
            admitted_total: 0,
            marked_total: 0,
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn queue_bytes(&self, idx: usize) -> Option<u64> {
        self.queues.get(idx).map(CosQueue::bytes)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn admitted_total(&self) -> u64 {
        self.admitted_total
    }

    pub fn marked_total(&self) -> u64 {
        self.marked_total
    }

    /// Per-queue occupancy snapshot, for telemetry export.
    pub fn trace_per_queue(&self) -> Vec<(usize, u64)> {
        self.queues
            .iter()
            .enumerate()
            .map(|(i, q)| (i, q.bytes()))
            .collect()
    }

    pub fn trace_total(&self) -> u64 {
        self.total_bytes
    }

    /// A `Timer`-driven estimator tick, called periodically by whatever is
    /// driving the port's clock (e.g. the `tokio` timer task in
    /// `flowgate_scheduler::timer`). No-op under `EstimatorDrive::Poll`.
    pub fn on_estimator_timer_tick(&mut self) {
        if let EstimatorDrive::Timer { .. } = self.estimator_drive {
            let now_ns = self.clock.now_ns();
            self.discipline.timer_tick_sum_estimate(now_ns);
            self.last_timer_tick_ns = now_ns;
        }
    }

    fn poll_estimator_if_due(&mut self, now_ns: u64) {
        if matches!(self.estimator_drive, EstimatorDrive::Poll) {
            self.discipline.poll_sum_estimate(now_ns);
        }
    }

    pub fn enqueue(&mut self, mut pkt: Packet) -> EnqueueOutcome {
        let now_ns = self.clock.now_ns();
        let idx = clamp_queue_index(pkt.class, self.queues.len());
        if idx != pkt.class {
            debug!(requested = pkt.class, clamped = idx, "classification index clamped into range");
        }

        if self.total_bytes == 0 {
            self.discipline.decay_idle(now_ns);
        }

        let pkt_bytes = pkt.len_bytes as u64;
        let queue_bytes = self.queues[idx].bytes();

        if let Err(reason) = self.buffer_mode.check(idx, self.total_bytes, queue_bytes, pkt_bytes) {
            self.dropped_total += 1;
            trace!(?reason, queue = idx, "packet dropped at admission");
            return EnqueueOutcome::Dropped(reason);
        }
        if let Some(cap) = self.queues[idx].hard_cap_bytes {
            if queue_bytes + pkt_bytes > cap {
                self.dropped_total += 1;
                return EnqueueOutcome::Dropped(DropReason::QueueHardCapExceeded);
            }
        }

        pkt.enqueue_ts_ns = Some(now_ns);
        if self.queues[idx].is_empty() {
            self.queues[idx].codel.reset_on_empty();
        }

        self.queues[idx].push(pkt);
        self.total_bytes += pkt_bytes;
        self.admitted_total += 1;

        self.discipline.on_enqueue(&mut self.queues, idx, now_ns);
        self.poll_estimator_if_due(now_ns);

        let weight_share = self.discipline.weight_share(&self.queues, idx);
        let quantum_round = self.discipline.quantum_and_round_time(&self.queues, idx);
        let mark = self.marker.mark_on_enqueue(
            self.queues[idx].bytes(),
            self.queues[idx].mark_thresh_bytes,
            self.total_bytes,
            weight_share,
            quantum_round,
        );
        if mark {
            if let Some(p) = self.queues[idx].peek_head_mut() {
                if p.ect {
                    p.ce = true;
                    self.marked_total += 1;
                }
            }
        }

        EnqueueOutcome::Admitted
    }

    pub fn dequeue(&mut self) -> DequeueOutcome {
        let now_ns = self.clock.now_ns();
        let idx = match self.discipline.select_candidate(&mut self.queues, now_ns) {
            Some(idx) => idx,
            None => return DequeueOutcome::Empty,
        };

        let pkt_len = self.queues[idx]
            .peek_head_len()
            .expect("select_candidate must pick a non-empty queue");

        if let Some(shaper) = &mut self.shaper {
            match shaper.try_release(pkt_len, now_ns) {
                ShaperDecision::Defer { wake_at_ns } => {
                    return DequeueOutcome::Throttled { wake_at_ns };
                }
                ShaperDecision::Release => {}
            }
        }

        let mut pkt = self.queues[idx].pop().expect("peeked packet must be present");
        self.total_bytes -= pkt.len_bytes as u64;

        let queue_bytes_after = self.queues[idx].bytes();
        self.queues[idx].drain_rate.on_dequeue(
            pkt.len_bytes,
            queue_bytes_after,
            now_ns,
            self.dq_thresh_bytes,
            self.link_capacity_bps,
            self.drain_beta,
        );

        let drain_rate_bps = self.queues[idx].drain_rate.avg_rate_bps();
        let enqueue_ts_ns = pkt.enqueue_ts_ns;
        let mark = self.marker.mark_on_dequeue(
            enqueue_ts_ns,
            now_ns,
            drain_rate_bps,
            queue_bytes_after + pkt.len_bytes as u64,
            &mut self.queues[idx].codel,
        );
        if mark && pkt.ect {
            pkt.ce = true;
            self.marked_total += 1;
        }

        self.discipline.on_dequeue_committed(
            &mut self.queues,
            idx,
            pkt.len_bytes,
            now_ns,
            self.link_capacity_bps,
        );
        self.poll_estimator_if_due(now_ns);

        if self.total_bytes == 0 {
            self.discipline.mark_idle(now_ns);
        }

        DequeueOutcome::Packet(pkt)
    }
}

impl Validate for PortSpec {
    fn validate(&self) -> CoreResult<()> {
        if self.queue_count == 0 {
            return Err(CoreError::Configuration("queue_count must be at least 1".into()));
        }
        if self.queue_count > 64 {
            return Err(CoreError::Configuration(format!(
                "queue_count {} exceeds the maximum of 64",
                self.queue_count
            )));
        }
        let per_queue_vecs = [
            ("queue_mark_thresh_bytes", self.queue_mark_thresh_bytes.len()),
            ("queue_hard_cap_bytes", self.queue_hard_cap_bytes.len()),
            ("queue_weights", self.queue_weights.len()),
            ("queue_quanta", self.queue_quanta.len()),
        ];
        for (name, len) in per_queue_vecs {
            if len != self.queue_count {
                return Err(CoreError::Configuration(format!(
                    "{name} has {len} entries but queue_count is {}",
                    self.queue_count
                )));
            }
        }
        if self.link_capacity_bps == 0 {
            return Err(CoreError::Configuration("link_capacity_bps must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.drain_beta) {
            return Err(CoreError::Configuration(format!(
                "drain_beta must be in [0, 1], got {}",
                self.drain_beta
            )));
        }
        Ok(())
    }
}

impl Lifecycle for Port {
    fn initialize(&mut self) -> CoreResult<()> {
        if self.queues.is_empty() {
            return Err(CoreError::InvalidState("port has no queues configured".into()));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> CoreResult<()> {
        let remaining: u64 = self.queues.iter().map(CosQueue::bytes).sum();
        if remaining > 0 {
            warn!(remaining_bytes = remaining, "port shut down with packets still queued");
        }
        Ok(())
    }

    fn health_check(&self) -> CoreResult<()> {
        if self.queues.is_empty() {
            return Err(CoreError::InvalidState("port has no queues configured".into()));
        }
        Ok(())
    }
}
