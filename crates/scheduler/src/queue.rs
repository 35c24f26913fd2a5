//! A single Class-of-Service queue and its per-discipline bookkeeping.

use std::collections::VecDeque;

use flowgate_core::{Packet, Quantum, Weight};

use crate::estimator::DrainRateState;

/// Sentinel for `head_finish_time` on an empty WFQ queue.
pub const INFINITE_FINISH_TIME: f64 = f64::INFINITY;

/// One Class-of-Service FIFO queue, plus the state every discipline,
/// marker, and estimator needs to track per queue.
///
/// Only `enqueue`/`dequeue` mutate `packets`/`bytes`/`packet_count`; all
/// other state is mutated exclusively by the discipline, marker, or
/// estimator that owns it, never by the queue itself.
pub struct CosQueue {
    packets: VecDeque<Packet>,
    bytes: u64,

    /// WFQ weight. `None` when the queue isn't a WFQ/WRR member (e.g. the
    /// strict-priority tier of a two-tier discipline).
    pub weight: Option<Weight>,
    /// WRR quantum. `None` when the queue isn't a WRR member.
    pub quantum: Option<Quantum>,
    /// Per-queue ECN marking threshold, in bytes (already scaled by the
    /// configured mean packet size).
    pub mark_thresh_bytes: u64,
    /// Optional hard per-queue buffer cap, independent of the port's
    /// shared/static admission budget.
    pub hard_cap_bytes: Option<u64>,

    /// WFQ: virtual finish time of the current head packet, in the same
    /// dimensionless units as `Port`'s virtual time (bytes/weight).
    pub head_finish_time: f64,

    /// WRR: bytes of credit accumulated this round.
    pub deficit_counter: u32,
    /// WRR: whether this queue is on the active list.
    pub active: bool,
    /// WRR: whether this queue is the one currently being served in the
    /// active-list traversal (i.e. has already received a quantum credit
    /// this round).
    pub current: bool,
    /// WRR: wall-clock start of the current round, for round-time sampling.
    pub round_start_time_ns: u64,

    /// Per-queue drain-rate estimator state, used by PIE-like marking and
    /// exposed for diagnostics regardless of marking scheme.
    pub drain_rate: DrainRateState,

    /// CoDel marker state, present regardless of which marker is active so
    /// switching schemes at runtime never loses history.
    pub codel: crate::marker::CodelState,
}

impl CosQueue {
    pub fn new(mark_thresh_bytes: u64) -> Self {
        Self {
            packets: VecDeque::new(),
            bytes: 0,
            weight: None,
            quantum: None,
            mark_thresh_bytes,
            hard_cap_bytes: None,
            head_finish_time: INFINITE_FINISH_TIME,
            deficit_counter: 0,
            active: false,
            current: false,
            round_start_time_ns: 0,
            drain_rate: DrainRateState::new(),
            codel: crate::marker::CodelState::new(),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn peek_head(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn peek_head_len(&self) -> Option<u32> {
        self.packets.front().map(|p| p.len_bytes)
    }

    pub fn push(&mut self, pkt: Packet) {
        self.bytes += pkt.len_bytes as u64;
        self.packets.push_back(pkt);
    }

    pub fn pop(&mut self) -> Option<Packet> {
        let pkt = self.packets.pop_front()?;
        self.bytes -= pkt.len_bytes as u64;
        Some(pkt)
    }

    pub fn peek_head_mut(&mut self) -> Option<&mut Packet> {
        self.packets.front_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_fifo_and_tracks_bytes() {
        let mut q = CosQueue::new(1_000_000);
        q.push(Packet::new(100, 0, false));
        q.push(Packet::new(200, 0, false));
        assert_eq!(q.bytes(), 300);
        assert_eq!(q.packet_count(), 2);

        let first = q.pop().unwrap();
        assert_eq!(first.len_bytes, 100);
        assert_eq!(q.bytes(), 200);

        let second = q.pop().unwrap();
        assert_eq!(second.len_bytes, 200);
        assert_eq!(q.bytes(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn empty_queue_has_infinite_finish_time_by_convention() {
        let q = CosQueue::new(1_000_000);
        assert_eq!(q.head_finish_time, INFINITE_FINISH_TIME);
    }
}
