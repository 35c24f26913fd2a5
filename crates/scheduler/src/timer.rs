//! Optional periodic timer feeding the weight/quantum-sum estimator.
//!
//! `Port` itself is never shared across threads: the timer task only posts
//! tick notifications over an `mpsc` channel, and the data-path thread
//! drains them and applies each one by calling `Port::on_estimator_timer_tick`.
//! This keeps the scheduler single-threaded and lock-free on the hot path
//! while still allowing a real wall-clock cadence independent of traffic.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::port::Port;

struct EstimatorTick;

pub struct TimerHandle {
    receiver: mpsc::Receiver<EstimatorTick>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn a `tokio` task that ticks every `period` and hands control
    /// back to the caller via [`TimerHandle::drain`].
    pub fn spawn(period: Duration) -> Self {
        let (tx, receiver) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(EstimatorTick).await.is_err() {
                    return;
                }
            }
        });
        Self { receiver, task }
    }

    /// Apply every tick that has fired since the last drain. Never blocks:
    /// the data path calls this on its own schedule (e.g. once per
    /// dequeue loop iteration).
    pub fn drain(&mut self, port: &mut Port) {
        while self.receiver.try_recv().is_ok() {
            port.on_estimator_timer_tick();
        }
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferMode;
    use crate::discipline::{Discipline, WfqState};
    use crate::marker::{Marker, MarkingScheme};
    use crate::port::{EstimatorDrive, PortSpec};
    use flowgate_core::VirtualClock;
    use std::sync::Arc;

    fn dummy_port() -> Port {
        let spec = PortSpec {
            queue_count: 1,
            discipline: Discipline::Wfq(WfqState::new(0.875, 1_000_000, 0)),
            marker: Marker {
                scheme: MarkingScheme::PerPort,
                port_thresh_bytes: 1_000_000,
                link_capacity_bps: 1_000_000_000,
                latency_thresh_ns: 5_000_000,
                codel_enabled: false,
                codel_target_ns: 5_000_000,
                codel_interval_ns: 100_000_000,
            },
            shaper: None,
            buffer_mode: BufferMode::Shared { limit_bytes: 10_000 },
            queue_mark_thresh_bytes: vec![10_000],
            queue_hard_cap_bytes: vec![None],
            queue_weights: vec![None],
            queue_quanta: vec![None],
            dq_thresh_bytes: 1_000,
            drain_beta: 0.875,
            link_capacity_bps: 1_000_000_000,
            estimator_drive: EstimatorDrive::Timer { period_ns: 1_000_000 },
        };
        Port::new(spec, Arc::new(VirtualClock::new(0)))
    }

    #[tokio::test]
    async fn drain_applies_every_pending_tick_and_consumes_the_queue() {
        let mut handle = TimerHandle::spawn(Duration::from_millis(1));
        let mut port = dummy_port();
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.drain(&mut port);
        assert!(handle.receiver.try_recv().is_err());
        handle.shutdown().await;
    }
}
