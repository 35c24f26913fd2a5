//! Turns a validated [`flowgate_config::PortConfig`] into the [`PortSpec`]
//! `Port::new` actually consumes — the glue the config crate's `configure`
//! surface needs to ever reach the data path.

use flowgate_config::{BufferModeKind, DisciplineKind, MarkingSchemeKind, PortConfig, QueueConfig};
use flowgate_core::traits::Validate;
use flowgate_core::{Quantum, Result, Weight};

use crate::buffer::BufferMode;
use crate::discipline::{Discipline, WfqState, WrrState};
use crate::marker::{Marker, MarkingScheme};
use crate::port::{EstimatorDrive, PortSpec};
use crate::shaper::TokenBucket;

fn queue_or_default(cfg: &PortConfig, i: usize) -> QueueConfig {
    cfg.queues.get(i).cloned().unwrap_or_default()
}

fn build_discipline(cfg: &PortConfig, now_ns: u64) -> Discipline {
    let idle_period_ns = if cfg.link_capacity_bps == 0 {
        0
    } else {
        (cfg.estimate_idle_interval_bytes as u128 * 8 * 1_000_000_000 / cfg.link_capacity_bps as u128)
            as u64
    };
    match cfg.discipline {
        DisciplineKind::Sp => Discipline::Sp,
        DisciplineKind::Wrr => Discipline::Wrr(WrrState::new(
            cfg.estimate_quantum_alpha,
            cfg.estimate_round_alpha,
            idle_period_ns,
            now_ns,
        )),
        DisciplineKind::Wfq => {
            Discipline::Wfq(WfqState::new(cfg.estimate_weight_alpha, idle_period_ns, now_ns))
        }
        DisciplineKind::PrioWrr => Discipline::PrioWrr {
            prio_num: cfg.prio_queue_num,
            lower: WrrState::new(
                cfg.estimate_quantum_alpha,
                cfg.estimate_round_alpha,
                idle_period_ns,
                now_ns,
            ),
        },
        DisciplineKind::PrioWfq => Discipline::PrioWfq {
            prio_num: cfg.prio_queue_num,
            lower: WfqState::new(cfg.estimate_weight_alpha, idle_period_ns, now_ns),
        },
    }
}

/// `CoDel` as a `marking_scheme` selects the dequeue-time CoDel marker with
/// no enqueue-time scheme of its own — `Latency`'s enqueue arm is already a
/// no-op, and `Marker::mark_on_dequeue` checks `codel_enabled` before ever
/// looking at `scheme`.
fn marking_scheme_and_codel(cfg: &PortConfig) -> (MarkingScheme, bool) {
    match cfg.marking_scheme {
        MarkingSchemeKind::PerQueue => (MarkingScheme::PerQueue, cfg.codel_enabled),
        MarkingSchemeKind::PerPort => (MarkingScheme::PerPort, cfg.codel_enabled),
        MarkingSchemeKind::MqEcnGeneric => (MarkingScheme::MqEcnGeneric, cfg.codel_enabled),
        MarkingSchemeKind::MqEcnRoundRobin => (MarkingScheme::MqEcnRoundRobin, cfg.codel_enabled),
        MarkingSchemeKind::Latency => (MarkingScheme::Latency, cfg.codel_enabled),
        MarkingSchemeKind::PieLike => (MarkingScheme::PieLike, cfg.codel_enabled),
        MarkingSchemeKind::CoDel => (MarkingScheme::Latency, true),
    }
}

impl PortSpec {
    /// Build a `PortSpec` from an already-validated `PortConfig`. This does
    /// not repeat `PortConfig::validate`'s own bounds checks; it maps
    /// fields and then runs `PortSpec::validate` as a defense-in-depth
    /// check on the result.
    pub fn from_config(cfg: &PortConfig, now_ns: u64) -> Result<Self> {
        let queue_count = cfg.queue_num;
        let prio_num = match cfg.discipline {
            DisciplineKind::PrioWrr | DisciplineKind::PrioWfq => cfg.prio_queue_num,
            _ => 0,
        };
        let weighted = matches!(cfg.discipline, DisciplineKind::Wfq | DisciplineKind::PrioWfq);
        let rr = matches!(cfg.discipline, DisciplineKind::Wrr | DisciplineKind::PrioWrr);

        let mut queue_mark_thresh_bytes = Vec::with_capacity(queue_count);
        let mut queue_hard_cap_bytes = Vec::with_capacity(queue_count);
        let mut queue_weights = Vec::with_capacity(queue_count);
        let mut queue_quanta = Vec::with_capacity(queue_count);
        let mut static_limits = Vec::with_capacity(queue_count);

        for i in 0..queue_count {
            let qc = queue_or_default(cfg, i);
            queue_mark_thresh_bytes.push(qc.mark_thresh_bytes);
            queue_hard_cap_bytes.push(qc.hard_cap_bytes);
            static_limits.push(qc.static_buffer_bytes);

            if i >= prio_num && weighted {
                queue_weights.push(Some(Weight::new(qc.weight)?));
            } else {
                queue_weights.push(None);
            }
            if i >= prio_num && rr {
                queue_quanta.push(Some(Quantum::new(qc.quantum_bytes)?));
            } else {
                queue_quanta.push(None);
            }
        }

        let buffer_mode = match cfg.buffer_mode {
            BufferModeKind::Shared => BufferMode::Shared {
                limit_bytes: cfg.shared_buffer_bytes,
            },
            BufferModeKind::Static => BufferMode::Static {
                limit_bytes: static_limits,
            },
        };

        let (scheme, codel_enabled) = marking_scheme_and_codel(cfg);

        let shaper = if cfg.bucket_bytes == 0 {
            None
        } else {
            let mut bucket = TokenBucket::new(cfg.link_capacity_bps, 0, now_ns);
            let bucket_ns = if cfg.bucket_ns > 0 {
                cfg.bucket_ns
            } else {
                bucket.len_to_ns(cfg.bucket_bytes)
            };
            bucket = TokenBucket::new(cfg.link_capacity_bps, bucket_ns, now_ns);
            Some(bucket)
        };

        let estimator_drive = if cfg.estimate_weight_enable_timer {
            EstimatorDrive::Timer {
                period_ns: cfg.estimate_timer_period_ns,
            }
        } else {
            EstimatorDrive::Poll
        };

        let spec = PortSpec {
            queue_count,
            discipline: build_discipline(cfg, now_ns),
            marker: Marker {
                scheme,
                port_thresh_bytes: cfg.port_thresh_bytes,
                link_capacity_bps: cfg.link_capacity_bps,
                latency_thresh_ns: cfg.latency_thresh_ns,
                codel_enabled,
                codel_target_ns: cfg.codel_target_ns,
                codel_interval_ns: cfg.codel_interval_ns,
            },
            shaper,
            buffer_mode,
            queue_mark_thresh_bytes,
            queue_hard_cap_bytes,
            queue_weights,
            queue_quanta,
            dq_thresh_bytes: cfg.dq_thresh_bytes,
            drain_beta: cfg.drain_rate_beta,
            link_capacity_bps: cfg.link_capacity_bps,
            estimator_drive,
        };

        spec.validate()?;
        Ok(spec)
    }
}
