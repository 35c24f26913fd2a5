//! Buffer & admission control.

/// Reason a packet was dropped at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The shared port-wide buffer budget would be exceeded.
    SharedBufferFull,
    /// The per-queue static buffer budget would be exceeded.
    QueueBufferFull,
    /// The queue's hard safety cap would be exceeded.
    QueueHardCapExceeded,
}

/// Shared-vs-static buffer admission mode (configuration surface `buffer_mode`).
#[derive(Debug, Clone)]
pub enum BufferMode {
    /// A single budget shared across all queues.
    Shared { limit_bytes: u64 },
    /// An independent budget per queue.
    Static { limit_bytes: Vec<u64> },
}

impl BufferMode {
    /// Returns `Err(reason)` if admitting `pkt_bytes` into queue `idx`
    /// would violate the configured budget; never mutates any state —
    /// the caller applies the byte accounting only once admission and all
    /// other checks (e.g. the hard per-queue cap) have passed.
    pub fn check(
        &self,
        idx: usize,
        total_bytes: u64,
        queue_bytes: u64,
        pkt_bytes: u64,
    ) -> Result<(), DropReason> {
        match self {
            BufferMode::Shared { limit_bytes } => {
                if total_bytes + pkt_bytes > *limit_bytes {
                    Err(DropReason::SharedBufferFull)
                } else {
                    Ok(())
                }
            }
            BufferMode::Static { limit_bytes } => {
                let limit = limit_bytes.get(idx).copied().unwrap_or(0);
                if queue_bytes + pkt_bytes > limit {
                    Err(DropReason::QueueBufferFull)
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_mode_checks_total_not_per_queue() {
        let mode = BufferMode::Shared { limit_bytes: 10_000 };
        assert!(mode.check(0, 9_000, 100, 1_000).is_ok());
        assert_eq!(
            mode.check(0, 9_500, 100, 1_000),
            Err(DropReason::SharedBufferFull)
        );
    }

    #[test]
    fn static_mode_checks_only_the_target_queue() {
        let mode = BufferMode::Static {
            limit_bytes: vec![1_000, 5_000],
        };
        // Queue 0 is near its own limit but queue 1 (not involved) is huge.
        assert_eq!(
            mode.check(0, 50_000, 900, 200),
            Err(DropReason::QueueBufferFull)
        );
        assert!(mode.check(1, 50_000, 900, 200).is_ok());
    }
}
