//! Token-bucket shaper gating dequeue at a configured rate.

/// Outcome of asking the shaper whether a candidate packet may be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaperDecision {
    /// Enough tokens; the candidate may be dequeued now.
    Release,
    /// Not enough tokens; the caller must not re-enter dequeue before
    /// `wake_at_ns`.
    Defer { wake_at_ns: u64 },
}

/// A token bucket measured in nanosecond-equivalents, exactly mirroring
/// the kernel qdisc fixed-point conversion: `mult = 8e9 * 2^shift /
/// rate_bps`, `shift = 15`, `len_ns = (len_bytes * mult) >> shift`.
pub struct TokenBucket {
    rate_bps: u64,
    mult: u64,
    shift: u32,
    bucket_ns: i64,
    tokens_ns: i64,
    last_refill_ns: u64,
}

const FIXED_POINT_SHIFT: u32 = 15;

impl TokenBucket {
    pub fn new(rate_bps: u64, bucket_ns: i64, now_ns: u64) -> Self {
        let (mult, shift) = if rate_bps > 0 {
            let mult = (8u128 * 1_000_000_000u128 * (1u128 << FIXED_POINT_SHIFT)) / rate_bps as u128;
            (mult as u64, FIXED_POINT_SHIFT)
        } else {
            (1, 0)
        };

        Self {
            rate_bps,
            mult,
            shift,
            bucket_ns,
            tokens_ns: 0,
            last_refill_ns: now_ns,
        }
    }

    /// bytes -> nanoseconds-to-transmit at the configured rate.
    pub fn len_to_ns(&self, len_bytes: u32) -> i64 {
        ((len_bytes as u64 * self.mult) >> self.shift) as i64
    }

    pub fn rate_bps(&self) -> u64 {
        self.rate_bps
    }

    /// Ask whether `len_bytes` may be released at `now_ns`. On `Release`,
    /// the bucket's internal token count is updated immediately — callers
    /// must only call this once they are committed to emitting the packet
    /// (or must discard the `Release` decision and not call again with the
    /// same packet, since tokens are not refundable).
    pub fn try_release(&mut self, len_bytes: u32, now_ns: u64) -> ShaperDecision {
        let elapsed = (now_ns as i64 - self.last_refill_ns as i64).max(0);
        let toks = elapsed.min(self.bucket_ns) + self.tokens_ns;
        let pkt_ns = self.len_to_ns(len_bytes);

        if toks > pkt_ns {
            self.tokens_ns = (toks - pkt_ns).min(self.bucket_ns);
            self.last_refill_ns = now_ns;
            ShaperDecision::Release
        } else {
            ShaperDecision::Defer {
                wake_at_ns: now_ns + (pkt_ns - toks) as u64,
            }
        }
    }
}
