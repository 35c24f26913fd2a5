//! The byte-trace export sink: a plain ASCII, comma-separated line per
//! snapshot, decoupled from any particular metrics backend so a port's data
//! path never blocks on I/O.

use std::io::Write;
use std::sync::Mutex;

/// The occupancy a snapshot carries: either the port's total queued bytes,
/// or a per-queue breakdown, matching `Port::trace_total`/`trace_per_queue`.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceBytes {
    Total(u64),
    PerQueue(Vec<u64>),
}

/// One point-in-time sample of a port's queue occupancy, exported on
/// whatever cadence the caller chooses (e.g. once per estimator timer
/// tick).
#[derive(Debug, Clone, PartialEq)]
pub struct PortSnapshot {
    pub time_ns: u64,
    pub bytes: TraceBytes,
}

impl PortSnapshot {
    pub fn total(time_ns: u64, bytes_total: u64) -> Self {
        Self {
            time_ns,
            bytes: TraceBytes::Total(bytes_total),
        }
    }

    pub fn per_queue(time_ns: u64, bytes_per_queue: Vec<u64>) -> Self {
        Self {
            time_ns,
            bytes: TraceBytes::PerQueue(bytes_per_queue),
        }
    }
}

/// Something that can receive port snapshots. Implementations must not
/// block the caller for long; `Port` itself never implements this — the
/// caller samples `Port`'s occupancy and pushes a snapshot explicitly.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, snapshot: PortSnapshot);
}

/// Discards every snapshot; the default for tests and for ports that don't
/// need export.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _snapshot: PortSnapshot) {}
}

/// Writes one ASCII line per snapshot to an arbitrary `io::Write`, e.g.
/// stdout or a log file: `"<time>, <bytes_total>"` for a `Total` snapshot,
/// or `"<time>, <bytes_q0>, <bytes_q1>, ..."` for a `PerQueue` one. Mutex-
/// guarded since multiple ports may share a sink.
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> TelemetrySink for LineSink<W> {
    fn record(&self, snapshot: PortSnapshot) {
        let mut w = self.writer.lock().expect("telemetry sink mutex poisoned");
        let line = match snapshot.bytes {
            TraceBytes::Total(total) => format!("{}, {}", snapshot.time_ns, total),
            TraceBytes::PerQueue(per_queue) => {
                let mut line = snapshot.time_ns.to_string();
                for bytes in per_queue {
                    line.push_str(", ");
                    line.push_str(&bytes.to_string());
                }
                line
            }
        };
        let _ = writeln!(w, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_sink_formats_a_total_snapshot_as_time_comma_bytes() {
        let buf: Vec<u8> = Vec::new();
        let sink = LineSink::new(buf);
        sink.record(PortSnapshot::total(1_000, 4_500));
        let inner = sink.writer.lock().unwrap();
        let text = String::from_utf8_lossy(&inner);
        assert_eq!(text.as_ref(), "1000, 4500\n");
    }

    #[test]
    fn line_sink_formats_a_per_queue_snapshot_as_time_then_one_field_per_queue() {
        let buf: Vec<u8> = Vec::new();
        let sink = LineSink::new(buf);
        sink.record(PortSnapshot::per_queue(2_000, vec![100, 0, 250]));
        let inner = sink.writer.lock().unwrap();
        let text = String::from_utf8_lossy(&inner);
        assert_eq!(text.as_ref(), "2000, 100, 0, 250\n");
    }

    #[test]
    fn null_sink_never_panics() {
        let sink = NullSink;
        sink.record(PortSnapshot::total(0, 0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A `Total` snapshot always formats as exactly one comma and two
        /// fields, and those fields always parse back to the same values —
        /// the grammar is lossless for any time/byte count.
        #[test]
        fn total_snapshot_line_round_trips_through_the_grammar(
            time_ns in 0u64..u64::MAX,
            bytes_total in 0u64..u64::MAX,
        ) {
            let buf: Vec<u8> = Vec::new();
            let sink = LineSink::new(buf);
            sink.record(PortSnapshot::total(time_ns, bytes_total));

            let inner = sink.writer.lock().unwrap();
            let line = String::from_utf8_lossy(&inner);
            let line = line.trim_end_matches('\n');
            let fields: Vec<&str> = line.split(", ").collect();

            prop_assert_eq!(fields.len(), 2);
            prop_assert_eq!(fields[0].parse::<u64>().unwrap(), time_ns);
            prop_assert_eq!(fields[1].parse::<u64>().unwrap(), bytes_total);
        }

        /// A `PerQueue` snapshot always emits exactly `1 + queue count`
        /// comma-separated fields, in queue order.
        #[test]
        fn per_queue_snapshot_line_has_one_field_per_queue_plus_time(
            time_ns in 0u64..u64::MAX,
            per_queue in prop::collection::vec(0u64..u64::MAX, 0..8),
        ) {
            let buf: Vec<u8> = Vec::new();
            let sink = LineSink::new(buf);
            sink.record(PortSnapshot::per_queue(time_ns, per_queue.clone()));

            let inner = sink.writer.lock().unwrap();
            let line = String::from_utf8_lossy(&inner);
            let line = line.trim_end_matches('\n');
            let fields: Vec<&str> = line.split(", ").collect();

            prop_assert_eq!(fields.len(), 1 + per_queue.len());
            prop_assert_eq!(fields[0].parse::<u64>().unwrap(), time_ns);
            for (field, expected) in fields[1..].iter().zip(per_queue.iter()) {
                prop_assert_eq!(field.parse::<u64>().unwrap(), *expected);
            }
        }
    }
}
