//! # flowgate-scheduler
//!
//! The egress scheduling core for a single port: admission and buffering,
//! the SP/WRR/WFQ/Priority+WRR/Priority+WFQ disciplines, the six ECN
//! marking policies plus the optional CoDel marker, the weight/quantum-sum
//! and per-queue drain-rate estimators, and the token-bucket shaper.
//!
//! `Port` in [`port`] is the single entry point tying all of this together;
//! everything else is internal machinery it composes.

pub mod buffer;
pub mod config_bridge;
pub mod discipline;
pub mod error;
pub mod estimator;
pub mod marker;
pub mod port;
pub mod queue;
pub mod shaper;
pub mod timer;

pub use buffer::{BufferMode, DropReason};
pub use discipline::{Discipline, WfqState, WrrState};
pub use error::{Error, Result};
pub use marker::{CodelState, Marker, MarkingScheme};
pub use port::{clamp_queue_index, DequeueOutcome, EnqueueOutcome, EstimatorDrive, Port, PortSpec};
pub use queue::CosQueue;
pub use shaper::{ShaperDecision, TokenBucket};
