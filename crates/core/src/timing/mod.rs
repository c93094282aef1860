//! Fitting synthesized speech onto subtitle timing.

pub mod assembler;
pub mod fit;
pub mod speed;

pub use assembler::{trailing_boundary_ms, AssembledTrack, Assembler, Placement, Reconciliation};
pub use fit::{fit, FitWindow, Fitted};
pub use speed::{atempo_filter, factorize, speed_change, SignalsmithStretch, TimeStretch};
