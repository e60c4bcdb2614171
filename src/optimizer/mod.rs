//! Optimizer: two interchangeable strategies behind one trait (§4.5).

pub mod bo_a;
pub mod bo_b;

pub use bo_a::BoASequential;
pub use bo_b::BoBAskTell;

use crate::knob_space::Configuration;

/// A proposed configuration plus an optional note recorded alongside it
/// in RunHistory (e.g. `"DEFAULT_CONFIG"` for BO-B's iteration 0).
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub config: Configuration,
    pub note: Option<String>,
}

/// Shared interface the TuningDriver/Orchestrator treats as opaque
/// (§4.5). `suggest()` returning `None` means the optimizer has decided
/// to stop (either plateau-exhausted or budget-exhausted); the caller
/// should read `incumbent()` and end the loop.
pub trait Optimizer {
    fn suggest(&mut self) -> Option<Suggestion>;
    fn observe(&mut self, config: Configuration, objective: f64);
    fn incumbent(&self) -> Option<(&Configuration, f64)>;
}
