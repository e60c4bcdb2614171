//! BO-A: sequential model-based optimisation over a typed configuration
//! space, with plateau-based early stopping (§4.5 Strategy BO-A).
//!
//! The original unwinds a black-box optimizer from inside its objective
//! callback by raising a sentinel exception once a plateau is detected.
//! Here the plateau counter lives on the optimizer itself and
//! `suggest()` simply returns `None` once the limit is reached (§9).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::knob_space::{Configuration, KnobKind, KnobSpace, KnobValue};
use crate::optimizer::{Optimizer, Suggestion};

const DEFAULT_SEED: u64 = 42;

pub struct BoASequential {
    tunable: Vec<(String, KnobKind, f64, f64)>,
    rng: StdRng,
    runcount_limit: u32,
    plateau_iterations: u32,
    iterations_done: u32,
    plateau_counter: u32,
    best_objective: Option<f64>,
    best_config: Option<Configuration>,
    stopped: bool,
}

impl BoASequential {
    pub fn new(space: &KnobSpace, runcount_limit: u32, plateau_iterations: u32) -> Self {
        let tunable = space
            .iter()
            .filter(|(_, knob)| knob.is_tunable())
            .map(|(name, knob)| (name.to_string(), knob.kind, knob.min, knob.max))
            .collect();
        Self {
            tunable,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            runcount_limit,
            plateau_iterations: plateau_iterations.max(1),
            iterations_done: 0,
            plateau_counter: 0,
            best_objective: None,
            best_config: None,
            stopped: false,
        }
    }

    fn sample(&mut self) -> Configuration {
        let mut values = HashMap::with_capacity(self.tunable.len());
        for (name, kind, min, max) in &self.tunable {
            let raw = if (max - min).abs() < f64::EPSILON {
                *min
            } else {
                self.rng.gen_range(*min..=*max)
            };
            let value = match kind {
                KnobKind::Integer => KnobValue::Integer(raw.round() as i64),
                KnobKind::Real | KnobKind::Constant => KnobValue::Real(raw),
            };
            values.insert(name.clone(), value);
        }
        Configuration::new(values)
    }

    pub fn early_stopped(&self) -> bool {
        self.stopped && self.plateau_counter >= self.plateau_iterations
    }
}

impl Optimizer for BoASequential {
    fn suggest(&mut self) -> Option<Suggestion> {
        if self.stopped {
            return None;
        }
        if self.iterations_done >= self.runcount_limit {
            self.stopped = true;
            return None;
        }
        if self.plateau_counter >= self.plateau_iterations {
            self.stopped = true;
            return None;
        }
        self.iterations_done += 1;
        Some(Suggestion { config: self.sample(), note: None })
    }

    fn observe(&mut self, config: Configuration, objective: f64) {
        let improved = self.best_objective.map(|best| objective < best).unwrap_or(true);
        if improved {
            self.best_objective = Some(objective);
            self.best_config = Some(config);
            self.plateau_counter = 0;
        } else {
            self.plateau_counter += 1;
        }
    }

    fn incumbent(&self) -> Option<(&Configuration, f64)> {
        self.best_config.as_ref().zip(self.best_objective)
    }
}
