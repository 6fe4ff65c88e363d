/**************************************************************************/
/*  This file is part of UNIGEN.                                          */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Bounded model enumeration under the current hash bank
//!
//! Both entry points run the same loop: solve under the assumptions, block
//! the found model's projection with a guarded clause, repeat up to the cap.
//! The guard variable is fresh per call; the closing unit clause satisfies
//! every blocking clause added, leaving the solver satisfiability-equivalent
//! to its pre-call state. The unit is added on every exit path, timeouts
//! included.

use crate::cnf::{IndependentSet, Lit};
use crate::model::{Assignment, Projection};
use crate::rng::RandomSource;
use crate::solver::{SolveOutcome, Solver};
use crate::utils::CountingMap;
use rand::seq::SliceRandom;
use tracing::trace;

/// Result of counting distinct projections up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedCount {
    /// The cell was exhausted; holds the exact projected count.
    Exact(u64),
    /// The cap was reached with the cell still unexhausted.
    CapHit,
    /// The solver gave up; holds the partial count seen before that.
    Indet(u64),
}

/// Counts distinct projections of models under `assumptions`, up to `cap`.
pub fn bounded_count<S: Solver>(
    cap: u64,
    solver: &mut S,
    independent: &IndependentSet,
    assumptions: &[Lit],
) -> BoundedCount {
    let (outcome, _) = enumerate(cap, solver, independent, assumptions, false);
    trace!(?outcome, "bounded count");
    outcome
}

/// Result of a sampling attempt at the current hash count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The cell size fell strictly between the bounds; samples were emitted.
    InRange,
    /// The cell was too small or too large; holds the measured size.
    OutOfRange(u64),
    /// The solver gave up before the cell was measured.
    Indet,
}

/// Enumerates the cell like [`bounded_count`], and when its size lands
/// strictly between `low` and `cap`, draws `samples_to_return` of the found
/// models uniformly without replacement and records their projections in
/// `solutions`.
#[allow(clippy::too_many_arguments)]
pub fn bounded_sample<S: Solver>(
    cap: u64,
    low: u64,
    samples_to_return: u64,
    solver: &mut S,
    independent: &IndependentSet,
    assumptions: &[Lit],
    rng: &mut RandomSource,
    solutions: &mut CountingMap<Projection>,
) -> SampleOutcome {
    let (outcome, models) = enumerate(cap, solver, independent, assumptions, true);
    let n = match outcome {
        BoundedCount::Indet(_) => return SampleOutcome::Indet,
        BoundedCount::CapHit => return SampleOutcome::OutOfRange(cap),
        BoundedCount::Exact(n) => n,
    };
    if n <= low {
        return SampleOutcome::OutOfRange(n);
    }
    let mut indices: Vec<usize> = (0..models.len()).collect();
    indices.shuffle(rng);
    for &i in indices.iter().take(samples_to_return as usize) {
        let projection = Projection::of(&models[i], independent);
        solutions[&projection] += 1;
    }
    trace!(cell = n, emitted = samples_to_return, "cell in range");
    SampleOutcome::InRange
}

/// The shared enumeration loop. Saves models only when asked to.
fn enumerate<S: Solver>(
    cap: u64,
    solver: &mut S,
    independent: &IndependentSet,
    assumptions: &[Lit],
    save_models: bool,
) -> (BoundedCount, Vec<Assignment>) {
    let guard = solver.new_var();
    let mut local = assumptions.to_vec();
    local.push(Lit::from_var(guard, false));

    let mut count = 0u64;
    let mut models = Vec::new();
    let outcome = loop {
        if count == cap {
            break BoundedCount::CapHit;
        }
        match solver.solve(&local) {
            SolveOutcome::Unsat => break BoundedCount::Exact(count),
            SolveOutcome::Indet => break BoundedCount::Indet(count),
            SolveOutcome::Sat => {
                let model = solver
                    .model()
                    .cloned()
                    .expect("solver reported SAT without a model");
                count += 1;
                let mut blocking = Vec::with_capacity(independent.len() + 1);
                blocking.push(Lit::from_var(guard, true));
                for var in independent.iter() {
                    if let Some(lit) = model.true_lit(var) {
                        blocking.push(!lit);
                    }
                }
                solver.add_clause(&blocking);
                if save_models {
                    models.push(model);
                }
            }
        }
    };
    // disarms every blocking clause added above
    solver.add_clause(&[Lit::from_var(guard, true)]);
    (outcome, models)
}
