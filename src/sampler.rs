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

//! The UniGen2 sampling loop
//!
//! A sample attempt probes up to three hash counts around the start
//! iteration `q`, beginning at the offset that succeeded last. At each probe
//! the hash bank is adjusted by the difference to the previous count, then
//! the cell is enumerated; a cell whose size lands strictly between the
//! thresholds yields the attempt's samples. A probe at offset 1 decides the
//! order of the remaining two offsets from the measured cell size. Solver
//! give-ups rebuild the bank and retry the same probe at most twice in a
//! row.

use crate::cnf::{IndependentSet, Lit};
use crate::driver::{Config, Deadline};
use crate::enumerate::{bounded_sample, SampleOutcome};
use crate::hash::add_hashes;
use crate::model::Projection;
use crate::rng::RandomSource;
use crate::solver::Solver;
use crate::utils::CountingMap;
use tracing::{debug, trace};

/// What one batch of sample attempts did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Attempts made, failed ones included.
    pub attempts: u32,
    /// Attempts that produced samples.
    pub produced: u32,
    /// True when the batch stopped on the deadline.
    pub timed_out: bool,
}

/// Draws `samples` batches of near-uniform samples at hash counts around
/// `q`, recording projections in `solutions`.
///
/// `last_offset` carries the last successful probe offset across batches and
/// solver replacements.
#[allow(clippy::too_many_arguments)]
pub fn unigen2<S: Solver>(
    samples: u32,
    q: u32,
    solver: &mut S,
    independent: &IndependentSet,
    config: &Config,
    rng: &mut RandomSource,
    solutions: &mut CountingMap<Projection>,
    last_offset: &mut u32,
    deadline: &Deadline,
) -> BatchOutcome {
    let (hi, lo) = config.unigen_band();
    let samples_to_return = if config.multisample { lo.max(1) } else { 1 };
    let mut assumptions: Vec<Lit> = Vec::new();
    let mut attempts = 0u32;
    let mut produced = 0u32;
    let mut timed_out = false;

    while produced < samples {
        attempts += 1;
        let mut offsets = match *last_offset {
            0 => [0u32, 1, 2],
            2 => [2, 1, 0],
            _ => [1, 0, 2],
        };
        // the tail after offset 1 is decided by the first cell measured there
        let mut tail_chosen = *last_offset != 1;
        let mut repeat_try = 0u32;
        let mut last_hash_count: i64 = 0;
        let mut success = false;
        assumptions.clear();

        let mut probe = 0;
        while probe < 3 {
            let offset = offsets[probe];
            let current = q + offset;
            let delta = current as i64 - last_hash_count;
            if delta > 0 {
                add_hashes(delta as u32, solver, independent, &mut assumptions, rng);
            } else if delta < 0 {
                assumptions.clear();
                add_hashes(current, solver, independent, &mut assumptions, rng);
            }
            last_hash_count = current as i64;

            if deadline.expired() {
                timed_out = true;
                break;
            }
            let outcome = bounded_sample(
                hi + 1,
                lo,
                samples_to_return,
                solver,
                independent,
                &assumptions,
                rng,
                solutions,
            );
            trace!(attempt = attempts, hashes = current, ?outcome, "probe");
            match outcome {
                SampleOutcome::InRange => {
                    *last_offset = offset;
                    success = true;
                    break;
                }
                SampleOutcome::OutOfRange(cell) => {
                    if probe == 0 && offset == 1 && !tail_chosen {
                        if cell < lo {
                            offsets[1] = 0;
                            offsets[2] = 2;
                        } else {
                            offsets[1] = 2;
                            offsets[2] = 0;
                        }
                        tail_chosen = true;
                    }
                    probe += 1;
                }
                SampleOutcome::Indet => {
                    // bank may be half-committed, rebuild it
                    assumptions.clear();
                    if repeat_try < 2 {
                        add_hashes(current, solver, independent, &mut assumptions, rng);
                        repeat_try += 1;
                    } else {
                        last_hash_count = 0;
                        if probe == 0 && offset == 1 && !tail_chosen {
                            offsets[1] = 0;
                            offsets[2] = 2;
                            tail_chosen = true;
                        }
                        repeat_try = 0;
                        probe += 1;
                    }
                }
            }
        }

        if success {
            produced += 1;
        } else {
            debug!(attempt = attempts, "no probe landed in range, retrying");
        }
        assumptions.clear();
        if timed_out || deadline.expired() {
            timed_out = true;
            break;
        }
    }
    BatchOutcome {
        attempts,
        produced,
        timed_out,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::testing::{ScriptedSolver, Step};
    use crate::solver::VarisatSolver;
    use varisat_dimacs::DimacsParser;

    fn config(pivot: u32, kappa: f64, multisample: bool) -> Config {
        Config {
            pivot_unigen: pivot,
            kappa,
            multisample,
            ..Config::default()
        }
    }

    fn tautology(nvars: usize) -> VarisatSolver {
        let dimacs = format!("p cnf {} 0\n", nvars);
        let formula = DimacsParser::parse(dimacs.as_bytes()).unwrap();
        VarisatSolver::from_formula(&formula)
    }

    #[test]
    fn band_thresholds_match_the_reference_values() {
        let cfg = config(27, 0.638, false);
        let (hi, lo) = cfg.unigen_band();
        assert_eq!(hi, 64);
        assert_eq!(lo, 11);
    }

    #[test]
    fn samples_come_from_cells_in_the_band() {
        // 8 projected models, band (3, 20]: every attempt samples the whole
        // cell at q = 0
        let cfg = config(8, 0.638, false);
        let s = IndependentSet::all(3);
        let mut rng = RandomSource::from_seed(77);
        let mut solutions = CountingMap::new();
        let mut last_offset = 0;
        let mut solver = tautology(3);
        let deadline = Deadline::unlimited();
        let outcome = unigen2(
            25,
            0,
            &mut solver,
            &s,
            &cfg,
            &mut rng,
            &mut solutions,
            &mut last_offset,
            &deadline,
        );
        assert_eq!(outcome.produced, 25);
        assert_eq!(outcome.attempts, 25, "cell always fits the band at q=0");
        assert!(!outcome.timed_out);
        assert_eq!(solutions.total(), 25);
        // every drawn projection is one of the 8 models
        for (projection, _) in solutions.iter() {
            let text = projection.as_str();
            assert!(text.starts_with("v ") && text.ends_with(" 0"), "{}", text);
        }
        assert!(solutions.count_non_zero() <= 8);
    }

    #[test]
    fn multisample_emits_the_low_threshold_per_success() {
        // 16 models, pivot 27 / kappa 0.638: band (11, 64], lo = 11
        let cfg = config(27, 0.638, true);
        let s = IndependentSet::all(4);
        let mut rng = RandomSource::from_seed(5);
        let mut solutions = CountingMap::new();
        let mut last_offset = 0;
        let mut solver = tautology(4);
        let deadline = Deadline::unlimited();
        let outcome = unigen2(
            2,
            0,
            &mut solver,
            &s,
            &cfg,
            &mut rng,
            &mut solutions,
            &mut last_offset,
            &deadline,
        );
        assert_eq!(outcome.produced, 2);
        assert_eq!(solutions.total(), 2 * 11);
    }

    #[test]
    fn deterministic_given_the_seed() {
        let run = || {
            let cfg = config(8, 0.638, false);
            let s = IndependentSet::all(3);
            let mut rng = RandomSource::from_seed(123);
            let mut solutions = CountingMap::new();
            let mut last_offset = 0;
            let mut solver = tautology(3);
            let deadline = Deadline::unlimited();
            unigen2(
                10,
                0,
                &mut solver,
                &s,
                &cfg,
                &mut rng,
                &mut solutions,
                &mut last_offset,
                &deadline,
            );
            solutions
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn expired_deadline_stops_before_any_solve() {
        let cfg = config(8, 0.638, false);
        let s = IndependentSet::all(3);
        let mut rng = RandomSource::from_seed(1);
        let mut solutions = CountingMap::new();
        let mut last_offset = 0;
        let mut solver = ScriptedSolver::new(3, vec![]);
        let deadline = Deadline::already_expired();
        let outcome = unigen2(
            5,
            0,
            &mut solver,
            &s,
            &cfg,
            &mut rng,
            &mut solutions,
            &mut last_offset,
            &deadline,
        );
        assert!(outcome.timed_out);
        assert_eq!(outcome.produced, 0);
        assert!(solver.solves.is_empty(), "no solve after the deadline");
    }

    /// Probing at offset 1 first: an out-of-range cell fixes the remaining
    /// probe order, and later solver give-ups at the next offset must not
    /// rewrite it.
    #[test]
    fn tail_is_fixed_by_the_first_out_of_range_at_offset_one() {
        let cfg = config(27, 0.638, false);
        let (hi, _) = cfg.unigen_band();
        let s = IndependentSet::all(4);
        let mut rng = RandomSource::from_seed(8);
        let mut solutions = CountingMap::new();
        let mut last_offset = 1;
        // attempt 1, probe at q+1: big cell (cap reached) -> tail [2, 0];
        // probe at q+2: three give-ups -> advance without touching the tail;
        // probe at q+0: three give-ups again -> the attempt fails.
        // attempt 2 lands in range at q+1 so the batch terminates.
        let mut steps = Vec::new();
        for _ in 0..hi + 1 {
            steps.push(Step::Sat((0..4).map(|i| i % 2 == 0).collect()));
        }
        for _ in 0..6 {
            steps.push(Step::Indet);
        }
        for _ in 0..20 {
            steps.push(Step::Sat((0..4).map(|i| i % 2 == 0).collect()));
        }
        steps.push(Step::Unsat);
        let mut solver = ScriptedSolver::new(4, steps);
        let deadline = Deadline::unlimited();

        // q = 5 so the three offsets use distinct hash counts
        let outcome = unigen2(
            1,
            5,
            &mut solver,
            &s,
            &cfg,
            &mut rng,
            &mut solutions,
            &mut last_offset,
            &deadline,
        );
        // hash bank sizes per enumeration of the first attempt must walk
        // 6 (q+1), then 7 (q+2) three times, then 5 (q+0) three times
        let mut banks: Vec<usize> = Vec::new();
        let mut solve_index = 0;
        // first enumeration spans hi + 1 SAT answers
        banks.push(solver.solves[0].len());
        solve_index += (hi + 1) as usize;
        for _ in 0..6 {
            banks.push(solver.solves[solve_index].len());
            solve_index += 1;
        }
        // the assumption stack also carries the enumeration guard, hence +1
        assert_eq!(banks, vec![6 + 1, 8, 8, 8, 6, 6, 6]);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.produced, 1);
        assert_eq!(last_offset, 1, "success at q+1 keeps the offset");
    }
}
