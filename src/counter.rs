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

//! The ApproxMC counting loop
//!
//! Each trial grows the number of active parity hashes until the bounded
//! enumerator finds at most `pivot` projections in the cell, then records the
//! pair (hash count, cell count). Trials whose enumeration fails (empty cell
//! or solver give-up) retry the same hash count with fresh hashes at most
//! twice in a row before advancing by one hash. The per-trial records are
//! scaled to the smallest recorded hash count and aggregated by median.

use crate::cnf::IndependentSet;
use crate::driver::{Config, Deadline};
use crate::enumerate::{bounded_count, BoundedCount};
use crate::hash::add_hashes;
use crate::rng::RandomSource;
use crate::solver::Solver;
use crate::utils::log2;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, info};

/// The counting estimate: `cell_count · 2^hash_count` projected models.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SatCount {
    /// Median cell size over the recorded trials.
    pub cell_count: u64,
    /// Hash count the cell sizes were scaled to.
    pub hash_count: u32,
}

impl SatCount {
    /// True when no trial produced a record: the formula has no model.
    pub fn is_unsat(&self) -> bool {
        self.cell_count == 0 && self.hash_count == 0
    }

    /// The point estimate as an integer.
    pub fn estimate(&self) -> BigUint {
        BigUint::from(self.cell_count) << self.hash_count
    }

    /// log₂ of the estimate.
    pub fn influence(&self) -> f32 {
        log2(&self.estimate())
    }
}

impl Display for SatCount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Models: {} x 2^{} (~2^{:.1})",
            self.cell_count,
            self.hash_count,
            self.influence()
        )
    }
}

/// Runs `t_approxmc` counting trials and aggregates them.
///
/// Returns the zero count when no trial succeeded, which the caller reads as
/// "unsatisfiable" once the deadline has been ruled out.
pub fn approx_mc<S: Solver>(
    solver: &mut S,
    independent: &IndependentSet,
    config: &Config,
    rng: &mut RandomSource,
    deadline: &Deadline,
) -> SatCount {
    let pivot = config.pivot_approxmc;
    // formula variables only; guards and activation variables added later
    // must not inflate the hash budget
    let var_budget = solver.num_vars() as i64;
    let mut records: Vec<(u32, u64)> = Vec::with_capacity(config.t_approxmc as usize);
    let mut assumptions = Vec::new();
    let mut repeat_try = 0u32;
    for trial in 0..config.t_approxmc {
        assumptions.clear();
        let mut hash_count: i64 = 0;
        let mut record = None;
        let mut out_of_time = false;
        while hash_count < var_budget {
            if deadline.expired() {
                out_of_time = true;
                break;
            }
            match bounded_count(pivot + 1, solver, independent, &assumptions) {
                BoundedCount::Indet(_) | BoundedCount::Exact(0) => {
                    // resample the same level, at most twice in a row
                    assumptions.clear();
                    if repeat_try < 2 {
                        add_hashes(hash_count as u32, solver, independent, &mut assumptions, rng);
                        hash_count -= 1;
                        repeat_try += 1;
                    } else {
                        add_hashes(
                            hash_count as u32 + 1,
                            solver,
                            independent,
                            &mut assumptions,
                            rng,
                        );
                        repeat_try = 0;
                    }
                }
                BoundedCount::CapHit => {
                    // cell too big, one more hash halves it
                    add_hashes(1, solver, independent, &mut assumptions, rng);
                }
                BoundedCount::Exact(n) => {
                    record = Some((hash_count as u32, n));
                    break;
                }
            }
            hash_count += 1;
        }
        assumptions.clear();
        if out_of_time {
            info!(trial, "counting interrupted by the deadline");
            break;
        }
        match record {
            Some((hashes, cell)) => {
                debug!(trial, hashes, cell, "trial landed in range");
                records.push((hashes, cell));
            }
            None => debug!(trial, "trial exhausted its hash budget"),
        }
    }
    aggregate(&records)
}

/// Scales all records to the minimum hash count and takes the median.
fn aggregate(records: &[(u32, u64)]) -> SatCount {
    let min_hash = match records.iter().map(|&(h, _)| h).min() {
        None => return SatCount {
            cell_count: 0,
            hash_count: 0,
        },
        Some(m) => m,
    };
    let mut scaled: Vec<BigUint> = records
        .iter()
        .map(|&(h, n)| BigUint::from(n) << (h - min_hash))
        .collect();
    scaled.sort();
    let index = ((scaled.len() + 1) / 2).min(scaled.len() - 1);
    // scaled counts at the minimum hash count stay cell-sized
    let cell_count = scaled[index].to_u64().unwrap_or(u64::MAX);
    SatCount {
        cell_count,
        hash_count: min_hash,
    }
}
