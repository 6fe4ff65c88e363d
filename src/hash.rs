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

//! Random parity hash construction
//!
//! Each hash is an XOR over a random half of the independent set, guarded by
//! a fresh activation variable `a`: the constraint submitted to the solver is
//! `a ⊕ (⊕ chosen vars) = rhs`, and pushing `¬a` onto the assumption stack
//! activates it. A hash is never rewritten; the bank in force is exactly the
//! list of activation literals currently assumed, so banks are shrunk or
//! rebuilt by reassembling that list and adding fresh hashes.

use crate::cnf::{IndependentSet, Lit, Var};
use crate::rng::RandomSource;
use crate::solver::Solver;
use tracing::trace;

/// Materializes `count` fresh parity hashes over the independent set and
/// appends their activation literals to `assumptions`.
pub fn add_hashes<S: Solver>(
    count: u32,
    solver: &mut S,
    independent: &IndependentSet,
    assumptions: &mut Vec<Lit>,
    rng: &mut RandomSource,
) {
    let mut vars: Vec<Var> = Vec::with_capacity(independent.len() + 1);
    for _ in 0..count {
        let bits = rng.bits(independent.len() + 1);
        let activation = solver.new_var();
        assumptions.push(Lit::from_var(activation, false));
        vars.clear();
        vars.push(activation);
        for (j, var) in independent.iter().enumerate() {
            if bits[j + 1] {
                vars.push(var);
            }
        }
        let rhs = bits[0];
        trace!(
            activation = activation.to_dimacs(),
            width = vars.len() - 1,
            rhs,
            "adding parity hash"
        );
        solver.add_xor_clause(&vars, rhs);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::testing::ScriptedSolver;

    fn bank(seed: u64, count: u32) -> (ScriptedSolver, Vec<Lit>) {
        let mut solver = ScriptedSolver::new(6, vec![]);
        let independent = IndependentSet::all(6);
        let mut rng = RandomSource::from_seed(seed);
        let mut assumptions = Vec::new();
        add_hashes(count, &mut solver, &independent, &mut assumptions, &mut rng);
        (solver, assumptions)
    }

    #[test]
    fn same_seed_builds_identical_hashes() {
        let (a, assumptions_a) = bank(123, 4);
        let (b, assumptions_b) = bank(123, 4);
        assert_eq!(a.xors, b.xors);
        assert_eq!(assumptions_a, assumptions_b);
    }

    #[test]
    fn one_activation_literal_per_hash() {
        let (solver, assumptions) = bank(5, 3);
        assert_eq!(assumptions.len(), 3);
        assert_eq!(solver.xors.len(), 3);
        for (i, lit) in assumptions.iter().enumerate() {
            assert!(lit.is_negative(), "activation is assumed false");
            // fresh variables beyond the 6 formula variables, in order
            assert_eq!(lit.var().index(), 6 + i);
            // the guard is part of its own parity constraint
            assert_eq!(solver.xors[i].0[0], lit.var());
        }
    }

    #[test]
    fn hash_variables_come_from_the_independent_set() {
        let independent =
            IndependentSet::new(&[Var::from_dimacs(2), Var::from_dimacs(4)], 5).unwrap();
        let mut solver = ScriptedSolver::new(5, vec![]);
        let mut rng = RandomSource::from_seed(99);
        let mut assumptions = Vec::new();
        add_hashes(10, &mut solver, &independent, &mut assumptions, &mut rng);
        for (vars, _) in &solver.xors {
            for var in &vars[1..] {
                assert!(
                    var.to_dimacs() == 2 || var.to_dimacs() == 4,
                    "unexpected variable {} in hash",
                    var.to_dimacs()
                );
            }
        }
    }
}
