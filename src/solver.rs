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

//! The incremental solving contract and its varisat-backed implementation

use crate::cnf::{CnfFormula, ExtendFormula, Lit, Var};
use crate::model::Assignment;
use tracing::trace;

/// Verdict of one incremental solve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// A model was found.
    Sat,
    /// No model under the given assumptions.
    Unsat,
    /// The solver gave up within its own budget.
    Indet,
}

/// What the counting and sampling loops require from a solver.
///
/// Assumptions hold for a single call only; clauses and XOR constraints are
/// permanent for the life of the instance.
pub trait Solver {
    /// Allocates a fresh variable.
    fn new_var(&mut self) -> Var;

    /// Total number of live variables, fresh ones included.
    fn num_vars(&self) -> usize;

    /// Asserts a disjunction permanently.
    fn add_clause(&mut self, lits: &[Lit]);

    /// Asserts a parity equation `⊕ vars = rhs` permanently.
    fn add_xor_clause(&mut self, vars: &[Var], rhs: bool);

    /// Solves under the given assumptions.
    fn solve(&mut self, assumptions: &[Lit]) -> SolveOutcome;

    /// The model of the last `Sat` verdict.
    fn model(&self) -> Option<&Assignment>;
}

/// Upper size of a parity chunk expanded directly into clauses.
const XOR_CHUNK: usize = 5;

/// A [`Solver`] backed by varisat.
///
/// varisat has no native parity constraints, so XOR clauses are materialized
/// as CNF: long equations are cut into chunks linked by fresh variables, and
/// each chunk is expanded into the clauses excluding its odd-one-out
/// assignments. varisat runs without a conflict budget and therefore never
/// answers [`SolveOutcome::Indet`].
pub struct VarisatSolver {
    inner: varisat::Solver<'static>,
    num_vars: usize,
    last_model: Option<Assignment>,
}

impl VarisatSolver {
    /// A solver preloaded with `formula`.
    pub fn from_formula(formula: &CnfFormula) -> VarisatSolver {
        let mut inner = varisat::Solver::new();
        inner.add_formula(formula);
        VarisatSolver {
            inner,
            num_vars: formula.var_count(),
            last_model: None,
        }
    }

    /// Removes variables occurring an even number of times; parity cancels.
    fn parity_support(vars: &[Var]) -> Vec<Var> {
        let mut sorted = vars.to_vec();
        sorted.sort_unstable();
        let mut support = Vec::with_capacity(sorted.len());
        let mut i = 0;
        while i < sorted.len() {
            let mut j = i;
            while j < sorted.len() && sorted[j] == sorted[i] {
                j += 1;
            }
            if (j - i) % 2 == 1 {
                support.push(sorted[i]);
            }
            i = j;
        }
        support
    }

    /// Emits the `2^(n-1)` clauses of `⊕ vars = rhs` for a short chunk.
    fn direct_parity(&mut self, vars: &[Var], rhs: bool) {
        let n = vars.len();
        if n == 0 {
            if rhs {
                self.add_clause(&[]);
            }
            return;
        }
        let mut clause = Vec::with_capacity(n);
        for assignment in 0u32..(1 << n) {
            if (assignment.count_ones() % 2 == 1) == rhs {
                continue;
            }
            clause.clear();
            for (i, &var) in vars.iter().enumerate() {
                // the literal falsified by this excluded assignment
                clause.push(Lit::from_var(var, assignment & (1u32 << i) == 0));
            }
            self.add_clause(&clause);
        }
    }
}

impl Solver for VarisatSolver {
    fn new_var(&mut self) -> Var {
        let var = self.inner.new_var();
        self.num_vars = self.num_vars.max(var.index() + 1);
        var
    }

    fn num_vars(&self) -> usize {
        self.num_vars
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        self.inner.add_clause(lits);
    }

    fn add_xor_clause(&mut self, vars: &[Var], rhs: bool) {
        let mut support = Self::parity_support(vars);
        while support.len() > XOR_CHUNK {
            let link = self.new_var();
            let mut chunk: Vec<Var> = support.drain(..XOR_CHUNK - 1).collect();
            chunk.push(link);
            self.direct_parity(&chunk, false);
            support.insert(0, link);
        }
        self.direct_parity(&support, rhs);
    }

    fn solve(&mut self, assumptions: &[Lit]) -> SolveOutcome {
        self.inner.assume(assumptions);
        match self.inner.solve() {
            Ok(true) => {
                let lits = self.inner.model().unwrap_or_default();
                self.last_model = Some(Assignment::from_true_literals(self.num_vars, &lits));
                SolveOutcome::Sat
            }
            Ok(false) => SolveOutcome::Unsat,
            Err(e) => {
                trace!("solver gave up: {}", e);
                SolveOutcome::Indet
            }
        }
    }

    fn model(&self) -> Option<&Assignment> {
        self.last_model.as_ref()
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use varisat_dimacs::DimacsParser;

    fn solver_for(dimacs: &[u8]) -> anyhow::Result<VarisatSolver> {
        let formula = DimacsParser::parse(dimacs)?;
        Ok(VarisatSolver::from_formula(&formula))
    }

    #[test]
    fn sat_and_unsat_verdicts() -> anyhow::Result<()> {
        let mut solver = solver_for(b"p cnf 2 2\n1 2 0\n-1 0\n")?;
        assert_eq!(solver.solve(&[]), SolveOutcome::Sat);
        let model = solver.model().cloned();
        assert!(model.is_some());
        assert_eq!(
            solver.solve(&[Lit::from_dimacs(-2)]),
            SolveOutcome::Unsat,
            "assuming -2 contradicts 1|2 with unit -1"
        );
        // assumptions do not persist
        assert_eq!(solver.solve(&[]), SolveOutcome::Sat);
        Ok(())
    }

    #[test]
    fn xor_clause_constrains_parity() -> anyhow::Result<()> {
        let mut solver = solver_for(b"p cnf 2 0\n")?;
        let vars = [Var::from_dimacs(1), Var::from_dimacs(2)];
        solver.add_xor_clause(&vars, true);
        // even assignments are excluded
        assert_eq!(
            solver.solve(&[Lit::from_dimacs(1), Lit::from_dimacs(2)]),
            SolveOutcome::Unsat
        );
        assert_eq!(
            solver.solve(&[Lit::from_dimacs(-1), Lit::from_dimacs(-2)]),
            SolveOutcome::Unsat
        );
        // odd assignments remain
        assert_eq!(
            solver.solve(&[Lit::from_dimacs(1), Lit::from_dimacs(-2)]),
            SolveOutcome::Sat
        );
        Ok(())
    }

    #[test]
    fn long_xor_is_chunked_but_equivalent() -> anyhow::Result<()> {
        let n = 10;
        let mut solver = solver_for(b"p cnf 10 0\n")?;
        let vars: Vec<Var> = (0..n).map(Var::from_index).collect();
        solver.add_xor_clause(&vars, true);
        assert!(solver.num_vars() > n, "chunking allocates link variables");
        // all-false has even parity
        let all_false: Vec<Lit> = (0..n)
            .map(|i| Lit::from_var(Var::from_index(i), false))
            .collect();
        assert_eq!(solver.solve(&all_false), SolveOutcome::Unsat);
        // a single true variable has odd parity
        let mut one_true = all_false;
        one_true[3] = !one_true[3];
        assert_eq!(solver.solve(&one_true), SolveOutcome::Sat);
        Ok(())
    }

    #[test]
    fn duplicated_xor_variables_cancel() -> anyhow::Result<()> {
        let mut solver = solver_for(b"p cnf 2 0\n")?;
        let v1 = Var::from_dimacs(1);
        let v2 = Var::from_dimacs(2);
        // v1 xor v1 xor v2 = v2
        solver.add_xor_clause(&[v1, v1, v2], true);
        assert_eq!(solver.solve(&[Lit::from_dimacs(-2)]), SolveOutcome::Unsat);
        assert_eq!(
            solver.solve(&[Lit::from_dimacs(2), Lit::from_dimacs(1)]),
            SolveOutcome::Sat
        );
        Ok(())
    }

    #[test]
    fn empty_xor_with_odd_rhs_is_contradictory() -> anyhow::Result<()> {
        let mut solver = solver_for(b"p cnf 1 0\n")?;
        solver.add_xor_clause(&[], true);
        assert_eq!(solver.solve(&[]), SolveOutcome::Unsat);
        Ok(())
    }

    #[test]
    fn fresh_variables_extend_the_count() -> anyhow::Result<()> {
        let mut solver = solver_for(b"p cnf 3 1\n1 2 3 0\n")?;
        assert_eq!(solver.num_vars(), 3);
        let v = solver.new_var();
        assert_eq!(v.index(), 3);
        assert_eq!(solver.num_vars(), 4);
        Ok(())
    }
}
