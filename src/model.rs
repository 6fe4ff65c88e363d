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

//! Solver assignments and their canonical projections

use crate::cnf::{IndependentSet, Lit, Var};
use std::ops::Index;

/// Value of one variable in a solver model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarValue {
    /// Assigned true.
    True,
    /// Assigned false.
    False,
    /// Not assigned by the solver.
    Undef,
}

/// A total assignment as reported by a successful solve.
///
/// Indexed by variable; positions the solver left open are `Undef`. Only the
/// restriction to the independent set carries meaning for counting and
/// sampling.
#[derive(Clone, PartialEq, Eq)]
pub struct Assignment(Vec<VarValue>);

impl Assignment {
    /// An assignment of `nvars` variables, all undefined.
    pub fn undef(nvars: usize) -> Assignment {
        Assignment(vec![VarValue::Undef; nvars])
    }

    /// Builds an assignment from the literals a solver reports true.
    pub fn from_true_literals(nvars: usize, lits: &[Lit]) -> Assignment {
        let mut values = vec![VarValue::Undef; nvars];
        for lit in lits {
            if lit.var().index() < nvars {
                values[lit.var().index()] = if lit.is_positive() {
                    VarValue::True
                } else {
                    VarValue::False
                };
            }
        }
        Assignment(values)
    }

    /// Number of variables covered.
    pub fn nvars(&self) -> usize {
        self.0.len()
    }

    /// Sets one variable.
    pub fn set(&mut self, var: Var, value: VarValue) {
        self.0[var.index()] = value;
    }

    /// The literal of `var` that is true under this assignment, if defined.
    pub fn true_lit(&self, var: Var) -> Option<Lit> {
        match self[var] {
            VarValue::True => Some(Lit::from_var(var, true)),
            VarValue::False => Some(Lit::from_var(var, false)),
            VarValue::Undef => None,
        }
    }
}

impl Index<Var> for Assignment {
    type Output = VarValue;

    fn index(&self, var: Var) -> &VarValue {
        self.0.get(var.index()).unwrap_or(&VarValue::Undef)
    }
}

impl std::fmt::Debug for Assignment {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_map()
            .entries(self.0.iter().enumerate().map(|(i, v)| (i + 1, v)))
            .finish()
    }
}

/// The restriction of a model to the independent set, canonicalized as a
/// DIMACS sign-form string such as `v -1 2 -3 0`.
///
/// Two models agreeing on the independent set map to the same projection;
/// this is the uniqueness key of enumeration and of the sample multiset.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Projection(String);

impl Projection {
    /// Canonicalizes `model` over the ordered independent set.
    pub fn of(model: &Assignment, independent: &IndependentSet) -> Projection {
        let mut text = String::from("v");
        for var in independent.iter() {
            match model[var] {
                VarValue::True => {
                    text.push(' ');
                    text.push_str(&var.to_dimacs().to_string());
                }
                VarValue::False => {
                    text.push_str(" -");
                    text.push_str(&var.to_dimacs().to_string());
                }
                VarValue::Undef => {}
            }
        }
        text.push_str(" 0");
        Projection(text)
    }

    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Projection {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "Projection({})", self.0)
    }
}
