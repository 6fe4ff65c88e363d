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

//! CNF input: DIMACS reading (plain or gzipped) and the independent set

use anyhow::Context;
use fixedbitset::FixedBitSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
pub use varisat_dimacs::{write_dimacs, DimacsParser};
pub use varisat_formula::{CnfFormula, ExtendFormula, Lit, Var};

/// Variables the projected model count is measured on.
///
/// Ordered, without duplicates, and restricted to variables of the input
/// formula: fresh variables allocated during solving never enter this set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndependentSet {
    vars: Vec<Var>,
}

impl IndependentSet {
    /// Builds the set from declared variables, keeping first occurrences in
    /// order. Errors if a variable is outside the formula.
    pub fn new(declared: &[Var], var_count: usize) -> anyhow::Result<IndependentSet> {
        let mut seen = FixedBitSet::with_capacity(var_count);
        let mut vars = Vec::with_capacity(declared.len());
        for &v in declared {
            anyhow::ensure!(
                v.index() < var_count,
                "independent variable {} outside formula with {} variables",
                v.to_dimacs(),
                var_count
            );
            if !seen.put(v.index()) {
                vars.push(v);
            }
        }
        Ok(IndependentSet { vars })
    }

    /// The default set: every variable of the formula.
    pub fn all(var_count: usize) -> IndependentSet {
        IndependentSet {
            vars: (0..var_count).map(Var::from_index).collect(),
        }
    }

    /// Number of projection variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when the set is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Projection variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.vars.iter().copied()
    }
}

/// A parsed formula together with its independent set.
#[derive(Debug)]
pub struct Instance {
    /// The input clauses.
    pub formula: CnfFormula,
    /// Projection variables, declared in the file or defaulted to all.
    pub independent: IndependentSet,
}

impl Instance {
    /// Parses DIMACS from `read`. Lines of the form `c ind v1 v2 ... 0`
    /// declare the independent set; without any such line the set defaults
    /// to the full variable range.
    pub fn read(mut read: impl Read) -> anyhow::Result<Instance> {
        let mut bytes = Vec::new();
        read.read_to_end(&mut bytes).context("reading CNF input")?;
        let declared = independent_declarations(&bytes)?;
        let formula = DimacsParser::parse(&bytes as &[u8]).context("parsing DIMACS input")?;
        let independent = match declared {
            Some(vars) if !vars.is_empty() => {
                let set = IndependentSet::new(&vars, formula.var_count())?;
                info!(
                    declared = vars.len(),
                    kept = set.len(),
                    "independent set from input file"
                );
                set
            }
            _ => {
                debug!("no independent set declared, projecting on all variables");
                IndependentSet::all(formula.var_count())
            }
        };
        Ok(Instance {
            formula,
            independent,
        })
    }
}

/// Collects variables from `c ind ... 0` comment lines.
fn independent_declarations(bytes: &[u8]) -> anyhow::Result<Option<Vec<Var>>> {
    let mut vars = Vec::new();
    let mut found = false;
    for line in bytes.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(line);
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("c") || tokens.next() != Some("ind") {
            continue;
        }
        found = true;
        for token in tokens {
            let n: i64 = token
                .parse()
                .with_context(|| format!("bad token {:?} in independent set line", token))?;
            if n == 0 {
                break;
            }
            anyhow::ensure!(n > 0, "negative literal {} in independent set line", n);
            vars.push(Var::from_dimacs(n as isize));
        }
    }
    Ok(if found { Some(vars) } else { None })
}

/// Opens the input file, transparently decoding gzip by extension, or falls
/// back to standard input when no path is given.
pub fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn Read>> {
    match path {
        None => {
            info!("reading CNF from standard input");
            Ok(Box::new(std::io::stdin()))
        }
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening input file {}", path.display()))?;
            if path
                .extension()
                .map_or(false, |e| e.eq_ignore_ascii_case("gz"))
            {
                Ok(Box::new(flate2::read::GzDecoder::new(file)))
            } else {
                Ok(Box::new(file))
            }
        }
    }
}
