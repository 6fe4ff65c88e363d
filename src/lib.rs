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

#![warn(missing_docs)]

//! Approximate projected model counting and near-uniform sampling on CNF

pub mod cnf;
pub mod counter;
pub mod driver;
pub mod enumerate;
pub mod hash;
pub mod model;
pub mod rng;
pub mod sampler;
pub mod solver;
pub mod utils;

use anyhow::Context;
use driver::{Config, Deadline};
use serde::Serialize;
use solver::VarisatSolver;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::ops::DerefMut;
use std::path::PathBuf;
use structopt::clap::arg_enum;
use structopt::StructOpt;
use tracing::info;

arg_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Mode {
        Count,
        Sample,
    }
}

#[derive(Debug)]
/// Writes the result in json to a file.
pub struct ResultWriter {
    file: RefCell<File>,
    path: PathBuf,
}

impl ResultWriter {
    fn write<R: Serialize>(&self, result: &R) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(self.file.borrow_mut().deref_mut(), result)
            .with_context(|| format!("writing result to {}", self.path.display()))
    }
}

impl From<&std::ffi::OsStr> for ResultWriter {
    fn from(path: &std::ffi::OsStr) -> ResultWriter {
        let path: PathBuf = path.into();
        let file = match File::create(&path) {
            Ok(f) => RefCell::new(f),
            Err(e) => {
                tracing::error!(
                    "failed to open {} to write results (--json option): {}",
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
        };
        ResultWriter { path, file }
    }
}

/// Configuration options
#[derive(Debug, StructOpt)]
#[structopt(
    name = "unigen",
    about = "Approximate projected model counting and near-uniform witness sampling"
)]
pub struct Opt {
    #[structopt(possible_values = &Mode::variants(), case_insensitive = true, default_value = "sample", short, long)]
    /// Count projected models or sample witnesses
    mode: Mode,

    /// Input file in DIMACS CNF, optionally gzipped. Standard input when
    /// absent. `c ind ... 0` lines declare the independent set.
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,

    /// Total sample count target
    #[structopt(long, default_value = "1")]
    samples: u32,

    /// Cell size cap of the counting phase
    #[structopt(long, default_value = "60")]
    pivot_approxmc: u64,

    /// Cell size anchor of the sampling phase
    #[structopt(long, default_value = "27")]
    pivot_unigen: u32,

    /// Sampling tolerance, widens the accepted cell size band
    #[structopt(long, default_value = "0.638")]
    kappa: f64,

    /// Number of counting trials, preferably odd
    #[structopt(long, default_value = "1")]
    t_approxmc: u32,

    /// Manual start iteration; 0 computes it with the counting phase
    #[structopt(long, default_value = "0")]
    start_iteration: u32,

    /// Sample attempts per solver instance; 0 picks automatically
    #[structopt(long, default_value = "0")]
    calls_per_solver: u32,

    /// Emit the low threshold of samples per successful attempt
    #[structopt(long)]
    multisample: bool,

    /// Global wall-clock budget in seconds
    #[structopt(long, default_value = "72000")]
    total_timeout: f64,

    /// Fixed random seed, for replayable runs
    #[structopt(long)]
    seed: Option<u64>,

    /// JSON output to the specified file
    #[structopt(short, long, parse(from_os_str))]
    json: Option<ResultWriter>,

    /// Enable debug output
    #[structopt(short, long)]
    debug: bool,
}

impl Opt {
    fn config(&self) -> Config {
        Config {
            samples: self.samples,
            pivot_approxmc: self.pivot_approxmc,
            pivot_unigen: self.pivot_unigen,
            kappa: self.kappa,
            t_approxmc: self.t_approxmc,
            start_iteration: self.start_iteration,
            calls_per_solver: self.calls_per_solver,
            multisample: self.multisample,
            total_timeout: self.total_timeout,
            seed: self.seed,
        }
    }
}

fn setup_tracing(opt: &Opt) -> anyhow::Result<()> {
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::prelude::*;
    let min_level = if opt.debug { Level::TRACE } else { Level::INFO };
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::filter_fn(move |metadata| *metadata.level() <= min_level),
    );
    let subscriber = tracing_subscriber::Registry::default().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing collector")?;
    Ok(())
}

#[derive(Serialize)]
struct SampleResult {
    seed: u64,
    sample_count: u64,
    attempts: u32,
    elapsed_s: f64,
    timed_out: bool,
    unsat: bool,
    solutions: BTreeMap<String, u64>,
}

impl From<&driver::SampleReport> for SampleResult {
    fn from(report: &driver::SampleReport) -> SampleResult {
        SampleResult {
            seed: report.seed,
            sample_count: report.sample_count,
            attempts: report.attempts,
            elapsed_s: report.elapsed.as_secs_f64(),
            timed_out: report.timed_out,
            unsat: report.unsat,
            solutions: report
                .solutions
                .iter()
                .map(|(p, n)| (p.as_str().to_owned(), n))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct CountResult {
    seed: u64,
    cell_count: u64,
    hash_count: u32,
    estimate: String,
    unsat: bool,
    elapsed_s: f64,
    timed_out: bool,
}

impl From<&driver::CountReport> for CountResult {
    fn from(report: &driver::CountReport) -> CountResult {
        CountResult {
            seed: report.seed,
            cell_count: report.count.cell_count,
            hash_count: report.count.hash_count,
            estimate: report.count.estimate().to_string(),
            unsat: report.count.is_unsat(),
            elapsed_s: report.elapsed.as_secs_f64(),
            timed_out: report.timed_out,
        }
    }
}

/// entrypoint of the binary
pub fn run() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    setup_tracing(&opt)?;
    let config = opt.config();
    let input = cnf::open_input(opt.input.as_deref())?;
    let instance = cnf::Instance::read(input).with_context(|| {
        format!(
            "reading formula from {}",
            opt.input
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "standard input".to_owned())
        )
    })?;
    info!(
        vars = instance.formula.var_count(),
        clauses = instance.formula.len(),
        independent = instance.independent.len(),
        "parsed input formula"
    );
    let deadline = Deadline::new(config.total_timeout);
    match opt.mode {
        Mode::Count => {
            let report =
                driver::count_models(&config, &instance, VarisatSolver::from_formula, &deadline)?;
            if report.count.is_unsat() && !report.timed_out {
                println!("The input formula is unsatisfiable.");
            } else {
                println!("{}", report.count);
            }
            println!(
                "Total time: {:.2} s{}",
                report.elapsed.as_secs_f64(),
                if report.timed_out { " (TIMED OUT)" } else { "" }
            );
            if let Some(writer) = &opt.json {
                writer.write(&CountResult::from(&report))?;
            }
        }
        Mode::Sample => {
            let report =
                driver::uni_solve(&config, &instance, VarisatSolver::from_formula, &deadline)?;
            if report.unsat {
                println!("The input formula is unsatisfiable.");
            } else {
                for (projection, count) in report.solutions.iter() {
                    println!("{} : {}", projection, count);
                }
            }
            println!(
                "Total time: {:.2} s{}",
                report.elapsed.as_secs_f64(),
                if report.timed_out { " (TIMED OUT)" } else { "" }
            );
            println!("Samples generated: {}", report.sample_count);
            if let Some(writer) = &opt.json {
                writer.write(&SampleResult::from(&report))?;
            }
        }
    }
    Ok(())
}
