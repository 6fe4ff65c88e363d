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

//! Orchestration: configuration, deadline, and the sampling driver
//!
//! One invocation seeds the randomness, optionally runs the counting phase
//! to locate the start iteration, then issues sampling batches on fresh
//! solver instances until the requested budget is met or the deadline is
//! reached. Replacing the solver between batches sheds the activation
//! variables and disabled parity constraints accumulated by earlier hash
//! banks.

use crate::cnf::{CnfFormula, Instance};
use crate::counter::{approx_mc, SatCount};
use crate::model::Projection;
use crate::rng::RandomSource;
use crate::sampler::unigen2;
use crate::solver::Solver;
use crate::utils::CountingMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// All knobs of one invocation. Built once from the command line and only
/// ever passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total sample count target.
    pub samples: u32,
    /// Cell size cap of the counting phase.
    pub pivot_approxmc: u64,
    /// Cell size anchor of the sampling phase.
    pub pivot_unigen: u32,
    /// Sampling tolerance; widens the accepted cell size band.
    pub kappa: f64,
    /// Number of counting trials.
    pub t_approxmc: u32,
    /// Start iteration; 0 computes it with the counting phase.
    pub start_iteration: u32,
    /// Sample attempts per solver instance; 0 picks automatically.
    pub calls_per_solver: u32,
    /// Emit the low threshold of samples per successful attempt.
    pub multisample: bool,
    /// Global wall-clock budget in seconds.
    pub total_timeout: f64,
    /// Fixed seed; fresh entropy when absent.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            samples: 1,
            pivot_approxmc: 60,
            pivot_unigen: 27,
            kappa: 0.638,
            t_approxmc: 1,
            start_iteration: 0,
            calls_per_solver: 0,
            multisample: false,
            total_timeout: 72_000.,
            seed: None,
        }
    }
}

impl Config {
    /// The accepted cell size band `(lo, hi]` of the sampling phase.
    pub fn unigen_band(&self) -> (u64, u64) {
        let factor = 1.41 * (1. + self.kappa);
        let hi = (factor * self.pivot_unigen as f64) as u64 + 2;
        let lo = (self.pivot_unigen as f64 / factor) as u64;
        (hi, lo)
    }

    /// Rejects configurations that cannot be solved for.
    pub fn validate(&self, independent_len: usize) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.start_iteration as usize <= independent_len,
            "start iteration {} is larger than the independent set ({} variables)",
            self.start_iteration,
            independent_len
        );
        anyhow::ensure!(self.t_approxmc >= 1, "at least one counting trial is required");
        anyhow::ensure!(self.pivot_approxmc >= 1, "the counting pivot must be positive");
        anyhow::ensure!(self.pivot_unigen >= 1, "the sampling pivot must be positive");
        anyhow::ensure!(
            self.kappa > 0. && self.kappa < 1.,
            "kappa must lie in (0, 1)"
        );
        if self.t_approxmc % 2 == 0 {
            warn!(
                trials = self.t_approxmc,
                "an even trial count blunts the median, prefer an odd one"
            );
        }
        Ok(())
    }
}

/// Loops exit this long before the wall-clock budget runs out.
const SAFETY_MARGIN: Duration = Duration::from_secs(3000);

/// Cancels the invocation from outside at the next polling point.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests a clean exit.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The global wall-clock budget, polled between solver calls.
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// A deadline expiring the safety margin before `total_timeout_s`.
    pub fn new(total_timeout_s: f64) -> Deadline {
        Deadline {
            start: Instant::now(),
            budget: Some(Duration::from_secs_f64(total_timeout_s)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A deadline that only expires through its cancel handle.
    pub fn unlimited() -> Deadline {
        Deadline {
            start: Instant::now(),
            budget: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that makes `expired` answer true from anywhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    /// True once the budget (minus the safety margin) is spent or the
    /// invocation was cancelled. In-flight solver calls are not preempted.
    pub fn expired(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.budget {
            None => false,
            Some(budget) => self.start.elapsed() + SAFETY_MARGIN > budget,
        }
    }

    /// Wall-clock time since the deadline was armed.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[cfg(test)]
    pub(crate) fn already_expired() -> Deadline {
        let deadline = Deadline::unlimited();
        deadline.cancelled.store(true, Ordering::SeqCst);
        deadline
    }
}

/// Everything a sampling invocation produced.
#[derive(Debug)]
pub struct SampleReport {
    /// Sampled projections with their multiplicities.
    pub solutions: CountingMap<Projection>,
    /// Sum of all multiplicities.
    pub sample_count: u64,
    /// Sample attempts made, failed ones included.
    pub attempts: u32,
    /// Wall-clock time spent.
    pub elapsed: Duration,
    /// True when the invocation stopped on the deadline.
    pub timed_out: bool,
    /// True when the counting phase proved the formula unsatisfiable.
    pub unsat: bool,
    /// Seed of the invocation, for replay.
    pub seed: u64,
}

impl SampleReport {
    fn empty(seed: u64, deadline: &Deadline) -> SampleReport {
        SampleReport {
            solutions: CountingMap::new(),
            sample_count: 0,
            attempts: 0,
            elapsed: deadline.elapsed(),
            timed_out: false,
            unsat: false,
            seed,
        }
    }
}

/// The start iteration implied by a counting estimate.
fn start_iteration_from(count: &SatCount, config: &Config) -> u32 {
    let q = (count.hash_count as f64
        + (count.cell_count as f64).log2()
        + 1.8_f64.log2()
        - (config.pivot_unigen as f64).log2())
    .round()
        - 2.;
    // tiny formulas push the value below zero; probing starts unhashed
    q.max(0.) as u32
}

/// Runs a full sampling invocation: optional counting phase, then sampling
/// batches on fresh solvers from `new_solver`.
pub fn uni_solve<S, F>(
    config: &Config,
    instance: &Instance,
    mut new_solver: F,
    deadline: &Deadline,
) -> anyhow::Result<SampleReport>
where
    S: Solver,
    F: FnMut(&CnfFormula) -> S,
{
    let independent = &instance.independent;
    config.validate(independent.len())?;
    let seed = config
        .seed
        .unwrap_or_else(|| RandomSource::from_entropy().seed());
    info!(seed, "sampling invocation");

    let q = if config.start_iteration > 0 {
        info!(q = config.start_iteration, "using the configured start iteration");
        config.start_iteration
    } else {
        info!("computing the start iteration from a counting estimate");
        let mut rng = RandomSource::from_seed(seed);
        let mut solver = new_solver(&instance.formula);
        let count = approx_mc(&mut solver, independent, config, &mut rng, deadline);
        if deadline.expired() {
            info!("counting phase ran out of time");
            let mut report = SampleReport::empty(seed, deadline);
            report.timed_out = true;
            return Ok(report);
        }
        if count.is_unsat() {
            info!("the input formula is unsatisfiable");
            let mut report = SampleReport::empty(seed, deadline);
            report.unsat = true;
            return Ok(report);
        }
        info!(%count, "counting phase finished");
        start_iteration_from(&count, config)
    };

    let (hi, lo) = config.unigen_band();
    let samples_per_call = if config.multisample { lo.max(1) as u32 } else { 1 };
    let calls_needed = (config.samples + samples_per_call - 1) / samples_per_call;
    let calls_per_loop = if config.calls_per_solver > 0 {
        config.calls_per_solver
    } else {
        let num_vars = instance.formula.var_count() as u32;
        (num_vars / (q * 14).max(1)).min(calls_needed).max(1)
    };
    let full_loops = calls_needed / calls_per_loop;
    let remaining = calls_needed % calls_per_loop;
    info!(
        lo,
        hi,
        q,
        samples_per_call,
        calls_per_loop,
        full_loops,
        remaining,
        "sampling plan"
    );

    // the sampling phase runs on its own engine
    let sampling_seed = match config.seed {
        Some(s) => s.wrapping_add(1),
        None => RandomSource::from_entropy().seed(),
    };
    debug!(seed = sampling_seed, "sampling phase seed");
    let mut rng = RandomSource::from_seed(sampling_seed);

    let mut report = SampleReport::empty(seed, deadline);
    let mut last_offset = 0u32;
    let mut batches: Vec<u32> = Vec::with_capacity(full_loops as usize + 1);
    if remaining > 0 {
        batches.push(remaining);
    }
    batches.extend(std::iter::repeat(calls_per_loop).take(full_loops as usize));
    for batch in batches {
        if report.timed_out {
            break;
        }
        let mut solver = new_solver(&instance.formula);
        let outcome = unigen2(
            batch,
            q,
            &mut solver,
            independent,
            config,
            &mut rng,
            &mut report.solutions,
            &mut last_offset,
            deadline,
        );
        debug!(?outcome, "batch finished");
        report.attempts += outcome.attempts;
        report.timed_out |= outcome.timed_out;
    }
    report.sample_count = report.solutions.total();
    report.elapsed = deadline.elapsed();
    Ok(report)
}

/// Result of a counting-only invocation.
#[derive(Debug)]
pub struct CountReport {
    /// The estimate; zero cell and hash count mean unsatisfiable.
    pub count: SatCount,
    /// Wall-clock time spent.
    pub elapsed: Duration,
    /// True when counting stopped on the deadline.
    pub timed_out: bool,
    /// Seed of the invocation, for replay.
    pub seed: u64,
}

/// Runs the counting phase alone.
pub fn count_models<S, F>(
    config: &Config,
    instance: &Instance,
    mut new_solver: F,
    deadline: &Deadline,
) -> anyhow::Result<CountReport>
where
    S: Solver,
    F: FnMut(&CnfFormula) -> S,
{
    let independent = &instance.independent;
    config.validate(independent.len())?;
    let seed = config
        .seed
        .unwrap_or_else(|| RandomSource::from_entropy().seed());
    info!(seed, "counting invocation");
    let mut rng = RandomSource::from_seed(seed);
    let mut solver = new_solver(&instance.formula);
    let count = approx_mc(&mut solver, independent, config, &mut rng, deadline);
    Ok(CountReport {
        count,
        elapsed: deadline.elapsed(),
        timed_out: deadline.expired(),
        seed,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::VarisatSolver;

    fn instance(dimacs: &[u8]) -> Instance {
        Instance::read(dimacs).unwrap()
    }

    fn config() -> Config {
        Config {
            seed: Some(1),
            ..Config::default()
        }
    }

    #[test]
    fn unsatisfiable_input_reports_unsat_and_no_samples() -> anyhow::Result<()> {
        let instance = instance(b"p cnf 1 2\n1 0\n-1 0\n");
        let cfg = Config {
            samples: 10,
            ..config()
        };
        let deadline = Deadline::unlimited();
        let report = uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline)?;
        assert!(report.unsat);
        assert!(!report.timed_out);
        assert_eq!(report.sample_count, 0);
        assert_eq!(report.attempts, 0);
        Ok(())
    }

    #[test]
    fn start_iteration_above_independent_set_is_a_configuration_error() {
        let instance = instance(b"p cnf 3 0\n");
        let cfg = Config {
            start_iteration: 5,
            ..config()
        };
        let deadline = Deadline::unlimited();
        assert!(uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline).is_err());
    }

    #[test]
    fn expired_deadline_wins_over_the_unsat_verdict() -> anyhow::Result<()> {
        let instance = instance(b"p cnf 1 2\n1 0\n-1 0\n");
        let cfg = Config {
            samples: 3,
            ..config()
        };
        let deadline = Deadline::already_expired();
        let report = uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline)?;
        assert!(report.timed_out);
        assert!(!report.unsat, "a timed out run must not claim unsatisfiability");
        assert_eq!(report.sample_count, 0);
        Ok(())
    }

    #[test]
    fn multisample_batches_emit_the_low_threshold_each() -> anyhow::Result<()> {
        // 16 models; band (11, 64] accepts the whole cell at zero hashes
        let instance = instance(b"p cnf 4 0\n");
        let cfg = Config {
            samples: 22,
            multisample: true,
            ..config()
        };
        let deadline = Deadline::unlimited();
        let report = uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline)?;
        assert_eq!(report.attempts, 2, "ceil(22 / 11) attempts");
        assert_eq!(report.sample_count, 22);
        Ok(())
    }

    #[test]
    fn replays_are_identical_given_a_seed() -> anyhow::Result<()> {
        let cfg = Config {
            samples: 20,
            pivot_unigen: 8,
            seed: Some(99),
            ..Config::default()
        };
        let deadline = Deadline::unlimited();
        let run = || -> anyhow::Result<SampleReport> {
            let instance = instance(b"p cnf 3 0\n");
            uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline)
        };
        let a = run()?;
        let b = run()?;
        assert_eq!(a.solutions, b.solutions);
        assert_eq!(a.sample_count, 20);
        Ok(())
    }

    #[test]
    fn samples_cover_the_model_space() -> anyhow::Result<()> {
        // 100 near-uniform draws from 8 projections hit most of them
        let instance = instance(b"p cnf 3 0\n");
        let cfg = Config {
            samples: 100,
            pivot_unigen: 8,
            seed: Some(7),
            ..Config::default()
        };
        let deadline = Deadline::unlimited();
        let report = uni_solve(&cfg, &instance, VarisatSolver::from_formula, &deadline)?;
        assert_eq!(report.sample_count, 100);
        assert!(
            report.solutions.count_non_zero() >= 6,
            "only {} of 8 projections sampled",
            report.solutions.count_non_zero()
        );
        Ok(())
    }

    #[test]
    fn counting_mode_reports_the_estimate() -> anyhow::Result<()> {
        let instance = instance(b"p cnf 3 0\n");
        let cfg = Config {
            t_approxmc: 7,
            ..config()
        };
        let deadline = Deadline::unlimited();
        let report = count_models(&cfg, &instance, VarisatSolver::from_formula, &deadline)?;
        assert_eq!(report.count.estimate(), 8u32.into());
        assert!(!report.timed_out);
        Ok(())
    }

    #[test]
    fn cancellation_expires_the_deadline() {
        let deadline = Deadline::unlimited();
        assert!(!deadline.expired());
        deadline.cancel_handle().cancel();
        assert!(deadline.expired());
    }

    #[test]
    fn short_budgets_are_already_within_the_safety_margin() {
        // budgets under the margin leave no time to solve at all
        let deadline = Deadline::new(10.);
        assert!(deadline.expired());
    }

    #[test]
    fn band_respects_the_configured_tolerance() {
        let cfg = Config {
            pivot_unigen: 27,
            kappa: 0.638,
            ..Config::default()
        };
        assert_eq!(cfg.unigen_band(), (64, 11));
    }
}
