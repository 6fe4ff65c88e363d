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

//! Seeded deterministic randomness for hash construction and sampling

use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The driver-owned pseudo-random generator.
///
/// Deterministic given its seed, so a logged seed replays a run exactly.
pub struct RandomSource {
    rng: ChaCha8Rng,
    seed: u64,
}

impl RandomSource {
    /// Seeds from operating-system entropy (two 32-bit words mixed).
    pub fn from_entropy() -> RandomSource {
        let hi = OsRng.next_u32() as u64;
        let lo = OsRng.next_u32() as u64;
        RandomSource::from_seed(hi << 32 | lo)
    }

    /// Seeds deterministically.
    pub fn from_seed(seed: u64) -> RandomSource {
        RandomSource {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A bit-string of length `n`, each bit independent uniform.
    pub fn bits(&mut self, n: usize) -> Vec<bool> {
        (0..n).map(|_| self.rng.gen()).collect()
    }

    /// Uniform integer in `[0, max]`.
    pub fn int_in(&mut self, max: u32) -> u32 {
        self.rng.gen_range(0..=max)
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
