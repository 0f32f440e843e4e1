//! Trial order generation.
//!
//! A block is a randomised permutation without replacement: congruent
//! trials cycle through the palette, incongruent trials cycle through every
//! ordered pair of distinct colours, the whole list is shuffled with a seeded
//! RNG, and a repair pass moves exact repeats apart.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use stroop_core::{InkColor, PALETTE, Trial};

type Pair = (InkColor, InkColor);

/// Lazy, finite, non-restartable source of trials for one block
#[derive(Debug, Clone)]
pub struct TrialSequencer {
    pending: VecDeque<Pair>,
    issued: usize,
    total: usize,
}

impl TrialSequencer {
    pub fn new(total: usize, congruent_ratio: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pairs = build_pairs(total, congruent_ratio);
        pairs.shuffle(&mut rng);
        spread_repeats(&mut pairs);
        Self {
            pending: pairs.into(),
            issued: 0,
            total,
        }
    }

    /// Next trial stamped with its onset time, or `None` once the block is used up
    pub fn next_trial(&mut self, presented_at: u64) -> Option<Trial> {
        let (word, ink) = self.pending.pop_front()?;
        let trial = Trial::new(self.issued, word, ink, presented_at);
        self.issued += 1;
        Some(trial)
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Number of congruent trials in a block of `total`
pub fn congruent_count(total: usize, congruent_ratio: f64) -> usize {
    let ratio = congruent_ratio.clamp(0.0, 1.0);
    ((total as f64 * ratio).round() as usize).min(total)
}

fn incongruent_pairs() -> Vec<Pair> {
    PALETTE
        .iter()
        .flat_map(|&word| {
            PALETTE
                .iter()
                .filter(move |&&ink| ink != word)
                .map(move |&ink| (word, ink))
        })
        .collect()
}

fn build_pairs(total: usize, congruent_ratio: f64) -> Vec<Pair> {
    let n_congruent = congruent_count(total, congruent_ratio);
    let mismatched = incongruent_pairs();

    let mut pairs = Vec::with_capacity(total);
    pairs.extend((0..n_congruent).map(|i| {
        let color = PALETTE[i % PALETTE.len()];
        (color, color)
    }));
    pairs.extend((0..total - n_congruent).map(|i| mismatched[i % mismatched.len()]));
    pairs
}

/// Swaps away consecutive identical pairs. After position `i` is handled the
/// prefix `0..=i` has no repeats; a repeat survives only when no swap partner
/// exists anywhere in the block.
fn spread_repeats(pairs: &mut [Pair]) {
    for i in 1..pairs.len() {
        if pairs[i] != pairs[i - 1] {
            continue;
        }
        let candidates: Vec<usize> = (i + 1..pairs.len()).chain((0..i).rev()).collect();
        for j in candidates {
            pairs.swap(i, j);
            if clear_around(pairs, i) && clear_around(pairs, j) {
                break;
            }
            pairs.swap(i, j);
        }
    }
}

fn clear_around(pairs: &[Pair], i: usize) -> bool {
    let before = i == 0 || pairs[i - 1] != pairs[i];
    let after = i + 1 >= pairs.len() || pairs[i + 1] != pairs[i];
    before && after
}
