//! Round and match scoring
//!
//! A vote scores one point iff the guess names a human seat. With more than
//! one human in the roster, naming any of them counts; a voter is never
//! required to find every human.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{Identity, Round};

/// Score one round's votes against the set of human identities.
///
/// Every voter gets an entry, so a completed round carries a score (possibly
/// zero) for each seat that voted. An automated seat voting for itself names
/// a non-human and scores zero.
pub fn score_round(
    votes: &BTreeMap<Identity, Identity>,
    humans: &BTreeSet<Identity>,
) -> BTreeMap<Identity, u32> {
    votes
        .iter()
        .map(|(voter, guess)| (*voter, u32::from(humans.contains(guess))))
        .collect()
}

/// Sum per-round scores into per-identity totals.
///
/// Every identity gets an entry even if it never scored; only completed
/// rounds carry scores, so in-play rounds contribute nothing.
pub fn final_scores(rounds: &[Round], identities: &[Identity]) -> BTreeMap<Identity, u32> {
    let mut totals: BTreeMap<Identity, u32> =
        identities.iter().map(|id| (*id, 0)).collect();
    for round in rounds {
        for (identity, score) in &round.scores {
            *totals.entry(*identity).or_insert(0) += score;
        }
    }
    totals
}
