//! Stratified sampling across topic tags.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::types::Document;

/// Draw `n` documents so every topic is represented roughly in proportion
/// to its share of `documents`.
///
/// Each stratum gets `round(|stratum| / |all| × n)` slots. When `n` is at
/// least the number of strata, every stratum gets at least one slot; if
/// rounding then overshoots `n`, slots are taken back from the largest
/// allocations first. Any shortfall is filled from the documents not yet
/// chosen. Returns exactly `min(n, |documents|)` documents, in input order.
///
/// Topic tags are grouped case-insensitively, ignoring surrounding whitespace.
pub fn stratified_sample<R: Rng + ?Sized>(
    documents: Vec<Document>,
    n: usize,
    rng: &mut R,
) -> Vec<Document> {
    if documents.len() <= n {
        return documents;
    }
    if n == 0 {
        return Vec::new();
    }

    let strata = group_by_topic(&documents);
    let allocation = allocate(&strata, documents.len(), n);

    let mut chosen = vec![false; documents.len()];
    let mut taken = 0;
    for (members, slots) in strata.iter().zip(&allocation) {
        for &idx in members.choose_multiple(rng, *slots) {
            chosen[idx] = true;
            taken += 1;
        }
    }

    if taken < n {
        let remaining: Vec<usize> = (0..documents.len()).filter(|&i| !chosen[i]).collect();
        for &idx in remaining.choose_multiple(rng, n - taken) {
            chosen[idx] = true;
        }
    }

    documents
        .into_iter()
        .zip(chosen)
        .filter_map(|(doc, keep)| keep.then_some(doc))
        .collect()
}

/// Member indices per stratum, strata in order of first appearance.
fn group_by_topic(documents: &[Document]) -> Vec<Vec<usize>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut strata: Vec<Vec<usize>> = Vec::new();
    for (idx, doc) in documents.iter().enumerate() {
        let key = doc.topic.trim().to_lowercase();
        let slot = *positions.entry(key).or_insert_with(|| {
            strata.push(Vec::new());
            strata.len() - 1
        });
        strata[slot].push(idx);
    }
    strata
}

fn allocate(strata: &[Vec<usize>], total: usize, n: usize) -> Vec<usize> {
    let guarantee_one = n >= strata.len();
    let floor = usize::from(guarantee_one);

    let mut allocation: Vec<usize> = strata
        .iter()
        .map(|members| {
            let share = (members.len() as f64 / total as f64 * n as f64).round() as usize;
            share.max(floor).min(members.len())
        })
        .collect();

    let mut sum: usize = allocation.iter().sum();
    while sum > n {
        let Some(largest) = allocation
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > floor)
            .max_by_key(|(i, a)| (**a, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
        else {
            break;
        };
        allocation[largest] -= 1;
        sum -= 1;
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn docs(spec: &[(&str, usize)]) -> Vec<Document> {
        spec.iter()
            .flat_map(|(topic, count)| {
                (0..*count).map(move |i| Document::new(format!("{topic} q{i}"), *topic))
            })
            .collect()
    }

    fn count(sample: &[Document], topic: &str) -> usize {
        sample.iter().filter(|d| d.topic == topic).count()
    }

    #[test]
    fn small_pool_is_returned_unchanged() {
        let pool = docs(&[("A", 2), ("B", 1)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(stratified_sample(pool.clone(), 5, &mut rng), pool);
    }

    #[test]
    fn allocation_is_proportional() {
        let pool = docs(&[("A", 60), ("B", 30), ("C", 10)]);
        let mut rng = StdRng::seed_from_u64(7);
        let sample = stratified_sample(pool, 10, &mut rng);
        assert_eq!(sample.len(), 10);
        assert_eq!(count(&sample, "A"), 6);
        assert_eq!(count(&sample, "B"), 3);
        assert_eq!(count(&sample, "C"), 1);
    }

    #[test]
    fn minority_stratum_gets_a_slot() {
        // C's proportional share rounds to zero.
        let pool = docs(&[("A", 90), ("B", 8), ("C", 2)]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = stratified_sample(pool.clone(), 5, &mut rng);
            assert_eq!(sample.len(), 5);
            assert!(count(&sample, "C") >= 1);
            assert!(count(&sample, "B") >= 1);
        }
    }

    #[test]
    fn rounding_overshoot_is_trimmed() {
        // Two equal halves of n = 3: round(1.5) = 2 each, 4 > 3.
        let pool = docs(&[("A", 3), ("B", 3)]);
        let mut rng = StdRng::seed_from_u64(3);
        let sample = stratified_sample(pool, 3, &mut rng);
        assert_eq!(sample.len(), 3);
        assert_eq!(count(&sample, "A"), 1);
        assert_eq!(count(&sample, "B"), 2);
    }

    #[test]
    fn topic_keys_are_canonicalized() {
        let mut pool = docs(&[("Polity", 5)]);
        pool.extend(docs(&[(" polity ", 5)]));
        let strata = group_by_topic(&pool);
        assert_eq!(strata.len(), 1);
    }

    #[test]
    fn more_strata_than_slots_still_exact() {
        let pool = docs(&[("A", 2), ("B", 2), ("C", 2), ("D", 2), ("E", 2)]);
        let mut rng = StdRng::seed_from_u64(11);
        let sample = stratified_sample(pool, 3, &mut rng);
        assert_eq!(sample.len(), 3);
    }
}
