//! TF-IDF similarity retrieval over a ledger snapshot.
//!
//! The corpus is rebuilt on every query. Vectors live in ordered maps so
//! floating-point sums run in the same order on every call.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::constants::IDF_FLOOR;
use crate::thread::Thread;
use crate::tokenizer::title_terms;

type TermVector = BTreeMap<String, f64>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Match {
    pub thread: Thread,
    /// Rounded cosine similarity, 0..=100.
    pub score: u8,
    pub similarity: f64,
    /// Up to three shared terms, heaviest first.
    pub common_terms: Vec<String>,
}

/// Stateless similarity engine.
pub struct Mnemosyne;

impl Mnemosyne {
    /// Namespaced terms for one thread. Unknown fields contribute nothing.
    pub fn terms(thread: &Thread) -> Vec<String> {
        let mut terms = Vec::new();
        if thread.intention.is_known() {
            terms.push(format!("intention:{}", thread.intention));
        }
        if thread.time_of_day.is_known() {
            terms.push(format!("time:{}", thread.time_of_day));
        }
        if thread.region.is_known() {
            terms.push(format!("region:{}", thread.region));
        }
        terms.extend(
            title_terms(thread.title_str())
                .into_iter()
                .map(|t| format!("title:{t}")),
        );
        terms
    }

    /// `ln(N / df)`, floored at `IDF_FLOOR`.
    pub fn idf(total_docs: usize, docs_with_term: usize) -> f64 {
        if total_docs == 0 || docs_with_term == 0 {
            return IDF_FLOOR;
        }
        (total_docs as f64 / docs_with_term as f64)
            .ln()
            .max(IDF_FLOOR)
    }

    /// Rank every thread in `snapshot` against `target`.
    ///
    /// Sorted by score descending; equal scores keep ledger order. When the
    /// target is not part of the snapshot it still joins the corpus for
    /// document frequencies.
    pub fn query(target: &Thread, snapshot: &[Thread], exclude_self: bool) -> Vec<Match> {
        let target_in_corpus = snapshot.iter().any(|t| t.id == target.id);
        let doc_terms: Vec<Vec<String>> = snapshot.iter().map(Self::terms).collect();
        let target_terms = Self::terms(target);

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for terms in &doc_terms {
            count_document(&mut df, terms);
        }
        let mut total_docs = snapshot.len();
        if !target_in_corpus {
            count_document(&mut df, &target_terms);
            total_docs += 1;
        }

        let vectorize = |terms: &[String]| -> TermVector {
            let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
            for term in terms {
                *tf.entry(term.as_str()).or_default() += 1;
            }
            tf.into_iter()
                .map(|(term, count)| {
                    let idf = Self::idf(total_docs, df.get(term).copied().unwrap_or(0));
                    (term.to_string(), count as f64 * idf)
                })
                .collect()
        };

        let target_vec = vectorize(&target_terms);
        let mut matches: Vec<Match> = snapshot
            .iter()
            .zip(&doc_terms)
            .filter(|(thread, _)| !(exclude_self && thread.id == target.id))
            .map(|(thread, terms)| {
                let vec = vectorize(terms);
                let similarity = cosine(&target_vec, &vec);
                Match {
                    thread: thread.clone(),
                    score: (similarity * 100.0).round() as u8,
                    similarity,
                    common_terms: common_terms(&target_vec, &vec),
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches
    }

    /// Resolve `id` in the snapshot and rank the rest. Unknown ids yield an
    /// empty ranking.
    pub fn query_by_id(id: &str, snapshot: &[Thread]) -> Vec<Match> {
        snapshot
            .iter()
            .find(|t| t.id == id)
            .map(|target| Self::query(target, snapshot, true))
            .unwrap_or_default()
    }
}

/// Bump document frequency once per distinct term.
fn count_document<'a>(df: &mut BTreeMap<&'a str, usize>, terms: &'a [String]) {
    let unique: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
    for term in unique {
        *df.entry(term).or_default() += 1;
    }
}

fn magnitude(v: &TermVector) -> f64 {
    v.values().map(|x| x * x).sum::<f64>().sqrt()
}

fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let (mag_a, mag_b) = (magnitude(a), magnitude(b));
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

fn common_terms(a: &TermVector, b: &TermVector) -> Vec<String> {
    let mut shared: Vec<(&String, f64)> = a
        .iter()
        .filter(|(term, _)| b.contains_key(*term))
        .map(|(term, w)| (term, *w))
        .collect();
    shared.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
    shared.into_iter().take(3).map(|(t, _)| t.clone()).collect()
}
