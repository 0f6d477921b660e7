//! Fitting a document selection into the context budget.

use crate::bridge_config::TruncationStrategy;
use crate::docs::Document;

/// Appended to every cut document; counted against the budget.
pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

/// A document is only cut (rather than dropped) when at least this many
/// characters of budget remain.
pub const MIN_CUT_CHARS: usize = 256;

/// A selected document and whether the query type depends on it.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub doc: &'a Document,
    pub critical: bool,
}

/// Outcome for one candidate, in selection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fitted {
    Whole(String),
    Cut(String),
    Dropped,
}

/// Fit `candidates` into `budget` characters. The result has one entry per
/// candidate, in the same order.
pub fn fit(candidates: &[Candidate<'_>], budget: usize, strategy: TruncationStrategy) -> Vec<Fitted> {
    let total: usize = candidates.iter().map(|c| c.doc.char_len()).sum();
    if total <= budget {
        return candidates
            .iter()
            .map(|c| Fitted::Whole(c.doc.content.clone()))
            .collect();
    }

    match strategy {
        TruncationStrategy::RecentFirst => {
            let mut order: Vec<usize> = (0..candidates.len()).collect();
            order.sort_by(|&a, &b| {
                let (a, b) = (&candidates[a], &candidates[b]);
                b.critical
                    .cmp(&a.critical)
                    .then_with(|| b.doc.modified.cmp(&a.doc.modified))
                    .then_with(|| a.doc.name.cmp(&b.doc.name))
            });
            fill_in_order(candidates, &order, budget)
        }
        TruncationStrategy::Priority => {
            let order: Vec<usize> = (0..candidates.len()).collect();
            fill_in_order(candidates, &order, budget)
        }
        TruncationStrategy::Proportional => {
            let share = budget / candidates.len().max(1);
            candidates
                .iter()
                .map(|c| {
                    if c.doc.char_len() <= share {
                        Fitted::Whole(c.doc.content.clone())
                    } else if share > TRUNCATION_MARKER.chars().count() {
                        Fitted::Cut(cut(&c.doc.content, share))
                    } else {
                        Fitted::Dropped
                    }
                })
                .collect()
        }
    }
}

/// Fill the budget visiting candidates in `order`. The first document that
/// does not fit is cut when enough budget remains; everything after it is
/// dropped.
fn fill_in_order(candidates: &[Candidate<'_>], order: &[usize], budget: usize) -> Vec<Fitted> {
    let mut out = vec![Fitted::Dropped; candidates.len()];
    let mut remaining = budget;

    for &idx in order {
        let doc = candidates[idx].doc;
        let len = doc.char_len();
        if len <= remaining {
            out[idx] = Fitted::Whole(doc.content.clone());
            remaining -= len;
            continue;
        }
        if remaining >= MIN_CUT_CHARS {
            out[idx] = Fitted::Cut(cut(&doc.content, remaining));
        }
        break;
    }

    out
}

/// First characters of `content` plus the marker, `limit` chars in total.
fn cut(content: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
