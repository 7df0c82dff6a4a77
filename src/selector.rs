//! Fairness selector: rotate exposure toward campaigns the client has seen least.
//!
//! Candidates arrive already above the adaptive threshold. Groups are walked
//! in ascending view count; the first group holding any candidate yields the
//! winner, the highest score in that group (first seen wins a tie). An
//! under-exposed campaign therefore beats a better-scoring one the client
//! has already seen more often.

use std::collections::HashMap;

use uuid::Uuid;

use crate::ledger::ViewsGroup;
use crate::model::Campaign;

/// A campaign that passed scoring, with what it would be charged.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub campaign: Campaign,
    pub score: f64,
    /// Impression income for this exposure: the CPM on first exposure, 0 after.
    pub impression_income: f64,
}

/// The winning candidate and the view-count group it was taken from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    pub candidate: &'a Candidate,
    pub view_count: u64,
}

pub fn select<'a>(
    candidates: &'a HashMap<Uuid, Candidate>,
    groups: &[ViewsGroup],
) -> Option<Selection<'a>> {
    for group in groups {
        let mut best: Option<&Candidate> = None;
        for id in &group.campaign_ids {
            let Some(candidate) = candidates.get(id) else {
                continue;
            };
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        if let Some(candidate) = best {
            return Some(Selection {
                candidate,
                view_count: group.view_count,
            });
        }
    }
    None
}
