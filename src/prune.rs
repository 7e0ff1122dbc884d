//! The greedy verification loop: seed a traced-file set with one smoke-test
//! run, prune everything not traced and not ignored in one shot, and (if
//! that fails) fall back to a bounded breadth-first descent into the
//! subtree that broke.

use std::collections::{BTreeSet, VecDeque};

use anyhow::Result;

use crate::error::PruneError;
use crate::ignore::IgnoreSet;
use crate::oracle::Oracle;
use crate::view::View;

/// The ordered list of candidate paths the loop has proven safe to delete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneLog {
    pub accepted: Vec<String>,
}

/// Run the full prune loop against a freshly mounted view.
///
/// `max_depth` bounds the BFS fallback (depth is the number of `/` in a
/// candidate path); it has no effect on the one-shot pass, which always
/// covers every top-level entry.
pub fn run(view: &mut View, oracle: &Oracle, ignores: &IgnoreSet, max_depth: u32) -> Result<PruneLog> {
    view.purge_caches()?;

    tracing::info!("tracing one smoke-test run to seed the used-file set");
    let (verdict, traced) = oracle.trace_files(view)?;
    if !verdict.is_pass() {
        oracle.dump();
        return Err(PruneError::InitialSmokeTestFailed.into());
    }
    tracing::info!(traced_count = traced.len(), "seed trace complete");

    let mut pruned = Vec::new();
    let mut all_files: Vec<String> = view.contents("")?;
    all_files.sort();

    for f in &all_files {
        if traced.contains(f) {
            continue;
        }
        if ignores.is_ignored(f, false) {
            continue;
        }
        view.prune(f)?;
        tracing::debug!(path = %f, "pruned (one-shot)");
        pruned.push(f.clone());
    }

    view.purge_caches()?;
    tracing::info!(count = pruned.len(), "re-verifying after one-shot prune");
    let verdict = oracle.run(view)?;
    if verdict.is_pass() {
        return Ok(PruneLog { accepted: pruned });
    }

    tracing::warn!("post-prune smoke test failed; falling back to bounded BFS");
    let bfs_accepted = bfs_fallback(view, oracle, ignores, &traced, pruned, max_depth)?;
    Ok(PruneLog {
        accepted: bfs_accepted,
    })
}

fn depth_of(path: &str) -> u32 {
    path.matches('/').count() as u32
}

/// Bounded breadth-first descent. The fringe starts at every top-level
/// entry under the package root (unpruned first, since the one-shot pass
/// above must be undone). For each fringe entry, try pruning it as a whole
/// subtree; if that still passes, keep it and move on; otherwise undo it
/// and expand its immediate children onto the fringe, stopping expansion
/// once a fringe element's depth exceeds `max_depth`.
fn bfs_fallback(
    view: &mut View,
    oracle: &Oracle,
    ignores: &IgnoreSet,
    traced: &BTreeSet<String>,
    one_shot_pruned: Vec<String>,
    max_depth: u32,
) -> Result<Vec<String>> {
    // Roll back the one-shot attempt entirely; BFS re-derives its own
    // accepted set from scratch so the view returns to the post-seed state.
    view.unprune_all(&one_shot_pruned)?;

    view.purge_caches()?;
    let verdict = oracle.run(view)?;
    anyhow::ensure!(
        verdict.is_pass(),
        "view did not return to a passing state after rolling back the one-shot prune"
    );

    let mut fringe: VecDeque<(String, bool)> = view
        .children("")?
        .into_iter()
        .filter(|(p, is_dir)| !traced.contains(p) && !ignores.is_ignored(p, *is_dir))
        .collect();

    let mut accepted = Vec::new();

    while let Some((candidate, is_dir)) = fringe.pop_front() {
        // Invariant check: the current view (pre-attempt) must still pass.
        // Catches order-dependent failures from a prior accepted prune
        // before we attribute a new failure to this candidate.
        view.purge_caches()?;
        let pre_check = oracle.run(view)?;
        if !pre_check.is_pass() {
            oracle.dump();
            return Err(PruneError::PostPruneSmokeTestFailed.into());
        }

        view.prune(&candidate)?;
        view.purge_caches()?;
        let verdict = oracle.run(view)?;

        if verdict.is_pass() {
            tracing::info!(path = %candidate, "accepted (bfs)");
            accepted.push(candidate);
            continue;
        }

        tracing::debug!(path = %candidate, "rejected (bfs), rolling back");
        view.unprune(&candidate)?;

        if !is_dir {
            // A single file failed; there is nothing to descend into.
            continue;
        }
        if depth_of(&candidate) >= max_depth {
            continue;
        }

        let mut children = view.children(&candidate)?;
        children.sort();
        for (child, child_is_dir) in children {
            if traced.contains(&child) || ignores.is_ignored(&child, child_is_dir) {
                continue;
            }
            fringe.push_back((child, child_is_dir));
        }
    }

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_of_counts_separators() {
        assert_eq!(depth_of("a"), 0);
        assert_eq!(depth_of("a/b"), 1);
        assert_eq!(depth_of("a/b/c"), 2);
    }

    #[test]
    fn prune_log_default_is_empty() {
        assert!(PruneLog::default().accepted.is_empty());
    }
}
