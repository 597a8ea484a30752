//! Greedy best-first search over the on-disk graph.
//!
//! Vamana-style beam search: a bounded frontier of unvisited candidates
//! (capacity `L`, farthest evicted first) plus an archive of every
//! visited node. Expanding a candidate costs no extra reads for scoring
//! (the neighbor vectors sit inline in its block); a neighbor's own block
//! is read once, when it is admitted to the frontier.
//!
//! Ranking is ascending cosine distance with ties broken by lower id;
//! NaN distances (zero-norm vectors) order after every finite value.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::block::Node;
use crate::disk_io::IndexFile;
use crate::error::{AnnexError, Result};
use crate::vector::{cmp_distance, Vector};

/// A loaded node with its block offset and distance to the query.
pub(crate) struct Scored {
    pub dist: f64,
    pub offset: u64,
    pub node: Node,
}

fn rank(a: &Scored, b: &Scored) -> Ordering {
    cmp_distance(a.dist, b.dist).then_with(|| a.node.id.cmp(&b.node.id))
}

/// Candidate frontier and visited archive of one search.
pub(crate) struct SearchPool {
    cap: usize,
    /// Unvisited candidates, ascending by `(distance, id)`.
    open: Vec<Scored>,
    /// Visited nodes, in visit order.
    closed: Vec<Scored>,
    /// Ids currently in `open` or `closed`.
    member: HashSet<u64>,
}

impl SearchPool {
    fn new(cap: usize) -> SearchPool {
        SearchPool {
            cap,
            open: Vec::with_capacity(cap + 1),
            closed: Vec::with_capacity(cap * 2),
            member: HashSet::with_capacity(cap * 2),
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.member.contains(&id)
    }

    /// Insert a candidate, evicting the farthest if the frontier
    /// overflows `L`. The new candidate itself may be the one evicted.
    fn admit(&mut self, scored: Scored) {
        if !self.member.insert(scored.node.id) {
            return;
        }
        let pos = self
            .open
            .binary_search_by(|probe| rank(probe, &scored))
            .unwrap_or_else(|pos| pos);
        self.open.insert(pos, scored);
        if self.open.len() > self.cap {
            if let Some(evicted) = self.open.pop() {
                self.member.remove(&evicted.node.id);
            }
        }
    }

    /// Remove the closest unvisited candidate. Its id stays a member, so
    /// it cannot be re-admitted while it is being expanded or after it
    /// lands in the archive.
    fn pop_nearest(&mut self) -> Option<Scored> {
        if self.open.is_empty() {
            return None;
        }
        Some(self.open.remove(0))
    }

    fn archive(&mut self, scored: Scored) {
        self.closed.push(scored);
    }

    pub(crate) fn visited_count(&self) -> usize {
        self.closed.len()
    }

    /// The union of visited and frontier nodes, best first.
    pub(crate) fn into_candidates(self) -> Vec<Scored> {
        let mut all = self.closed;
        all.extend(self.open);
        all.sort_by(rank);
        all
    }

    /// The `k` best results over visited and frontier nodes.
    pub(crate) fn into_results(self, k: usize) -> Vec<(u64, f64)> {
        self.into_candidates()
            .into_iter()
            .take(k)
            .map(|s| (s.node.id, s.dist))
            .collect()
    }
}

/// Run the greedy search from the entry node. Returns the full pool so
/// callers can either extract top-k results or feed the candidate set
/// into robust pruning.
pub(crate) fn greedy_search(
    file: &mut IndexFile,
    query: &Vector,
    list_size: usize,
) -> Result<SearchPool> {
    let mut pool = SearchPool::new(list_size.max(1));
    let entry = file.entry_offset();
    if entry == 0 {
        return Ok(pool);
    }

    let node = file.read_node(entry)?;
    let dist = query.cosine_distance(&node.vec)?;
    pool.admit(Scored {
        dist,
        offset: entry,
        node,
    });

    while let Some(current) = pool.pop_nearest() {
        for m in &current.node.neighbors {
            if pool.contains(m.id) {
                continue;
            }
            let node = file.read_node(m.offset)?;
            if node.id != m.id {
                return Err(AnnexError::Corrupt(format!(
                    "block {} holds node {}, edge expected {}",
                    m.offset, node.id, m.id
                )));
            }
            let dist = query.cosine_distance(&node.vec)?;
            pool.admit(Scored {
                dist,
                offset: m.offset,
                node,
            });
        }
        pool.archive(current);
    }

    debug!(
        visited = pool.visited_count(),
        list_size, "greedy search finished"
    );
    Ok(pool)
}

/// k-nearest-neighbor query: rowids with distances, best first.
pub(crate) fn knn(
    file: &mut IndexFile,
    query: &Vector,
    k: usize,
    list_size: usize,
) -> Result<Vec<(u64, f64)>> {
    let pool = greedy_search(file, query, list_size.max(k))?;
    Ok(pool.into_results(k))
}
