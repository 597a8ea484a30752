//! Insertion: search, robust prune, bidirectional linking.
//!
//! A new point is placed by running the greedy search with the point as
//! the query, α-pruning the visited-and-frontier set down to at most `R`
//! diverse neighbors, persisting the new block, and then adding the
//! reverse edges. A neighbor whose edge list would overflow `R` is
//! re-pruned rather than truncated, so long-range edges survive.
//!
//! Write ordering: the new block is appended before any neighbor block
//! or the header is touched, so a failed insert never shrinks the
//! reachability of previously inserted nodes. A reverse-edge write that
//! fails with an I/O error is reported, not fatal: the new node stays
//! searchable through its own out-edges.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::{Neighbor, NeighborList, Node};
use crate::disk_io::IndexFile;
use crate::error::{AnnexError, Result};
use crate::search::{greedy_search, Scored};
use crate::vector::{cmp_distance, cosine, Vector};

/// Graph construction parameters.
///
/// | Parameter     | Typical | Effect                                    |
/// |---------------|---------|-------------------------------------------|
/// | `max_degree`  | 16-64   | Out-degree cap R. Higher = better recall, bigger blocks touched per hop |
/// | `search_list` | 50-200  | Candidate list cap L. Higher = better placement, more I/O per insert |
/// | `alpha`       | 1.2-1.4 | Pruning coefficient. Higher admits more diverse, longer edges |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Degree cap `R`: maximum out-degree of any node.
    pub max_degree: usize,
    /// Search list cap `L`: candidate frontier bound for search and
    /// insertion.
    pub search_list: usize,
    /// Pruning coefficient `α >= 1`.
    pub alpha: f64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            max_degree: 32,
            search_list: 100,
            alpha: 1.2,
        }
    }
}

impl IndexParams {
    /// Reject parameters the graph cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.max_degree == 0 {
            return Err(AnnexError::InvalidParameter(
                "max_degree must be at least 1".to_string(),
            ));
        }
        if self.search_list == 0 {
            return Err(AnnexError::InvalidParameter(
                "search_list must be at least 1".to_string(),
            ));
        }
        if !(self.alpha >= 1.0) {
            return Err(AnnexError::InvalidParameter(format!(
                "alpha must be >= 1, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Result of one insert.
#[derive(Debug)]
pub struct InsertOutcome {
    /// Block offset of the new node.
    pub offset: u64,
    /// Ids of neighbors whose reverse edge could not be written. The
    /// index stays consistent and searchable; recall around those
    /// neighborhoods may degrade.
    pub failed_backlinks: Vec<u64>,
}

impl InsertOutcome {
    /// Per-neighbor reports for the host's warning channel. The insert
    /// itself still counts as successful.
    pub fn backlink_errors(&self) -> Vec<AnnexError> {
        self.failed_backlinks
            .iter()
            .map(|&id| AnnexError::PartialBacklink { id })
            .collect()
    }
}

/// A candidate entering robust pruning: distance to the pruning target,
/// plus everything needed to materialize the edge.
struct PruneCandidate {
    dist: f64,
    id: u64,
    offset: u64,
    vec: Vector,
}

/// Insert `(id, vec)` into the graph.
pub(crate) fn insert(
    file: &mut IndexFile,
    params: &IndexParams,
    id: u64,
    vec: Vector,
) -> Result<InsertOutcome> {
    if vec.dims() != file.layout().dims() {
        return Err(AnnexError::DimensionMismatch {
            left: vec.dims(),
            right: file.layout().dims(),
        });
    }

    // First point: it becomes the entry node, with no edges yet.
    if file.entry_offset() == 0 {
        let node = Node {
            id,
            vec,
            neighbors: NeighborList::new(),
        };
        let offset = file.append_node(&node)?;
        file.set_entry_offset(offset)?;
        debug!(id, offset, "inserted entry node");
        return Ok(InsertOutcome {
            offset,
            failed_backlinks: Vec::new(),
        });
    }

    let degree_cap = params.max_degree.min(file.layout().max_neighbors());

    let pool = greedy_search(file, &vec, params.search_list)?;
    let candidates: Vec<PruneCandidate> = pool
        .into_candidates()
        .into_iter()
        .filter(|s| s.node.id != id)
        .map(|s| {
            let Scored { dist, offset, node } = s;
            PruneCandidate {
                dist,
                id: node.id,
                offset,
                vec: node.vec,
            }
        })
        .collect();
    let neighbors = robust_prune(candidates, params.alpha, degree_cap);

    let node = Node {
        id,
        vec,
        neighbors,
    };
    let offset = file.append_node(&node)?;

    let mut failed_backlinks = Vec::new();
    for edge in &node.neighbors {
        match backlink(file, edge, id, offset, &node.vec, params.alpha, degree_cap) {
            Ok(()) => {}
            Err(AnnexError::IoError(err)) => {
                warn!(neighbor = edge.id, error = %err, "backlink write failed");
                failed_backlinks.push(edge.id);
            }
            Err(err) => return Err(err),
        }
    }

    debug!(
        id,
        offset,
        degree = node.neighbors.len(),
        failed = failed_backlinks.len(),
        "inserted node"
    );
    Ok(InsertOutcome {
        offset,
        failed_backlinks,
    })
}

/// Robust (α-) prune: admit candidates in ascending distance order,
/// skipping any candidate that some already-selected neighbor covers,
/// until `cap` edges are chosen.
///
/// A candidate `x` survives only if `α · d(x, y) > d(target, x)` for
/// every selected `y`; larger α keeps more diverse, longer edges.
fn robust_prune(mut candidates: Vec<PruneCandidate>, alpha: f64, cap: usize) -> NeighborList {
    candidates.sort_by(|a, b| cmp_distance(a.dist, b.dist).then_with(|| a.id.cmp(&b.id)));
    candidates.dedup_by_key(|c| c.id);

    let mut selected = NeighborList::new();
    for cand in candidates {
        if selected.len() == cap {
            break;
        }
        let covered = selected.iter().any(|y: &Neighbor| {
            !(alpha * cosine(cand.vec.as_slice(), y.vec.as_slice()) > cand.dist)
        });
        if covered {
            continue;
        }
        selected.push(Neighbor {
            id: cand.id,
            offset: cand.offset,
            vec: cand.vec,
        });
    }
    selected
}

/// Add the reverse edge `y -> new` to `y`'s block, re-pruning if the
/// edge list overflows the degree cap.
fn backlink(
    file: &mut IndexFile,
    y: &Neighbor,
    new_id: u64,
    new_offset: u64,
    new_vec: &Vector,
    alpha: f64,
    degree_cap: usize,
) -> Result<()> {
    let mut node = file.read_node(y.offset)?;
    if node.id != y.id {
        return Err(AnnexError::Corrupt(format!(
            "block {} holds node {}, edge expected {}",
            y.offset, node.id, y.id
        )));
    }
    if node.neighbors.iter().any(|n| n.id == new_id) {
        return Ok(());
    }

    node.neighbors.push(Neighbor {
        id: new_id,
        offset: new_offset,
        vec: new_vec.clone(),
    });
    if node.neighbors.len() > degree_cap {
        let taken: NeighborList = std::mem::take(&mut node.neighbors);
        let candidates = taken
            .into_iter()
            .map(|n| PruneCandidate {
                dist: cosine(node.vec.as_slice(), n.vec.as_slice()),
                id: n.id,
                offset: n.offset,
                vec: n.vec,
            })
            .collect();
        node.neighbors = robust_prune(candidates, alpha, degree_cap);
    }
    file.write_node(y.offset, &node)
}
