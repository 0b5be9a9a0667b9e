//! Path computation over the physical topology.
//!
//! Links are modeled as an undirected graph weighted by distance. Candidate
//! paths beyond the shortest are produced by excluding the links of earlier
//! results, which yields deterministic, link-disjoint alternatives.

use std::collections::HashMap;
use std::collections::HashSet;

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::models::{ComputedPath, Link};

/// Compute up to `k` shortest paths between two POPs by distance.
///
/// Returns an empty vector when the endpoints are disconnected.
pub fn k_shortest_paths(links: &[Link], src: &str, dst: &str, k: usize) -> Vec<ComputedPath> {
    let mut paths = Vec::new();
    let mut excluded: HashSet<String> = HashSet::new();

    for _ in 0..k.max(1) {
        match shortest_path(links, src, dst, &excluded) {
            Some(path) => {
                excluded.extend(path.links.iter().cloned());
                paths.push(path);
            }
            None => break,
        }
    }

    paths
}

/// Shortest path by total distance, skipping `excluded` link ids.
fn shortest_path(
    links: &[Link],
    src: &str,
    dst: &str,
    excluded: &HashSet<String>,
) -> Option<ComputedPath> {
    let mut graph: UnGraph<String, (f64, String)> = UnGraph::new_undirected();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for link in links {
        if excluded.contains(&link.id) {
            continue;
        }
        let a = *nodes
            .entry(link.pop_a.as_str())
            .or_insert_with(|| graph.add_node(link.pop_a.clone()));
        let b = *nodes
            .entry(link.pop_b.as_str())
            .or_insert_with(|| graph.add_node(link.pop_b.clone()));
        graph.add_edge(a, b, (link.distance_km, link.id.clone()));
    }

    let start = *nodes.get(src)?;
    let goal = *nodes.get(dst)?;

    let (total_km, node_path) = astar(
        &graph,
        start,
        |n| n == goal,
        |e| e.weight().0,
        |_| 0.0,
    )?;

    let pops: Vec<String> = node_path.iter().map(|n| graph[*n].clone()).collect();
    let mut link_ids = Vec::with_capacity(node_path.len().saturating_sub(1));
    for pair in node_path.windows(2) {
        // Parallel links exist between pop pairs; astar walked the cheapest.
        let edge = graph
            .edges_connecting(pair[0], pair[1])
            .min_by(|a, b| {
                a.weight()
                    .0
                    .partial_cmp(&b.weight().0)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        link_ids.push(edge.weight().1.clone());
    }

    Some(ComputedPath {
        links: link_ids,
        pops,
        total_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotState;

    fn link(id: &str, a: &str, b: &str, km: f64) -> Link {
        Link {
            id: id.into(),
            pop_a: a.into(),
            pop_b: b.into(),
            distance_km: km,
            slots: vec![SlotState::Free; 8],
        }
    }

    #[test]
    fn picks_shortest_by_distance() {
        // pop1 - pop2 direct (100 km) vs via pop3 (30 + 30 km)
        let links = vec![
            link("l-direct", "pop1", "pop2", 100.0),
            link("l-13", "pop1", "pop3", 30.0),
            link("l-32", "pop3", "pop2", 30.0),
        ];

        let paths = k_shortest_paths(&links, "pop1", "pop2", 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].links, vec!["l-13", "l-32"]);
        assert_eq!(paths[0].pops, vec!["pop1", "pop3", "pop2"]);
        assert_eq!(paths[0].total_km, 60.0);
    }

    #[test]
    fn second_candidate_avoids_first_path_links() {
        let links = vec![
            link("l-direct", "pop1", "pop2", 100.0),
            link("l-13", "pop1", "pop3", 30.0),
            link("l-32", "pop3", "pop2", 30.0),
        ];

        let paths = k_shortest_paths(&links, "pop1", "pop2", 3);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].links, vec!["l-direct"]);
    }

    #[test]
    fn disconnected_pops_yield_no_path() {
        let links = vec![link("l-12", "pop1", "pop2", 10.0)];
        assert!(k_shortest_paths(&links, "pop1", "pop9", 2).is_empty());
    }
}
