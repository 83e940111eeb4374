//! DependencyGraph: the DAG of models wired by CURRENT-timestep edges
//! (spec §4.3, §4.4). `PREVIOUS` edges are deliberately excluded from the
//! graph itself (spec §3: "a PREVIOUS edge does not count toward cycle
//! detection"); they still gate correctness (checked at validation time
//! in [`crate::runner`]) but not scheduling order within a timestep.

use crate::error::{Result, SmifError};
use crate::model::{ModelName, SosModel, TimestepOffset};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// A DAG over a [`SosModel`]'s models, edges restricted to
/// `TimestepOffset::Current` model dependencies. Scenario dependencies
/// contribute no edges: scenarios have no upstream model to order against.
pub struct DependencyGraph {
    graph: DiGraph<ModelName, ()>,
    index_of: HashMap<ModelName, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph from a [`SosModel`]. Returns
    /// [`SmifError::CircularDependency`] if the CURRENT-edge subgraph has
    /// a cycle (spec §4.3, invariant "the CURRENT-edge dependency graph
    /// must be acyclic").
    pub fn build(sos_model: &SosModel) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        for name in sos_model.models.keys() {
            index_of.insert(name.clone(), graph.add_node(name.clone()));
        }
        for dep in &sos_model.model_dependencies {
            if !matches!(dep.offset, TimestepOffset::Current) {
                continue;
            }
            let source = index_of[&dep.source_model];
            let sink = index_of[&dep.sink_model];
            graph.add_edge(source, sink, ());
        }

        let sccs = tarjan_scc(&graph);
        for scc in &sccs {
            if scc.len() > 1 {
                let mut cycle: Vec<ModelName> = scc.iter().map(|&i| graph[i].clone()).collect();
                cycle.sort();
                return Err(SmifError::CircularDependency { cycle });
            }
        }
        for node in graph.node_indices() {
            if graph.find_edge(node, node).is_some() {
                return Err(SmifError::CircularDependency {
                    cycle: vec![graph[node].clone()],
                });
            }
        }

        Ok(DependencyGraph { graph, index_of })
    }

    /// A deterministic topological order: ties between independent models
    /// break lexicographically by name, so the same `SosModel` always
    /// schedules in the same order (spec §8.2's determinism property).
    pub fn topological_order(&self) -> Vec<ModelName> {
        let mut order = toposort(&self.graph, None)
            .expect("cycles are rejected at construction time, toposort cannot fail here");

        // `toposort` gives *a* valid order, not necessarily the
        // lexicographically-least one: stabilize independent ties by
        // repeatedly picking the lexicographically smallest ready node.
        let mut remaining: std::collections::HashSet<NodeIndex> = order.iter().copied().collect();
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for &n in &order {
            in_degree.insert(
                n,
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .count(),
            );
        }
        let mut stable = Vec::with_capacity(order.len());
        while !remaining.is_empty() {
            let mut ready: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|n| in_degree[n] == 0)
                .collect();
            ready.sort_by_key(|&n| self.graph[n].clone());
            let next = ready[0];
            stable.push(next);
            remaining.remove(&next);
            for succ in self.graph.neighbors_directed(next, petgraph::Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&succ) {
                    *d -= 1;
                }
            }
        }
        order = stable;

        order.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// Deterministic topological layering: layer 0 holds every root, and
    /// layer k+1 holds every node whose CURRENT predecessors are all in
    /// layers `0..=k`. No edge ever runs between two nodes of the same
    /// layer, so a scheduler can run a whole layer in parallel and wait
    /// for it to finish before starting the next, without polling any
    /// job's predecessor status mid-flight (spec §4.5).
    pub fn layers(&self) -> Vec<Vec<ModelName>> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for node in self.graph.node_indices() {
            in_degree.insert(
                node,
                self.graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .count(),
            );
        }
        let mut remaining: std::collections::HashSet<NodeIndex> = self.graph.node_indices().collect();
        let mut layers = Vec::new();
        while !remaining.is_empty() {
            let mut ready: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|n| in_degree[n] == 0)
                .collect();
            ready.sort_by_key(|&n| self.graph[n].clone());
            for &n in &ready {
                remaining.remove(&n);
                for succ in self.graph.neighbors_directed(n, petgraph::Direction::Outgoing) {
                    if let Some(d) = in_degree.get_mut(&succ) {
                        *d -= 1;
                    }
                }
            }
            layers.push(ready.into_iter().map(|n| self.graph[n].clone()).collect());
        }
        layers
    }

    /// Models with no incoming CURRENT edge: the roots a scheduler can
    /// start executing immediately within a timestep.
    pub fn roots(&self) -> Vec<ModelName> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Immediate CURRENT-edge predecessors of `model`, used by the
    /// scheduler to decide when a job becomes ready.
    pub fn predecessors(&self, model: &ModelName) -> Vec<ModelName> {
        let Some(&idx) = self.index_of.get(model) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Immediate CURRENT-edge successors of `model`, used to mark
    /// descendants as skipped after a job fails (spec §4.5).
    pub fn successors(&self, model: &ModelName) -> Vec<ModelName> {
        let Some(&idx) = self.index_of.get(model) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// All transitive descendants of `model` via CURRENT edges, in no
    /// particular order.
    pub fn descendants(&self, model: &ModelName) -> Vec<ModelName> {
        let Some(&start) = self.index_of.get(model) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for succ in self.graph.neighbors_directed(n, petgraph::Direction::Outgoing) {
                if seen.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        seen.into_iter().map(|i| self.graph[i].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelDependency, ModelKind, ModelSpec, ScenarioSource};
    use std::collections::HashMap;

    fn scenario_model(name: &str) -> Model {
        Model {
            spec: ModelSpec {
                name: ModelName::from(name),
                inputs: vec![],
                outputs: vec![],
                parameters: vec![],
            },
            kind: ModelKind::Scenario(ScenarioSource {
                scenario: "s".into(),
                variant: "v".into(),
            }),
        }
    }

    fn sos(models: Vec<&str>, edges: Vec<(&str, &str, TimestepOffset)>) -> SosModel {
        let mut map = HashMap::new();
        for m in &models {
            map.insert(ModelName::from(*m), scenario_model(m));
        }
        SosModel {
            name: "test".into(),
            models: map,
            scenario_dependencies: vec![],
            model_dependencies: edges
                .into_iter()
                .map(|(s, k, offset)| ModelDependency {
                    source_model: ModelName::from(s),
                    source_output: "out".into(),
                    sink_model: ModelName::from(k),
                    sink_input: "in".into(),
                    offset,
                })
                .collect(),
            narratives: vec![],
        }
    }

    #[test]
    fn linear_chain_topo_orders_source_before_sink() {
        let m = sos(vec!["a", "b"], vec![("a", "b", TimestepOffset::Current)]);
        let g = DependencyGraph::build(&m).unwrap();
        let order = g.topological_order();
        let pos_a = order.iter().position(|n| n.as_str() == "a").unwrap();
        let pos_b = order.iter().position(|n| n.as_str() == "b").unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn current_cycle_is_rejected() {
        let m = sos(
            vec!["a", "b"],
            vec![
                ("a", "b", TimestepOffset::Current),
                ("b", "a", TimestepOffset::Current),
            ],
        );
        assert!(matches!(
            DependencyGraph::build(&m),
            Err(SmifError::CircularDependency { .. })
        ));
    }

    #[test]
    fn previous_edge_does_not_create_a_cycle() {
        let m = sos(
            vec!["a", "b"],
            vec![
                ("a", "b", TimestepOffset::Current),
                ("b", "a", TimestepOffset::Previous),
            ],
        );
        assert!(DependencyGraph::build(&m).is_ok());
    }

    #[test]
    fn topo_order_is_deterministic_for_independent_nodes() {
        let m = sos(vec!["z", "a", "m"], vec![]);
        let g = DependencyGraph::build(&m).unwrap();
        let order: Vec<&str> = g.topological_order().iter().map(|n| n.as_str()).collect();
        assert_eq!(order, vec!["a", "m", "z"]);
    }

    #[test]
    fn layers_group_a_four_node_chain_one_per_layer() {
        let m = sos(
            vec!["a", "b", "c", "d"],
            vec![
                ("a", "b", TimestepOffset::Current),
                ("b", "c", TimestepOffset::Current),
                ("c", "d", TimestepOffset::Current),
            ],
        );
        let g = DependencyGraph::build(&m).unwrap();
        let layers: Vec<Vec<&str>> = g
            .layers()
            .iter()
            .map(|layer| layer.iter().map(|n| n.as_str()).collect())
            .collect();
        assert_eq!(layers, vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]]);
    }

    #[test]
    fn layers_keep_independent_nodes_in_the_same_layer() {
        let m = sos(
            vec!["a", "b", "c"],
            vec![("a", "c", TimestepOffset::Current), ("b", "c", TimestepOffset::Current)],
        );
        let g = DependencyGraph::build(&m).unwrap();
        let layers: Vec<Vec<&str>> = g
            .layers()
            .iter()
            .map(|layer| layer.iter().map(|n| n.as_str()).collect())
            .collect();
        assert_eq!(layers, vec![vec!["a", "b"], vec!["c"]]);
    }
}
