//! Graph compiler: topological order, join order and open ports.

use super::compiled_plan::{CompiledPlan, PlanStats};
use super::error::{PipelineError, PipelineResult};
use super::executor::{Edge, NodeSlot};
use super::port::PortDirection;
use std::collections::{HashSet, VecDeque};

/// Compiles a pipeline graph into an execution plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile a pipeline graph into an execution plan.
    ///
    /// Orders nodes topologically, derives the join order and collects the
    /// ports left unconnected, which become the pipeline's entries and exits.
    ///
    /// # Errors
    /// `CycleDetected` if the graph is not acyclic.
    pub fn compile(nodes: &[NodeSlot], edges: &[Edge]) -> PipelineResult<CompiledPlan> {
        let start_time = std::time::Instant::now();

        let order = Self::topological_order(nodes, edges)?;
        let join_order: Vec<usize> = order.iter().rev().copied().collect();

        let connected: HashSet<(usize, &str, PortDirection)> = edges
            .iter()
            .flat_map(|e| {
                [
                    (e.from_node.index(), e.from_port.as_str(), PortDirection::Output),
                    (e.to_node.index(), e.to_port.as_str(), PortDirection::Input),
                ]
            })
            .collect();

        let mut entries = Vec::new();
        let mut exits = Vec::new();
        let mut source_nodes = 0;
        let mut sink_nodes = 0;

        for (idx, slot) in nodes.iter().enumerate() {
            let mut has_upstream = false;
            let mut has_downstream = false;

            for port in slot.node.ports() {
                let is_connected = connected.contains(&(idx, port.name.as_str(), port.direction));
                match (port.direction, is_connected) {
                    (PortDirection::Input, true) => has_upstream = true,
                    (PortDirection::Output, true) => has_downstream = true,
                    (PortDirection::Input, false) => entries.push((idx, port.name)),
                    (PortDirection::Output, false) => exits.push((idx, port.name)),
                }
            }

            if !has_upstream {
                source_nodes += 1;
            }
            if !has_downstream {
                sink_nodes += 1;
            }
        }

        let stats = PlanStats {
            total_nodes: nodes.len(),
            edges: edges.len(),
            source_nodes,
            sink_nodes,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            order,
            join_order,
            entries,
            exits,
            stats,
        })
    }

    /// Topological sort using Kahn's algorithm
    fn topological_order(nodes: &[NodeSlot], edges: &[Edge]) -> PipelineResult<Vec<usize>> {
        let n = nodes.len();
        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0u32; n];

        for edge in edges {
            let from = edge.from_node.index();
            let to = edge.to_node.index();
            if from >= n || to >= n {
                return Err(PipelineError::InvalidEdge(format!(
                    "{:?} references a missing node",
                    edge.id
                )));
            }
            adj[from].push(to);
            in_degree[to] += 1;
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} nodes ordered.",
                order.len(),
                n
            );
            return Err(PipelineError::CycleDetected);
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::{EdgeId, NodeId};
    use crate::pipeline::node::AnyNode;
    use crate::pipeline::nodes::{Broadcast, Interleave, PassThrough};

    fn slot(node: AnyNode) -> NodeSlot {
        NodeSlot { node }
    }

    fn edge(id: u32, from: u32, from_port: &str, to: u32, to_port: &str) -> Edge {
        Edge {
            id: EdgeId(id),
            from_node: NodeId(from),
            from_port: from_port.to_string(),
            to_node: NodeId(to),
            to_port: to_port.to_string(),
        }
    }

    #[test]
    fn test_compile_linear() {
        let nodes = vec![
            slot(AnyNode::stage(PassThrough::new("a"))),
            slot(AnyNode::stage(PassThrough::new("b"))),
            slot(AnyNode::stage(PassThrough::new("c"))),
        ];
        let edges = vec![edge(0, 0, "out", 1, "in"), edge(1, 1, "out", 2, "in")];

        let plan = PipelineCompiler::compile(&nodes, &edges).unwrap();
        assert_eq!(plan.order, vec![0, 1, 2]);
        assert_eq!(plan.join_order, vec![2, 1, 0]);
        assert_eq!(plan.entries, vec![(0, "in".to_string())]);
        assert_eq!(plan.exits, vec![(2, "out".to_string())]);
        assert_eq!(plan.stats.source_nodes, 1);
        assert_eq!(plan.stats.sink_nodes, 1);
    }

    #[test]
    fn test_compile_diamond() {
        // fan → (left, right) → merge
        let nodes = vec![
            slot(AnyNode::branch(Broadcast::new("fan"), ["l", "r"])),
            slot(AnyNode::stage(PassThrough::new("left"))),
            slot(AnyNode::stage(PassThrough::new("right"))),
            slot(AnyNode::merge(Interleave::new("merge"), ["l", "r"])),
        ];
        let edges = vec![
            edge(0, 0, "l", 1, "in"),
            edge(1, 0, "r", 2, "in"),
            edge(2, 1, "out", 3, "l"),
            edge(3, 2, "out", 3, "r"),
        ];

        let plan = PipelineCompiler::compile(&nodes, &edges).unwrap();
        let pos = |i: usize| plan.order.iter().position(|&x| x == i).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
        assert_eq!(plan.join_order.first(), Some(&3));
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.exits, vec![(3, "out".to_string())]);
    }

    #[test]
    fn test_compile_cycle() {
        let nodes = vec![
            slot(AnyNode::stage(PassThrough::new("a"))),
            slot(AnyNode::stage(PassThrough::new("b"))),
        ];
        let edges = vec![edge(0, 0, "out", 1, "in"), edge(1, 1, "out", 0, "in")];

        assert!(matches!(
            PipelineCompiler::compile(&nodes, &edges),
            Err(PipelineError::CycleDetected)
        ));
    }

    #[test]
    fn test_unconnected_merge_input_is_entry() {
        let nodes = vec![
            slot(AnyNode::stage(PassThrough::new("a"))),
            slot(AnyNode::merge(Interleave::new("merge"), ["x", "y"])),
        ];
        let edges = vec![edge(0, 0, "out", 1, "x")];

        let plan = PipelineCompiler::compile(&nodes, &edges).unwrap();
        assert_eq!(
            plan.entries,
            vec![(0, "in".to_string()), (1, "y".to_string())]
        );
    }
}
