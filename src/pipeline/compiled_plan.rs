//! Execution plan produced by the compiler.

/// Compiled execution plan for a pipeline graph.
///
/// Produced once, when the pipeline starts. Node indices refer to the builder's
/// node list.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Node indices in topological order (sources first).
    pub order: Vec<usize>,

    /// Order in which node threads are joined (sinks first).
    pub join_order: Vec<usize>,

    /// Input ports with no upstream edge: (node index, port name).
    /// The running pipeline owns the producing end of each.
    pub entries: Vec<(usize, String)>,

    /// Output ports with no downstream edge: (node index, port name).
    /// The running pipeline hands the consuming end to the caller.
    pub exits: Vec<(usize, String)>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Total number of nodes in the graph
    pub total_nodes: usize,

    /// Number of edges (internal channels)
    pub edges: usize,

    /// Number of nodes with no connected input
    pub source_nodes: usize,

    /// Number of nodes with no connected output
    pub sink_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}
