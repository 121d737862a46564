//! Port descriptors for the node graph.
//!
//! Every node exposes named input and output ports. An edge joins one output
//! port to one input port, and each port takes part in at most one edge, so
//! every channel keeps a single producer and a single consumer.

/// Default input port of stages and branches.
pub const DEFAULT_INPUT: &str = "in";

/// Default output port of stages and merges.
pub const DEFAULT_OUTPUT: &str = "out";

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Descriptor for one of a node's ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
}

impl PortDescriptor {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
        }
    }
}

/// Key under which a running pipeline exposes an unconnected port: `node.port`.
pub fn port_key(node: &str, port: &str) -> String {
    format!("{}.{}", node, port)
}
