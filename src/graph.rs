//! Flow definition: nodes, static edges, and conditional edges with closed
//! target maps.
//!
//! [`FlowBuilder`] collects the topology with a fluent API and validates it
//! in [`compile`](FlowBuilder::compile). Routing after a node is either a
//! single static edge or a conditional edge whose discriminator value must
//! match the closed target map exactly; an unmapped value is a fatal error
//! for the turn, never a default branch.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::node::Node;
use crate::state::ConversationState;
use crate::types::NodeKind;

/// Extracts the routing discriminator value from the current state.
///
/// Returning `None` means the node that was supposed to produce the value
/// did not; the runner treats that the same as an unmapped value.
pub type Discriminator = Arc<dyn Fn(&ConversationState) -> Option<String> + Send + Sync>;

/// A conditional edge: discriminator plus a closed `value → target` map.
#[derive(Clone)]
pub struct ConditionalEdge {
    pub(crate) discriminator: Discriminator,
    pub(crate) targets: FxHashMap<String, NodeKind>,
}

/// Builder for flow graphs.
///
/// # Examples
///
/// ```
/// use campusflow::graph::FlowBuilder;
/// use campusflow::types::NodeKind;
/// # use campusflow::node::{Node, NodeContext, NodeStep, NodeError};
/// # use campusflow::state::{ConversationState, StateUpdate};
/// # struct Echo;
/// # #[async_trait::async_trait]
/// # impl Node for Echo {
/// #     async fn run(&self, _: &ConversationState, _: NodeContext) -> Result<NodeStep, NodeError> {
/// #         Ok(NodeStep::Continue(StateUpdate::new()))
/// #     }
/// # }
///
/// let flow = FlowBuilder::new()
///     .add_node("echo", Echo)
///     .add_edge(NodeKind::Start, "echo".into())
///     .add_edge("echo".into(), NodeKind::End)
///     .compile()
///     .unwrap();
/// ```
pub struct FlowBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional_edges: FxHashMap<NodeKind, ConditionalEdge>,
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: FxHashMap::default(),
        }
    }

    /// Registers an executable node under `name`.
    ///
    /// `Start` and `End` are virtual endpoints; attempting to register them
    /// is ignored with a warning, matching their structural-only role.
    #[must_use]
    pub fn add_node(mut self, name: &str, node: impl Node + 'static) -> Self {
        let id = NodeKind::from(name);
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual node kind");
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Adds a static edge. Each node has at most one outgoing static edge;
    /// adding a second replaces the first.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.insert(from, to);
        self
    }

    /// Adds a conditional edge with a closed target map.
    ///
    /// At runtime the discriminator is evaluated against the merged state and
    /// the resulting value is looked up in `targets`; anything unmapped is a
    /// fatal routing error for the turn.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: NodeKind,
        discriminator: Discriminator,
        targets: impl IntoIterator<Item = (&'static str, NodeKind)>,
    ) -> Self {
        let targets = targets
            .into_iter()
            .map(|(value, to)| (value.to_string(), to))
            .collect();
        self.conditional_edges.insert(
            from,
            ConditionalEdge {
                discriminator,
                targets,
            },
        );
        self
    }

    /// Validates the topology and compiles it into an executable [`Flow`].
    pub fn compile(self) -> Result<Flow, FlowError> {
        let known = |kind: &NodeKind| -> bool {
            matches!(kind, NodeKind::Start | NodeKind::End) || self.nodes.contains_key(kind)
        };

        if !self.edges.contains_key(&NodeKind::Start)
            && !self.conditional_edges.contains_key(&NodeKind::Start)
        {
            return Err(FlowError::MissingStartEdge);
        }

        for (from, to) in &self.edges {
            if !known(from) {
                return Err(FlowError::UnknownNode { node: from.clone() });
            }
            if !known(to) {
                return Err(FlowError::UnknownNode { node: to.clone() });
            }
            if self.conditional_edges.contains_key(from) {
                return Err(FlowError::ConflictingEdges { node: from.clone() });
            }
        }
        for (from, edge) in &self.conditional_edges {
            if !known(from) {
                return Err(FlowError::UnknownNode { node: from.clone() });
            }
            for to in edge.targets.values() {
                if !known(to) {
                    return Err(FlowError::UnknownNode { node: to.clone() });
                }
            }
        }

        Ok(Flow {
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
        })
    }
}

/// A compiled, validated flow graph.
pub struct Flow {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional_edges: FxHashMap<NodeKind, ConditionalEdge>,
}

impl Flow {
    /// Looks up the executable node registered under `kind`.
    pub fn node(&self, kind: &NodeKind) -> Result<Arc<dyn Node>, FlowError> {
        self.nodes
            .get(kind)
            .cloned()
            .ok_or_else(|| FlowError::UnknownNode { node: kind.clone() })
    }

    /// Resolves the node to execute after `from` against the merged state.
    pub fn next_node(
        &self,
        from: &NodeKind,
        state: &ConversationState,
    ) -> Result<NodeKind, FlowError> {
        if let Some(edge) = self.conditional_edges.get(from) {
            let value = (edge.discriminator)(state).ok_or_else(|| FlowError::UnmappedRoute {
                from: from.clone(),
                value: "<none>".to_string(),
            })?;
            return edge
                .targets
                .get(&value)
                .cloned()
                .ok_or(FlowError::UnmappedRoute {
                    from: from.clone(),
                    value,
                });
        }
        self.edges
            .get(from)
            .cloned()
            .ok_or_else(|| FlowError::NoRoute { from: from.clone() })
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field(
                "conditional_edges",
                &self.conditional_edges.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Topology and routing errors.
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    #[error("no edge leaves the virtual Start node")]
    #[diagnostic(
        code(campusflow::flow::missing_start_edge),
        help("Add an edge from NodeKind::Start to the entry node.")
    )]
    MissingStartEdge,

    #[error("edge references unregistered node: {node}")]
    #[diagnostic(code(campusflow::flow::unknown_node))]
    UnknownNode { node: NodeKind },

    #[error("node {node} has both a static and a conditional outgoing edge")]
    #[diagnostic(code(campusflow::flow::conflicting_edges))]
    ConflictingEdges { node: NodeKind },

    #[error("no outgoing edge from node: {from}")]
    #[diagnostic(code(campusflow::flow::no_route))]
    NoRoute { from: NodeKind },

    #[error("conditional edge from {from} has no mapping for value {value:?}")]
    #[diagnostic(
        code(campusflow::flow::unmapped_route),
        help("Discriminator values are validated against the closed target set; there is no default branch.")
    )]
    UnmappedRoute { from: NodeKind, value: String },
}
