//! Port / connection validation, performed when the user proposes a new
//! edge on the canvas (never during a run).
//!
//! A candidate is accepted iff both endpoints exist, it is not a self-loop,
//! no identical `(from, to, fromPort, toPort)` edge exists, and the output
//! port's type is compatible with the input port's type.

use std::collections::HashSet;

use nodes::ports::find_port;
use nodes::{Connection, Node, PortType, ServiceRegistry};

use crate::error::ConnectionError;

/// Directed upgrades shipped by default: an output of the first type may
/// feed an input of the second, not the other way round.
pub const DEFAULT_UPGRADES: &[(PortType, PortType)] = &[
    (PortType::StructuredScript, PortType::StoryboardShots),
    (PortType::StoryboardShots, PortType::VideoPrompt),
];

// ---------------------------------------------------------------------------
// Compatibility table
// ---------------------------------------------------------------------------

/// Port type compatibility rules.
#[derive(Debug, Clone)]
pub struct PortCompatibility {
    universal: PortType,
    upgrades: HashSet<(PortType, PortType)>,
}

impl Default for PortCompatibility {
    fn default() -> Self {
        Self {
            universal: PortType::Text,
            upgrades: DEFAULT_UPGRADES.iter().copied().collect(),
        }
    }
}

impl PortCompatibility {
    /// Exact matches and the universal type only.
    pub fn strict() -> Self {
        Self {
            upgrades: HashSet::new(),
            ..Self::default()
        }
    }

    /// Allow `output` to feed `input`. The reverse is unaffected.
    pub fn with_upgrade(mut self, output: PortType, input: PortType) -> Self {
        self.upgrades.insert((output, input));
        self
    }

    pub fn is_compatible(&self, output: PortType, input: PortType) -> bool {
        output == input
            || output == self.universal
            || input == self.universal
            || self.upgrades.contains(&(output, input))
    }
}

/// [`PortCompatibility::is_compatible`] with the default table.
pub fn is_port_compatible(output: PortType, input: PortType) -> bool {
    PortCompatibility::default().is_compatible(output, input)
}

// ---------------------------------------------------------------------------
// Connection validator
// ---------------------------------------------------------------------------

/// Checks proposed connections against the registered services' ports.
#[derive(Debug, Clone)]
pub struct ConnectionValidator<'a> {
    registry: &'a ServiceRegistry,
    compatibility: PortCompatibility,
}

impl<'a> ConnectionValidator<'a> {
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self {
            registry,
            compatibility: PortCompatibility::default(),
        }
    }

    pub fn with_compatibility(mut self, compatibility: PortCompatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Validate `candidate` against the current canvas.
    ///
    /// Port types are only compared when both node types are registered and
    /// both ports are declared; anything less specific is accepted.
    pub fn validate(
        &self,
        candidate: &Connection,
        nodes: &[Node],
        existing: &[Connection],
    ) -> Result<(), ConnectionError> {
        let find = |id: &str| nodes.iter().find(|node| node.id == id);
        let from_node = find(candidate.from.as_str()).ok_or_else(|| ConnectionError::UnknownNode {
            node_id: candidate.from.clone(),
            side: "from",
        })?;
        let to_node = find(candidate.to.as_str()).ok_or_else(|| ConnectionError::UnknownNode {
            node_id: candidate.to.clone(),
            side: "to",
        })?;

        if candidate.from == candidate.to {
            return Err(ConnectionError::SelfLoop(candidate.from.clone()));
        }

        if existing.iter().any(|conn| conn.same_edge(candidate)) {
            return Err(ConnectionError::Duplicate {
                from: candidate.from.clone(),
                to: candidate.to.clone(),
            });
        }

        let (Some(from_service), Some(to_service)) = (
            self.registry.get(&from_node.node_type),
            self.registry.get(&to_node.node_type),
        ) else {
            return Ok(());
        };

        let output = find_port(from_service.output_schema(), candidate.from_port_key());
        let input = find_port(to_service.input_schema(), candidate.to_port_key());
        if let (Some(output), Some(input)) = (output, input) {
            if !self.compatibility.is_compatible(output.port_type, input.port_type) {
                return Err(ConnectionError::IncompatiblePorts {
                    from_type: output.port_type,
                    to_type: input.port_type,
                });
            }
        }

        Ok(())
    }
}

/// Validate `candidate` with the default compatibility table.
pub fn validate_connection(
    candidate: &Connection,
    nodes: &[Node],
    existing: &[Connection],
    registry: &ServiceRegistry,
) -> Result<(), ConnectionError> {
    ConnectionValidator::new(registry).validate(candidate, nodes, existing)
}
