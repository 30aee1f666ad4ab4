//! Declaration and artifact types for the composition engine.
//!
//! Defines the YAML schema types for compositions, stacks, resource
//! descriptors, and references, plus the synthesized output types handed to
//! the deployment executor. All types derive Serialize/Deserialize.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::ComposeError;

// ============================================================================
// References
// ============================================================================

/// A value handle wired between stacks.
///
/// `Literal` is known at composition time (a fixed region string, a retention
/// period). `Deferred` names an output of another stack's resource and cannot
/// be resolved until that stack has been synthesized: the true value (a
/// generated identifier, an endpoint URL) does not exist before then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Deferred {
        /// Id of the stack that produces the value.
        stack: String,
        /// Logical name of the resource backing the value.
        resource: String,
        /// Export name under which the producing stack publishes the value.
        output: String,
    },
    Literal(serde_json::Value),
}

impl Reference {
    /// A composition-time constant.
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A deferred pointer at `stack`'s resource output, published as `output`.
    pub fn deferred(stack: &str, resource: &str, output: &str) -> Self {
        Self::Deferred {
            stack: stack.to_string(),
            resource: resource.to_string(),
            output: output.to_string(),
        }
    }
}

// ============================================================================
// Resource descriptors
// ============================================================================

/// One provisionable entity, opaque to the engine.
///
/// The engine never interprets `kind`; it only tracks the declared inputs
/// (references to be substituted at synthesis) and the declared output names
/// (read-only handles other stacks may reference). Immutable once declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource kind (e.g. "object_storage", "function"). Opaque.
    pub kind: String,

    /// Input values, literal or wired from other resources.
    #[serde(default)]
    pub inputs: IndexMap<String, Reference>,

    /// Names of the outputs this resource produces at apply time.
    #[serde(default)]
    pub outputs: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            inputs: IndexMap::new(),
            outputs: BTreeSet::new(),
        }
    }

    /// Add an input wire. Consumes and returns self for declaration chaining.
    pub fn input(mut self, name: &str, reference: Reference) -> Self {
        self.inputs.insert(name.to_string(), reference);
        self
    }

    /// Declare an output name.
    pub fn output(mut self, name: &str) -> Self {
        self.outputs.insert(name.to_string());
        self
    }
}

// ============================================================================
// Stacks
// ============================================================================

/// A named group of resource descriptors with declared required and exported
/// references. Stacks are built once by the composition root and never
/// mutated after declaration; their id is the key in [`Composition::stacks`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    /// Resource declarations, in declaration order.
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDescriptor>,

    /// Values this stack offers to others, keyed by export name.
    #[serde(default)]
    pub exports: IndexMap<String, Reference>,

    /// Values this stack needs from other stacks. Dependency edges are
    /// derived from these, never stored independently.
    #[serde(default)]
    pub requires: Vec<Reference>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource. Fails on a reused logical name; the resource
    /// sequence is left unchanged on failure.
    pub fn declare_resource(
        &mut self,
        logical_name: &str,
        resource: ResourceDescriptor,
    ) -> Result<(), ComposeError> {
        if self.resources.contains_key(logical_name) {
            return Err(ComposeError::DuplicateResource {
                resource: logical_name.to_string(),
            });
        }
        self.resources.insert(logical_name.to_string(), resource);
        Ok(())
    }

    /// Register an exported reference under `name`.
    pub fn export(&mut self, name: &str, reference: Reference) -> Result<(), ComposeError> {
        if self.exports.contains_key(name) {
            return Err(ComposeError::DuplicateExport {
                name: name.to_string(),
            });
        }
        self.exports.insert(name.to_string(), reference);
        Ok(())
    }

    /// Record a dependency on another stack's export. Duplicates are
    /// collapsed. Whether the referenced pair actually exists is checked
    /// lazily at graph-build time, since exports may be declared after
    /// requires during single-pass construction.
    pub fn require(&mut self, reference: Reference) {
        if !self.requires.contains(&reference) {
            self.requires.push(reference);
        }
    }
}

// ============================================================================
// Composition
// ============================================================================

/// An explicit composition of stacks. Built per run and discarded; there is
/// no process-wide registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Schema version (must be "1.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable composition name.
    pub name: String,

    /// Stack declarations, in declaration order. Ids are unique by
    /// construction.
    #[serde(default)]
    pub stacks: IndexMap<String, Stack>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Composition {
    pub fn new(name: &str) -> Self {
        Self {
            version: default_version(),
            name: name.to_string(),
            stacks: IndexMap::new(),
        }
    }

    /// Add a stack under `id`. Fails if the id is already taken.
    pub fn add_stack(&mut self, id: &str, stack: Stack) -> Result<(), ComposeError> {
        if self.stacks.contains_key(id) {
            return Err(ComposeError::DuplicateStack { id: id.to_string() });
        }
        self.stacks.insert(id.to_string(), stack);
        Ok(())
    }
}

// ============================================================================
// Synthesis plan
// ============================================================================

/// One derived dependency edge: `to` requires at least one export of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

/// The verified synthesis order plus the raw edge set.
///
/// The flattened order alone is not enough for an executor that wants to
/// apply independent artifacts in parallel, so the adjacency structure is
/// part of the public result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisPlan {
    /// Stack ids in dependency order. For every edge, `from` precedes `to`.
    pub order: Vec<String>,

    /// Deduplicated edge set, in derivation order.
    pub edges: Vec<DependencyEdge>,

    /// Successors per stack, covering every stack in the composition.
    pub adjacency: IndexMap<String, Vec<String>>,
}

// ============================================================================
// Synthesized values and artifacts
// ============================================================================

/// A reference after resolution against the synthesized-output accumulator.
///
/// `Resolved` values were known at synthesis time. `Pending` values ground on
/// a resource output that only exists once the owning artifact is applied;
/// the executor substitutes them at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputValue {
    Resolved {
        value: serde_json::Value,
    },
    Pending {
        stack: String,
        resource: String,
        output: String,
    },
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved { value } => match value {
                serde_json::Value::String(s) => write!(f, "{}", s),
                other => write!(f, "{}", other),
            },
            Self::Pending {
                stack,
                resource,
                output,
            } => write!(f, "${{{}/{}/{}}}", stack, resource, output),
        }
    }
}

/// A materialized resource entry inside an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResource {
    pub logical_name: String,
    pub kind: String,
    pub inputs: IndexMap<String, OutputValue>,
}

/// The synthesized template for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Owning stack id.
    pub stack: String,

    /// Materialized resources, in declaration order.
    pub resources: Vec<ArtifactResource>,

    /// Exported outputs with their resolution status.
    pub exports: IndexMap<String, OutputValue>,

    /// BLAKE3 hash of the artifact body, for diffing runs.
    pub fingerprint: String,
}

/// Everything the deployment executor needs: artifacts in apply order plus
/// the raw edge set, and the per-stack outcome events for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub artifacts: Vec<Artifact>,
    pub edges: Vec<DependencyEdge>,
    pub events: Vec<SynthesisEvent>,
}

// ============================================================================
// Synthesis events
// ============================================================================

/// Per-stack synthesis outcome, for observability. The engine performs no
/// I/O itself; callers render or persist these as they see fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SynthesisEvent {
    SynthStarted {
        composition: String,
        stacks: usize,
    },
    StackSynthesized {
        stack: String,
        resources: usize,
        exports: usize,
        fingerprint: String,
    },
    SynthCompleted {
        artifacts: usize,
    },
}

// ============================================================================
// Tests
// ============================================================================
