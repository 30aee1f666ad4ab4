//! Composition errors.
//!
//! Every variant is a deterministic structural failure that aborts the whole
//! run. None are retried and none support partial success: a composition with
//! a cycle or a dangling reference cannot be partially ordered safely.

use thiserror::Error;

/// Errors raised while declaring, ordering, or synthesizing a composition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// A stack already declares a resource with this logical name.
    #[error("resource '{resource}' is already declared in this stack")]
    DuplicateResource { resource: String },

    /// A stack already exports a value under this name.
    #[error("export '{name}' is already declared in this stack")]
    DuplicateExport { name: String },

    /// A composition already contains a stack with this id.
    #[error("stack '{id}' is already declared in this composition")]
    DuplicateStack { id: String },

    /// A required reference names an output pair the target stack never exports.
    #[error(
        "stack '{stack}' requires '{resource}.{output}' from '{target}', which never exports it"
    )]
    UnknownReference {
        stack: String,
        target: String,
        resource: String,
        output: String,
    },

    /// A required reference names a stack absent from the composition.
    #[error(
        "stack '{stack}' references '{resource}.{output}' of '{target}', \
         which is not part of the composition"
    )]
    DanglingReference {
        stack: String,
        target: String,
        resource: String,
        output: String,
    },

    /// The stack graph contains a cycle. Carries the full cycle path.
    #[error("dependency cycle between stacks: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// An export chain revisited a stack/output pair already being resolved.
    /// Value-level, distinct from a stack-level dependency cycle.
    #[error("reference cycle while resolving exports: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    /// An output was read before its stack was synthesized. This is an
    /// ordering bug in the caller, not a user-facing misconfiguration.
    #[error("output '{output}' of stack '{stack}' was read before that stack was synthesized")]
    UnresolvedReference { stack: String, output: String },

    /// The composition file could not be read or parsed.
    #[error("{0}")]
    Parse(String),
}
