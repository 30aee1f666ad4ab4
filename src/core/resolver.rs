//! Reference resolution against synthesized stack outputs.
//!
//! Resolution is pure: the same reference resolves to the same value for a
//! fixed snapshot of synthesized outputs.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use super::error::ComposeError;
use super::types::{OutputValue, Reference};

/// Outputs accumulated from already-synthesized stacks, keyed by stack id
/// and then by export name.
pub type SynthesizedOutputs = FxHashMap<String, IndexMap<String, OutputValue>>;

/// Resolve a single reference.
///
/// Literals resolve immediately. A deferred reference is looked up in the
/// outputs of the stack it names; if that stack has not been synthesized
/// yet, the caller violated topological order and gets
/// `UnresolvedReferenceError`.
pub fn resolve(
    reference: &Reference,
    synthesized: &SynthesizedOutputs,
) -> Result<OutputValue, ComposeError> {
    match reference {
        Reference::Literal(value) => Ok(OutputValue::Resolved {
            value: value.clone(),
        }),
        Reference::Deferred { stack, output, .. } => synthesized
            .get(stack)
            .and_then(|outputs| outputs.get(output))
            .cloned()
            .ok_or_else(|| ComposeError::UnresolvedReference {
                stack: stack.clone(),
                output: output.clone(),
            }),
    }
}
