//! Composition file parsing and validation.
//!
//! Parses tejer.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Required references must name stacks and export pairs that exist
//! - Cross-stack resource inputs must be covered by a require
//! - Export declarations must ground on something the composition knows

use std::path::Path;

use super::error::ComposeError;
use super::types::{Composition, Reference};

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(message: String) -> ValidationError {
    ValidationError { message }
}

/// Parse a composition file from disk.
pub fn parse_composition_file(path: &Path) -> Result<Composition, ComposeError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ComposeError::Parse(format!("failed to read {}: {}", path.display(), e)))?;
    parse_composition(&content)
}

/// Parse a composition from a YAML string.
pub fn parse_composition(yaml: &str) -> Result<Composition, ComposeError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| ComposeError::Parse(format!("YAML parse error: {}", e)))
}

/// Validate a parsed composition. Returns a list of errors (empty = valid).
///
/// Everything reported here would also surface at graph-build or synthesis
/// time; validating up front reports all problems at once instead of
/// aborting on the first.
pub fn validate_composition(composition: &Composition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if composition.version != "1.0" {
        errors.push(error(format!(
            "version must be \"1.0\", got \"{}\"",
            composition.version
        )));
    }

    if composition.name.is_empty() {
        errors.push(error("name must not be empty".to_string()));
    }

    for (id, stack) in &composition.stacks {
        for required in &stack.requires {
            let Reference::Deferred {
                stack: target,
                resource,
                output,
            } = required
            else {
                errors.push(error(format!(
                    "stack '{}' requires a literal value; requires must name another stack's export",
                    id
                )));
                continue;
            };
            if target == id {
                errors.push(error(format!("stack '{}' requires itself", id)));
                continue;
            }
            let Some(target_stack) = composition.stacks.get(target) else {
                errors.push(error(format!(
                    "stack '{}' requires '{}.{}' from unknown stack '{}'",
                    id, resource, output, target
                )));
                continue;
            };
            if !target_stack.exports.contains_key(output) {
                errors.push(error(format!(
                    "stack '{}' requires '{}.{}' which '{}' never exports",
                    id, resource, output, target
                )));
            }
        }

        for (resource_name, descriptor) in &stack.resources {
            if descriptor.kind.is_empty() {
                errors.push(error(format!(
                    "resource '{}.{}' has no kind",
                    id, resource_name
                )));
            }
            for (input_name, reference) in &descriptor.inputs {
                let Reference::Deferred {
                    stack: target,
                    resource,
                    output,
                } = reference
                else {
                    continue;
                };
                if target == id {
                    let declares = stack
                        .resources
                        .get(resource)
                        .is_some_and(|r| r.outputs.contains(output));
                    if !declares {
                        errors.push(error(format!(
                            "input '{}' of '{}.{}' names unknown sibling output '{}.{}'",
                            input_name, id, resource_name, resource, output
                        )));
                    }
                } else if !stack.requires.contains(reference) {
                    errors.push(error(format!(
                        "input '{}' of '{}.{}' reads '{}.{}' without a matching require",
                        input_name, id, resource_name, target, output
                    )));
                }
            }
        }

        for (export_name, reference) in &stack.exports {
            let Reference::Deferred {
                stack: target,
                resource,
                output,
            } = reference
            else {
                continue;
            };
            if target == id {
                let declares = stack
                    .resources
                    .get(resource)
                    .is_some_and(|r| r.outputs.contains(output));
                let aliases = export_name != output && stack.exports.contains_key(output);
                if !declares && !aliases {
                    errors.push(error(format!(
                        "export '{}' of '{}' names unknown output '{}.{}'",
                        export_name, id, resource, output
                    )));
                }
            } else if !composition.stacks.contains_key(target) {
                errors.push(error(format!(
                    "export '{}' of '{}' references unknown stack '{}'",
                    export_name, id, target
                )));
            }
        }
    }

    errors
}
