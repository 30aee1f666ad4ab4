//! Artifact synthesis in verified dependency order.
//!
//! Walks stacks strictly in plan order, resolves every resource input
//! against the outputs accumulated so far, and records each stack's exports
//! for downstream stacks. Export chains resolve transitively. The whole
//! pass is a pure transform: no network or filesystem calls.

use indexmap::IndexMap;

use super::error::ComposeError;
use super::resolver::{self, SynthesizedOutputs};
use super::types::{
    Artifact, ArtifactResource, Composition, OutputValue, Reference, Stack, Synthesis,
    SynthesisEvent, SynthesisPlan,
};

/// Materialize every stack of `composition` following `plan`.
///
/// The returned artifact order is the required apply order for the external
/// executor: an artifact may reference identifiers that only exist once an
/// earlier artifact has been applied.
pub fn synthesize(
    composition: &Composition,
    plan: &SynthesisPlan,
) -> Result<Synthesis, ComposeError> {
    let mut synthesized = SynthesizedOutputs::default();
    let mut artifacts = Vec::with_capacity(plan.order.len());
    let mut events = vec![SynthesisEvent::SynthStarted {
        composition: composition.name.clone(),
        stacks: plan.order.len(),
    }];

    for stack_id in &plan.order {
        let Some(stack) = composition.stacks.get(stack_id) else {
            continue;
        };

        let mut resources = Vec::with_capacity(stack.resources.len());
        for (logical_name, descriptor) in &stack.resources {
            let mut inputs = IndexMap::new();
            for (input_name, reference) in &descriptor.inputs {
                let value = resolve_input(stack_id, stack, reference, &synthesized)?;
                inputs.insert(input_name.clone(), value);
            }
            resources.push(ArtifactResource {
                logical_name: logical_name.clone(),
                kind: descriptor.kind.clone(),
                inputs,
            });
        }

        let mut exports: IndexMap<String, OutputValue> = IndexMap::new();
        for (name, reference) in &stack.exports {
            let mut in_progress = vec![(stack_id.clone(), name.clone())];
            let value =
                resolve_export(composition, stack_id, reference, &synthesized, &mut in_progress)?;
            exports.insert(name.clone(), value);
        }

        let fingerprint = fingerprint(stack_id, &resources, &exports)?;
        events.push(SynthesisEvent::StackSynthesized {
            stack: stack_id.clone(),
            resources: resources.len(),
            exports: exports.len(),
            fingerprint: fingerprint.clone(),
        });
        synthesized.insert(stack_id.clone(), exports.clone());
        artifacts.push(Artifact {
            stack: stack_id.clone(),
            resources,
            exports,
            fingerprint,
        });
    }

    events.push(SynthesisEvent::SynthCompleted {
        artifacts: artifacts.len(),
    });
    Ok(Synthesis {
        artifacts,
        edges: plan.edges.clone(),
        events,
    })
}

/// Resolve one resource input of the stack being synthesized.
///
/// Intra-stack wires ground on a sibling resource's declared output and
/// stay pending until apply time. Cross-stack wires resolve against the
/// accumulated outputs of already-synthesized stacks.
fn resolve_input(
    stack_id: &str,
    stack: &Stack,
    reference: &Reference,
    synthesized: &SynthesizedOutputs,
) -> Result<OutputValue, ComposeError> {
    match reference {
        Reference::Literal(value) => Ok(OutputValue::Resolved {
            value: value.clone(),
        }),
        Reference::Deferred {
            stack: target,
            resource,
            output,
        } if target == stack_id => {
            let declares = stack
                .resources
                .get(resource)
                .is_some_and(|r| r.outputs.contains(output));
            if declares {
                Ok(OutputValue::Pending {
                    stack: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                })
            } else {
                Err(ComposeError::UnknownReference {
                    stack: stack_id.to_string(),
                    target: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                })
            }
        }
        deferred => resolver::resolve(deferred, synthesized),
    }
}

/// Resolve an exported reference, following chains transitively.
///
/// Grounds are a literal, a declared resource output (which becomes a
/// pending apply-time token), or the already-synthesized outputs of an
/// earlier stack. Chains through not-yet-synthesized stacks walk their
/// export declarations; revisiting a stack/output pair already on the
/// chain is a value-level cycle.
fn resolve_export(
    composition: &Composition,
    owner: &str,
    reference: &Reference,
    synthesized: &SynthesizedOutputs,
    in_progress: &mut Vec<(String, String)>,
) -> Result<OutputValue, ComposeError> {
    match reference {
        Reference::Literal(value) => Ok(OutputValue::Resolved {
            value: value.clone(),
        }),
        Reference::Deferred {
            stack: target,
            resource,
            output,
        } => {
            if synthesized.contains_key(target.as_str()) {
                return resolver::resolve(reference, synthesized);
            }
            let Some(target_stack) = composition.stacks.get(target) else {
                return Err(ComposeError::DanglingReference {
                    stack: owner.to_string(),
                    target: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                });
            };
            let declares = target_stack
                .resources
                .get(resource)
                .is_some_and(|r| r.outputs.contains(output));
            if declares {
                return Ok(OutputValue::Pending {
                    stack: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                });
            }
            let pair = (target.clone(), output.clone());
            if in_progress.contains(&pair) {
                let mut chain: Vec<String> = in_progress
                    .iter()
                    .map(|(stack, output)| format!("{}.{}", stack, output))
                    .collect();
                chain.push(format!("{}.{}", target, output));
                return Err(ComposeError::CyclicReference { chain });
            }
            let Some(next) = target_stack.exports.get(output) else {
                return Err(ComposeError::UnknownReference {
                    stack: owner.to_string(),
                    target: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                });
            };
            in_progress.push(pair);
            let value = resolve_export(composition, target, next, synthesized, in_progress)?;
            in_progress.pop();
            Ok(value)
        }
    }
}

/// BLAKE3 fingerprint of an artifact body, for diffing runs.
fn fingerprint(
    stack: &str,
    resources: &[ArtifactResource],
    exports: &IndexMap<String, OutputValue>,
) -> Result<String, ComposeError> {
    let body = serde_json::json!({
        "stack": stack,
        "resources": resources,
        "exports": exports,
    });
    let encoded = serde_json::to_string(&body)
        .map_err(|e| ComposeError::Parse(format!("artifact encode error: {}", e)))?;
    Ok(format!("blake3:{}", blake3::hash(encoded.as_bytes()).to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph;
    use crate::core::types::ResourceDescriptor;

    fn pipeline() -> Composition {
        let mut composition = Composition::new("pipeline");

        let mut storage = Stack::new();
        storage
            .declare_resource(
                "images",
                ResourceDescriptor::new("object_storage")
                    .input("versioned", Reference::literal(true))
                    .output("bucket_arn"),
            )
            .unwrap();
        storage
            .export(
                "bucket_arn",
                Reference::deferred("storage", "images", "bucket_arn"),
            )
            .unwrap();
        storage
            .export("bucket_name", Reference::literal("foo"))
            .unwrap();

        let mut compute = Stack::new();
        compute.require(Reference::deferred("storage", "images", "bucket_arn"));
        compute.require(Reference::deferred("storage", "storage", "bucket_name"));
        compute
            .declare_resource(
                "upload_fn",
                ResourceDescriptor::new("function")
                    .input(
                        "bucket",
                        Reference::deferred("storage", "images", "bucket_arn"),
                    )
                    .input(
                        "bucket_name",
                        Reference::deferred("storage", "storage", "bucket_name"),
                    )
                    .input("timeout", Reference::literal(30))
                    .output("arn"),
            )
            .unwrap();
        compute
            .export(
                "function_arn",
                Reference::deferred("compute", "upload_fn", "arn"),
            )
            .unwrap();

        let mut gateway = Stack::new();
        gateway.require(Reference::deferred("compute", "upload_fn", "function_arn"));
        gateway
            .declare_resource(
                "api",
                ResourceDescriptor::new("rest_api")
                    .input(
                        "handler",
                        Reference::deferred("compute", "upload_fn", "function_arn"),
                    )
                    .output("url"),
            )
            .unwrap();

        composition.add_stack("storage", storage).unwrap();
        composition.add_stack("compute", compute).unwrap();
        composition.add_stack("gateway", gateway).unwrap();
        composition
    }

    fn synthesize_pipeline() -> Synthesis {
        let composition = pipeline();
        let plan = graph::build(&composition).unwrap();
        synthesize(&composition, &plan).unwrap()
    }

    #[test]
    fn test_synth_order_matches_plan() {
        let synthesis = synthesize_pipeline();
        let ids: Vec<_> = synthesis.artifacts.iter().map(|a| a.stack.as_str()).collect();
        assert_eq!(ids, vec!["storage", "compute", "gateway"]);
    }

    #[test]
    fn test_synth_literal_resolves_without_deploy() {
        let synthesis = synthesize_pipeline();
        let compute = &synthesis.artifacts[1];
        assert_eq!(
            compute.resources[0].inputs["bucket_name"],
            OutputValue::Resolved {
                value: serde_json::json!("foo")
            }
        );
    }

    #[test]
    fn test_synth_deferred_propagates_as_pending_token() {
        let synthesis = synthesize_pipeline();
        let compute = &synthesis.artifacts[1];
        assert_eq!(
            compute.resources[0].inputs["bucket"],
            OutputValue::Pending {
                stack: "storage".into(),
                resource: "images".into(),
                output: "bucket_arn".into(),
            }
        );

        // Gateway sees the token produced by compute's export.
        let gateway = &synthesis.artifacts[2];
        assert_eq!(
            gateway.resources[0].inputs["handler"],
            OutputValue::Pending {
                stack: "compute".into(),
                resource: "upload_fn".into(),
                output: "arn".into(),
            }
        );
    }

    #[test]
    fn test_synth_exports_carry_resolution_status() {
        let synthesis = synthesize_pipeline();
        let storage = &synthesis.artifacts[0];
        assert!(matches!(
            storage.exports["bucket_arn"],
            OutputValue::Pending { .. }
        ));
        assert!(matches!(
            storage.exports["bucket_name"],
            OutputValue::Resolved { .. }
        ));
    }

    #[test]
    fn test_synth_export_chain_across_stacks() {
        let mut composition = Composition::new("chain");
        let mut config = Stack::new();
        config
            .export("region", Reference::literal("us-east-1"))
            .unwrap();
        composition.add_stack("config", config).unwrap();

        let mut base = Stack::new();
        base.require(Reference::deferred("config", "config", "region"));
        base.export(
            "region_alias",
            Reference::deferred("config", "config", "region"),
        )
        .unwrap();
        composition.add_stack("base", base).unwrap();

        let mut app = Stack::new();
        app.require(Reference::deferred("base", "base", "region_alias"));
        app.declare_resource(
            "unit",
            ResourceDescriptor::new("unit").input(
                "region",
                Reference::deferred("base", "base", "region_alias"),
            ),
        )
        .unwrap();
        composition.add_stack("app", app).unwrap();

        let plan = graph::build(&composition).unwrap();
        let synthesis = synthesize(&composition, &plan).unwrap();
        let app_artifact = &synthesis.artifacts[2];
        assert_eq!(
            app_artifact.resources[0].inputs["region"],
            OutputValue::Resolved {
                value: serde_json::json!("us-east-1")
            }
        );
    }

    #[test]
    fn test_synth_forward_chain_through_declarations() {
        // An export may alias a later stack's export; a chain that grounds
        // in a literal resolves at composition time regardless of order.
        let mut composition = Composition::new("forward");
        let mut early = Stack::new();
        early
            .export("alias", Reference::deferred("late", "late", "region"))
            .unwrap();
        composition.add_stack("early", early).unwrap();

        let mut late = Stack::new();
        late.export("region", Reference::literal("eu-west-1")).unwrap();
        composition.add_stack("late", late).unwrap();

        let plan = graph::build(&composition).unwrap();
        let synthesis = synthesize(&composition, &plan).unwrap();
        assert_eq!(
            synthesis.artifacts[0].exports["alias"],
            OutputValue::Resolved {
                value: serde_json::json!("eu-west-1")
            }
        );
    }

    #[test]
    fn test_synth_cyclic_reference_between_exports() {
        let mut composition = Composition::new("cyclic-values");
        let mut a = Stack::new();
        a.export("x", Reference::deferred("b", "b", "y")).unwrap();
        composition.add_stack("a", a).unwrap();
        let mut b = Stack::new();
        b.export("y", Reference::deferred("a", "a", "x")).unwrap();
        composition.add_stack("b", b).unwrap();

        let plan = graph::build(&composition).unwrap();
        let err = synthesize(&composition, &plan).unwrap_err();
        match err {
            ComposeError::CyclicReference { chain } => {
                assert_eq!(chain, vec!["a.x", "b.y", "a.x"]);
            }
            other => panic!("expected reference cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_synth_out_of_order_plan_is_an_invariant_violation() {
        let composition = pipeline();
        let mut plan = graph::build(&composition).unwrap();
        plan.order.swap(0, 1); // compute before storage

        let err = synthesize(&composition, &plan).unwrap_err();
        assert!(matches!(err, ComposeError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_synth_unknown_sibling_output() {
        let mut composition = Composition::new("bad-wire");
        let mut solo = Stack::new();
        solo.declare_resource(
            "fn",
            ResourceDescriptor::new("function").input(
                "log_group",
                Reference::deferred("solo", "log", "name"),
            ),
        )
        .unwrap();
        composition.add_stack("solo", solo).unwrap();

        let plan = graph::build(&composition).unwrap();
        let err = synthesize(&composition, &plan).unwrap_err();
        assert!(matches!(err, ComposeError::UnknownReference { .. }));
    }

    #[test]
    fn test_synth_events_bracket_the_run() {
        let synthesis = synthesize_pipeline();
        assert_eq!(synthesis.events.len(), 5);
        assert!(matches!(
            synthesis.events[0],
            SynthesisEvent::SynthStarted { stacks: 3, .. }
        ));
        assert!(matches!(
            synthesis.events[1],
            SynthesisEvent::StackSynthesized { .. }
        ));
        assert!(matches!(
            synthesis.events[4],
            SynthesisEvent::SynthCompleted { artifacts: 3 }
        ));
    }

    #[test]
    fn test_synth_edges_are_part_of_the_result() {
        let synthesis = synthesize_pipeline();
        assert_eq!(synthesis.edges.len(), 2);
        assert_eq!(synthesis.edges[0].from, "storage");
        assert_eq!(synthesis.edges[0].to, "compute");
    }

    #[test]
    fn test_synth_fingerprints_are_deterministic() {
        let first = synthesize_pipeline();
        let second = synthesize_pipeline();
        for (a, b) in first.artifacts.iter().zip(&second.artifacts) {
            assert!(a.fingerprint.starts_with("blake3:"));
            assert_eq!(a.fingerprint, b.fingerprint);
        }
    }

    #[test]
    fn test_synth_demo_pipeline_end_to_end() {
        let yaml = include_str!("../../demos/pipeline.yaml");
        let composition = crate::core::parser::parse_composition(yaml).unwrap();
        let errors = crate::core::parser::validate_composition(&composition);
        assert!(
            errors.is_empty(),
            "unexpected errors: {:?}",
            errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>()
        );

        let plan = graph::build(&composition).unwrap();
        assert_eq!(
            plan.order,
            vec![
                "storage",
                "tables",
                "secrets",
                "functions",
                "gateway",
                "dashboard",
                "frontend"
            ]
        );
        assert_eq!(plan.edges.len(), 5);

        let synthesis = synthesize(&composition, &plan).unwrap();
        assert_eq!(synthesis.artifacts.len(), 7);

        // The monitoring dashboard sees the api name token minted by gateway.
        let dashboard = &synthesis.artifacts[5];
        assert_eq!(
            dashboard.resources[0].inputs["api_name"],
            OutputValue::Pending {
                stack: "gateway".into(),
                resource: "api".into(),
                output: "name".into(),
            }
        );
        // Literal wiring resolved at composition time.
        assert_eq!(
            dashboard.resources[0].inputs["period_minutes"],
            OutputValue::Resolved {
                value: serde_json::json!(5)
            }
        );
    }

    #[test]
    fn test_synth_fingerprint_tracks_input_changes() {
        let baseline = synthesize_pipeline();

        let mut changed = pipeline();
        let compute = changed.stacks.get_mut("compute").unwrap();
        let descriptor = compute.resources.get_mut("upload_fn").unwrap();
        descriptor
            .inputs
            .insert("timeout".to_string(), Reference::literal(60));
        let plan = graph::build(&changed).unwrap();
        let synthesis = synthesize(&changed, &plan).unwrap();

        assert_ne!(
            baseline.artifacts[1].fingerprint,
            synthesis.artifacts[1].fingerprint
        );
        assert_eq!(
            baseline.artifacts[0].fingerprint,
            synthesis.artifacts[0].fingerprint
        );
    }
}
