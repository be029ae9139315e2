//! Target graph resolution.
//!
//! Turns every declared target plus the requested command list into a
//! [`BuildModel`]: validated, topologically ordered, with the run state of
//! each target initialized.

use crate::model::{BuildModel, TargetId, TargetModel, TargetState, TargetStatus};
use crate::target::TargetDefinition;
use crate::{Error, Result};
use keel_task_graph::{NodeIndex, TargetGraph};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Resolve declarations into a build model.
///
/// Every declared target is materialized, not only requested ones, so that
/// configuration errors anywhere in the graph abort the run. Requested
/// targets are marked `PendingRun`; unless `skip_dependencies` is set, so is
/// their transitive dependency closure. Everything else stays `Skipped`.
///
/// # Errors
///
/// Returns a configuration error for duplicate names, references to
/// undefined targets, a dependency cycle, or an unknown requested target.
#[instrument(skip(definitions))]
pub fn resolve(
    definitions: Vec<TargetDefinition>,
    requested: &[String],
    skip_dependencies: bool,
) -> Result<BuildModel> {
    let mut graph =
        TargetGraph::from_nodes(definitions.into_iter().map(|def| (def.name.clone(), def)))?;
    graph.add_dependency_edges()?;
    let order = graph.topological_order()?;

    let seeds = requested
        .iter()
        .map(|name| {
            graph.index_of(name).ok_or_else(|| Error::UnknownTarget {
                name: name.clone(),
                available: graph
                    .iter_nodes()
                    .map(|(_, node)| node.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        })
        .collect::<Result<Vec<NodeIndex>>>()?;

    let pending = if skip_dependencies {
        seeds.iter().copied().collect()
    } else {
        graph.dependency_closure(seeds.iter().copied())
    };

    // Position in topological order becomes the target id.
    let mut position = vec![0; graph.len()];
    for (i, node) in order.iter().enumerate() {
        position[node.index()] = i;
    }

    let mut slots: Vec<Option<TargetModel>> = vec![None; order.len()];
    let mut states = vec![TargetState::default(); order.len()];
    for (index, (node, deps)) in graph.into_nodes().into_iter().enumerate() {
        let id = TargetId(position[index]);
        if pending.contains(&NodeIndex::new(index)) {
            states[id.0].status = TargetStatus::PendingRun;
        }
        let def = node.data;
        slots[id.0] = Some(TargetModel {
            id,
            name: def.name,
            description: def.description,
            hidden: def.hidden,
            tasks: def.tasks,
            dependencies: deps.iter().map(|d| TargetId(position[d.index()])).collect(),
            requires: def.requires,
            produces_artifacts: def.produces_artifacts,
            consumes_artifacts: def.consumes_artifacts,
            produces_variables: def.produces_variables,
            consumes_variables: def.consumes_variables,
        });
    }

    let targets: Vec<TargetModel> = slots.into_iter().flatten().collect();
    let by_name: HashMap<String, TargetId> = targets
        .iter()
        .map(|target| (target.name.clone(), target.id))
        .collect();
    let requested = seeds
        .iter()
        .map(|seed| TargetId(position[seed.index()]))
        .collect();

    debug!(
        order = ?targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Resolved build model"
    );

    Ok(BuildModel {
        targets,
        states,
        by_name,
        requested,
    })
}
