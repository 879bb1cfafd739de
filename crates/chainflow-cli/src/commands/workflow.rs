//! `chainflow workflow` — Create, inspect, import and run workflows.

use std::path::Path;

use chainflow_core::chain::{ChainOutcome, InstructionOverrides};
use chainflow_core::definition::WorkflowDefinition;
use chainflow_core::events::{BusMessage, Subscription, AGENT_RESPONSE, RUN_UPDATE};
use chainflow_core::models::{Workflow, DEFAULT_PROJECT_ID};
use chainflow_core::state::AppState;

use super::print_json;

pub async fn create(
    state: &AppState,
    name: &str,
    workflow_type: &str,
    description: Option<&str>,
    project_id: Option<&str>,
) -> Result<Workflow, String> {
    let project_id = project_id.unwrap_or(DEFAULT_PROJECT_ID);
    state
        .project_store
        .get(project_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Project {} not found", project_id))?;

    let workflow = Workflow::new(
        uuid::Uuid::new_v4().to_string(),
        name.to_string(),
        workflow_type.to_string(),
        description.map(|s| s.to_string()),
        project_id.to_string(),
    );
    state
        .workflow_store
        .save(&workflow)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "workflow": workflow }));
    Ok(workflow)
}

pub async fn list(
    state: &AppState,
    project_id: Option<&str>,
    skip: usize,
    limit: usize,
) -> Result<(), String> {
    let workflows = state
        .workflow_store
        .list(project_id, skip, limit)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "workflows": workflows }));
    Ok(())
}

/// Print a workflow with its entities in execution order and its
/// connections.
pub async fn show(state: &AppState, id: &str) -> Result<(), String> {
    let workflow = state
        .workflow_store
        .get(id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Workflow {} not found", id))?;
    let entities = state
        .entity_store
        .list_by_workflow(id)
        .await
        .map_err(|e| e.to_string())?;
    let connections = state
        .entity_store
        .list_connections(id)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "workflow": workflow,
        "entities": entities,
        "connections": connections,
    }));
    Ok(())
}

pub async fn delete(state: &AppState, id: &str) -> Result<(), String> {
    let deleted = state
        .workflow_store
        .delete(id)
        .await
        .map_err(|e| e.to_string())?;
    if !deleted {
        return Err(format!("Workflow {} not found", id));
    }
    println!("Deleted workflow {}", id);
    Ok(())
}

/// Create a workflow from a YAML or JSON definition file.
pub async fn import(state: &AppState, file: &str) -> Result<Workflow, String> {
    let definition = WorkflowDefinition::from_file(Path::new(file)).map_err(|e| e.to_string())?;

    println!(
        "Loaded workflow: {} ({}), {} entit{}",
        definition.name,
        file,
        definition.entities.len(),
        if definition.entities.len() == 1 { "y" } else { "ies" }
    );

    let workflow = definition
        .install(&state.project_store, &state.workflow_store, &state.entity_store)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "workflow": workflow }));
    Ok(workflow)
}

/// Trigger a workflow and wait for the chain to finish.
///
/// `prompts` is a JSON list of shared instruction lines or a JSON object
/// keyed by entity id / external id. With `verbose`, every agent response is
/// printed as it arrives.
pub async fn run(
    state: &AppState,
    id: &str,
    input: &str,
    prompts: Option<&str>,
    verbose: bool,
) -> Result<ChainOutcome, String> {
    let overrides: Option<InstructionOverrides> = prompts
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| format!("Invalid --prompts JSON: {}", e))
        })
        .transpose()?;

    let watcher = verbose.then(|| {
        let watcher_id = format!("cli-{}", uuid::Uuid::new_v4());
        let subscription = state.event_bus.subscribe(&watcher_id);
        (watcher_id, tokio::spawn(follow(subscription)))
    });

    let run_id = uuid::Uuid::new_v4().to_string();
    println!("Run {} started", run_id);
    let result = state
        .orchestrator
        .execute(id, &run_id, input, overrides.as_ref())
        .await;

    if let Some((watcher_id, handle)) = watcher {
        // Ends the subscription once what is already queued has been printed.
        state.event_bus.unsubscribe(&watcher_id);
        if let Err(e) = handle.await {
            tracing::warn!("Progress printer stopped early: {}", e);
        }
    }

    let output = result.map_err(|e| format!("Workflow failed (run {}): {}", run_id, e))?;
    let runs = state.ledger.status(&run_id).await.map_err(|e| e.to_string())?;
    let outcome = ChainOutcome {
        run_id,
        workflow_id: id.to_string(),
        output,
        runs,
    };
    print_json(&serde_json::json!({
        "runId": outcome.run_id,
        "workflowId": outcome.workflow_id,
        "output": outcome.output,
    }));
    Ok(outcome)
}

/// Print agent responses and step updates from `subscription` until it ends.
/// Returns how many were printed.
pub async fn follow(mut subscription: Subscription) -> usize {
    let mut printed = 0;
    while let Some(message) = subscription.next().await {
        let BusMessage::Event(event) = message else {
            continue;
        };
        match event.event.as_str() {
            AGENT_RESPONSE => println!(
                "── {} ──\n{}\n",
                event.data["name"].as_str().unwrap_or("agent"),
                event.data["agent_response"].as_str().unwrap_or_default()
            ),
            RUN_UPDATE => println!(
                "   step {}/{}: {}",
                event.data["step"], event.data["total"], event.data["status"]
            ),
            _ => continue,
        }
        printed += 1;
    }
    printed
}
