use super::{colorize_state, json_pretty, EXIT_SUCCESS};
use gantry_core::{Engine, PlannedAction};
use gantry_schema::load_inventory;
use std::path::Path;

pub fn run(engine: &Engine, inventory: &Path, json: bool) -> Result<u8, String> {
    let specs = load_inventory(inventory).map_err(|e| format!("inventory error: {e}"))?;
    let actions = engine.plan(&specs);

    if json {
        println!("{}", json_pretty(&actions)?);
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "{:<6} {:<20} {:<10} {:<18} {:<12} PASSTHROUGH",
        "ID", "NAME", "TIER", "ROLE", "STATE"
    );
    for action in &actions {
        println!(
            "{:<6} {:<20} {:<10} {:<18} {:<12} {}",
            action.id,
            action.name,
            action.tier,
            action.role,
            state_cell(action),
            passthrough_cell(action),
        );
    }
    Ok(EXIT_SUCCESS)
}

fn state_cell(action: &PlannedAction) -> String {
    match &action.current_state {
        Some(state) => colorize_state(&state.to_string()),
        None => "unknown".to_owned(),
    }
}

fn passthrough_cell(action: &PlannedAction) -> String {
    match &action.passthrough {
        Ok(plan) if plan.is_empty() => "up to date".to_owned(),
        Ok(plan) => format!("-{} +{} (restart)", plan.to_remove.len(), plan.to_add.len()),
        Err(e) => format!("invalid: {e}"),
    }
}
