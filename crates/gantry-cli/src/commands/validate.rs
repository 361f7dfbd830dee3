use super::{json_pretty, EXIT_SUCCESS};
use gantry_schema::{load_inventory, Tier};
use std::path::Path;

pub fn run(inventory: &Path, json: bool) -> Result<u8, String> {
    let specs = load_inventory(inventory).map_err(|e| format!("inventory error: {e}"))?;
    let core = specs.values().filter(|s| s.tier() == Tier::Core).count();

    if json {
        let summary = serde_json::json!({
            "path": inventory.display().to_string(),
            "valid": true,
            "resources": specs.len(),
            "core_tier": core,
            "standard_tier": specs.len() - core,
        });
        println!("{}", json_pretty(&summary)?);
    } else {
        println!(
            "{}: {} resource(s), {} core-tier, {} standard-tier",
            inventory.display(),
            specs.len(),
            core,
            specs.len() - core
        );
    }
    Ok(EXIT_SUCCESS)
}
