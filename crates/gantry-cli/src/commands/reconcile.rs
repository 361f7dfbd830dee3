use super::{colorize_state, json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use gantry_core::{Engine, RunReport};
use std::path::Path;

pub fn run(engine: &Engine, inventory: &Path, json: bool) -> Result<u8, String> {
    if json {
        let report = engine.reconcile_file(inventory).map_err(|e| e.to_string())?;
        println!("{}", json_pretty(&report)?);
        return Ok(exit_code(&report));
    }

    let pb = spinner(&format!("Reconciling {}", inventory.display()));
    let report = match engine.reconcile_file(inventory) {
        Ok(report) => report,
        Err(e) => {
            spin_fail(&pb, "Reconciliation aborted");
            return Err(e.to_string());
        }
    };

    if report.success() {
        spin_ok(
            &pb,
            &format!("{} container(s) validated", report.validated_count()),
        );
    } else if report.interrupted {
        spin_fail(&pb, "Run interrupted");
    } else {
        spin_fail(&pb, "Reconciliation finished with failures");
    }

    print_summary(&report);
    Ok(exit_code(&report))
}

fn exit_code(report: &RunReport) -> u8 {
    if report.success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!(
        "{:<6} {:<20} {:<10} {:<18} STATE",
        "ID", "NAME", "TIER", "ROLE"
    );
    for outcome in &report.outcomes {
        let state = colorize_state(&outcome.state.to_string());
        println!(
            "{:<6} {:<20} {:<10} {:<18} {state}",
            outcome.id, outcome.name, outcome.tier, outcome.role,
        );
        if let Some(reason) = &outcome.skipped {
            println!("       skipped: {reason}");
        }
        if let Some(failure) = &outcome.failure {
            println!("       {}: {}", failure.operation, failure.error);
        }
    }
}
