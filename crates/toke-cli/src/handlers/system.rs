//! `toke system`: host capacity and recommendations.

use anyhow::Result;
use toke_core::{
    ModelCatalog, SystemInfo, format_size, format_system_requirement, recommend_models_for_system,
};
use toke_runtime::probe_system;

use super::{BOLD, RESET, YELLOW};
use crate::bootstrap::CliContext;
use crate::presentation::print_separator;

pub fn execute(ctx: &CliContext) -> Result<()> {
    let info = probe_system(&ctx.data_root);
    print_info(&info);

    for warning in ctx.orchestrator().check_system_requirements() {
        println!("{YELLOW}! {warning}{RESET}");
    }

    println!("\n{BOLD}Recommended models{RESET}");
    print_separator(60);
    for line in recommendation_lines(&ctx.catalog, &info) {
        println!("{line}");
    }
    Ok(())
}

fn print_info(info: &SystemInfo) {
    println!("{BOLD}System{RESET}");
    print_separator(60);
    println!(
        "  Memory:         {} total, {} available",
        format_size(info.total_memory),
        format_size(info.available_memory)
    );
    println!("  CPU cores:      {}", info.cpu_cores);
    println!("  Free disk:      {}", format_size(info.free_disk));
    println!(
        "  Apple Silicon:  {}",
        if info.is_apple_silicon { "yes" } else { "no" }
    );
}

fn recommendation_lines(catalog: &ModelCatalog, info: &SystemInfo) -> Vec<String> {
    recommend_models_for_system(catalog, info)
        .iter()
        .enumerate()
        .map(|(i, model)| {
            format!(
                "{}. {} ({})\n   {}",
                i + 1,
                model.name,
                model.id,
                format_system_requirement(model, info)
            )
        })
        .collect()
}
