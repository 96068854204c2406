//! `toke models`: catalog listing.

use anyhow::Result;
use toke_core::{ModelCatalog, ModelOption, ModelTier, format_size};

use super::{BOLD, GREEN, RESET, YELLOW};
use crate::bootstrap::CliContext;
use crate::commands::ModelsCommand;
use crate::presentation::{print_separator, truncate_string};

const NAME_WIDTH: usize = 34;

pub fn execute(ctx: &CliContext, command: ModelsCommand) -> Result<()> {
    match command {
        ModelsCommand::List { tier, json: false } => {
            list(&ctx.catalog, tier);
            Ok(())
        }
        ModelsCommand::List { tier, json: true } => {
            println!("{}", to_json(&ctx.catalog, tier)?);
            Ok(())
        }
    }
}

fn list(catalog: &ModelCatalog, only: Option<ModelTier>) {
    let tiers = only.map_or_else(|| ModelTier::ALL.to_vec(), |t| vec![t]);
    for tier in tiers {
        println!("\n{BOLD}{}{RESET}  {}", tier.name(), tier.description());
        print_separator(96);
        for model in catalog.models_by_tier(tier) {
            println!("{}", model_row(model));
            if let Some(reason) = &model.unavailable_reason {
                println!("    {YELLOW}{reason}{RESET}");
            }
        }
    }
    println!("\n★ = recommended");
}

fn to_json(catalog: &ModelCatalog, only: Option<ModelTier>) -> serde_json::Result<String> {
    let models: Vec<&ModelOption> = catalog
        .models()
        .iter()
        .filter(|m| only.is_none_or(|t| m.tier == t))
        .collect();
    serde_json::to_string_pretty(&models)
}

/// `★ id  name  kind  size  RAM  status`, without trailing reason.
fn model_row(model: &ModelOption) -> String {
    let star = if model.recommended { "★" } else { " " };
    let status = if model.available {
        format!("{GREEN}available{RESET}")
    } else {
        format!("{YELLOW}unavailable{RESET}")
    };
    format!(
        "{star} {:<30} {:<NAME_WIDTH$} {:<9} {:>9} {:>9} RAM  {status}",
        model.id,
        truncate_string(&model.name, NAME_WIDTH),
        model.provider.as_str(),
        format_size(model.size),
        format_size(model.memory_required),
    )
}
