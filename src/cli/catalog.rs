//! `catalog` command: list or export the active provider catalog.

use rich_rust::{Segment, Style};
use serde::Serialize;

use crate::cli::args::{CatalogArgs, OutputFormat};
use crate::cli::context::{AppContext, parse_choice};
use crate::cli::output::RobotOutput;
use crate::cli::render::{Align, Theme, cell, gap, panel};
use crate::core::catalog::FileCatalog;
use crate::core::models::Tier;
use crate::core::provider::{ModelPricing, Provider};
use crate::error::Result;
use crate::util::format::{format_price, format_tokens};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogView<'a> {
    source: String,
    version: u64,
    providers: Vec<&'a Provider>,
}

/// Execute the catalog command.
///
/// # Errors
/// Returns catalog loading errors, a `Config` error for an unknown tier, or
/// I/O errors from `--export`.
pub fn execute(ctx: &AppContext, args: &CatalogArgs) -> Result<()> {
    let tier = args
        .tier
        .as_deref()
        .map(|raw| parse_choice("tier", raw, "free, starter, pro, enterprise", Tier::from_arg))
        .transpose()?;

    let catalog = ctx.catalog()?;
    let snapshot = catalog.snapshot();
    let providers: Vec<&Provider> = match tier {
        Some(tier) => snapshot.for_tier(tier).collect(),
        None => snapshot.providers().iter().collect(),
    };

    tracing::debug!(
        source = %snapshot.source,
        providers = providers.len(),
        ?tier,
        "Catalog loaded"
    );

    if let Some(path) = &args.export {
        let owned: Vec<Provider> = providers.iter().map(|p| (*p).clone()).collect();
        FileCatalog::write(path, &owned)?;
        println!("Wrote {} providers to {}", owned.len(), path.display());
        return Ok(());
    }

    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new(
            "catalog",
            CatalogView {
                source: snapshot.source.clone(),
                version: snapshot.version,
                providers,
            },
        )),
        OutputFormat::Human => {
            print!("{}", render_human(&providers, &ctx.theme));
            Ok(())
        }
    }
}

fn render_human(providers: &[&Provider], theme: &Theme) -> String {
    if providers.is_empty() {
        return "No providers in the catalog.\n".to_string();
    }

    let mut out = String::new();
    for provider in providers {
        let mut lines = vec![vec![Segment::styled(
            format!(
                "tier>={}  latency={:?}  context={}{}",
                provider.min_tier,
                provider.latency_class,
                format_tokens(u64::from(provider.max_context_tokens)),
                if provider.is_local { "  local" } else { "" },
            ),
            theme.muted.clone(),
        )]];
        lines.push(vec![
            cell("Model", 28, Align::Left, &theme.header),
            gap(),
            cell("Input", 14, Align::Right, &theme.header),
            gap(),
            cell("Output", 14, Align::Right, &theme.header),
            gap(),
            cell("Quality", 8, Align::Right, &theme.header),
        ]);
        for model in &provider.models {
            let pricing = ModelPricing::resolve(provider, model);
            let price_style = if pricing.is_free() {
                &theme.accent
            } else {
                &theme.muted
            };
            lines.push(vec![
                cell(&model.id, 28, Align::Left, &Style::new()),
                gap(),
                cell(&format_price(pricing.input_per_1k), 14, Align::Right, price_style),
                gap(),
                cell(&format_price(pricing.output_per_1k), 14, Align::Right, price_style),
                gap(),
                cell(&format!("{:.2}", model.quality), 8, Align::Right, &Style::new()),
            ]);
        }
        let title = format!("{} ({})", provider.id, provider.display_name);
        out.push_str(&panel(&title, lines, theme));
    }
    out
}
