//! `route` command: run one routing decision and print it.

use std::collections::HashSet;

use rich_rust::Segment;

use crate::cli::args::{OutputFormat, RouteArgs};
use crate::cli::context::{AppContext, parse_amount, parse_choice};
use crate::cli::output::RobotOutput;
use crate::cli::render::{Theme, panel};
use crate::core::models::{
    LatencyRequirement, PowerLevel, QualityRequirement, RoutingDecision, RoutingRequest, TaskType,
    Tier,
};
use crate::error::Result;
use crate::util::format::format_credits;

/// Build a routing request from command-line arguments.
///
/// # Errors
/// Returns `Config` for any unparsable dimension.
pub fn build_request(args: &RouteArgs) -> Result<RoutingRequest> {
    let task = parse_choice(
        "task",
        &args.task,
        "chat, code, analysis, creative, rag",
        TaskType::from_arg,
    )?;
    let tier = parse_choice("tier", &args.tier, "free, starter, pro, enterprise", Tier::from_arg)?;
    let latency = parse_choice(
        "latency",
        &args.latency,
        "instant, fast, normal, slow",
        LatencyRequirement::from_arg,
    )?;
    let quality = parse_choice(
        "quality",
        &args.quality,
        "basic, good, best",
        QualityRequirement::from_arg,
    )?;
    let power = parse_choice(
        "power level",
        &args.power,
        "eco, balanced, precision",
        PowerLevel::from_arg,
    )?;

    let mut request = RoutingRequest::new(args.account.clone(), task, args.tokens)
        .with_tier(tier)
        .with_latency(latency)
        .with_quality(quality)
        .with_power_level(power)
        .with_privacy(args.privacy)
        .with_byok(args.byok.iter().cloned());
    if let Some(raw) = &args.credits {
        request = request.with_credits(parse_amount("credits", raw)?);
    }
    Ok(request)
}

/// Execute the route command.
///
/// # Errors
/// Returns argument errors, catalog or ledger loading errors, and
/// `NoProviderAvailable` when nothing is eligible.
pub fn execute(ctx: &AppContext, args: &RouteArgs) -> Result<()> {
    let request = build_request(args)?;
    let engine = ctx.engine()?;
    let decision = engine.select_provider(&request, &HashSet::new())?;

    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new("route", &decision)),
        OutputFormat::Human => {
            print!("{}", render_human(&decision, &ctx.theme));
            Ok(())
        }
    }
}

fn render_human(decision: &RoutingDecision, theme: &Theme) -> String {
    let mut lines = vec![vec![
        Segment::styled("Route: ".to_string(), theme.header.clone()),
        Segment::styled(decision.primary.to_string(), theme.accent.clone()),
        Segment::plain(format!(
            "  (step: {}, est. {}{})",
            decision.cascade_step.as_str(),
            format_credits(decision.estimated_cost()),
            if decision.is_byok() { ", byok" } else { "" },
        )),
    ]];

    if decision.fallbacks.is_empty() {
        lines.push(vec![
            Segment::styled("Fallbacks: ".to_string(), theme.header.clone()),
            Segment::styled("none".to_string(), theme.muted.clone()),
        ]);
    } else {
        lines.push(vec![Segment::styled("Fallbacks:".to_string(), theme.header.clone())]);
        for (i, target) in decision.fallbacks.iter().enumerate() {
            lines.push(vec![
                Segment::plain(format!("  {}. {target}", i + 1)),
                Segment::styled(
                    format!("  (est. {})", format_credits(target.estimated_cost)),
                    theme.muted.clone(),
                ),
            ]);
        }
    }

    lines.push(vec![
        Segment::styled("Why: ".to_string(), theme.header.clone()),
        Segment::plain(decision.justification.clone()),
    ]);
    if decision.cache_hit {
        lines.push(vec![Segment::styled("(cached route)".to_string(), theme.muted.clone())]);
    }

    panel("Routing decision", lines, theme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;
    use rust_decimal_macros::dec;

    fn route_args(extra: &[&str]) -> RouteArgs {
        let mut argv = vec!["llmroute", "route", "--account", "acct"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Some(Commands::Route(args)) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn request_reflects_flags() {
        let request = build_request(&route_args(&[
            "--task", "code", "--tier", "pro", "--credits", "2.5", "--power", "eco", "--privacy",
            "--byok", "openai",
        ]))
        .unwrap();
        assert_eq!(request.task_type, TaskType::Code);
        assert_eq!(request.tier, Tier::Pro);
        assert_eq!(request.credits_remaining, dec!(2.5));
        assert_eq!(request.power_level, PowerLevel::Eco);
        assert!(request.privacy_required);
        assert_eq!(request.byok_providers, vec!["openai".to_string()]);
    }

    #[test]
    fn bad_dimension_is_a_config_error() {
        let err = build_request(&route_args(&["--latency", "warp"])).unwrap_err();
        assert!(err.to_string().contains("latency"));
    }

    #[test]
    fn human_output_lists_fallbacks() {
        let engine = crate::test_utils::make_test_engine(crate::core::catalog::builtin_providers());
        let request = build_request(&route_args(&["--tier", "pro", "--credits", "10"])).unwrap();
        let decision = engine.select_provider(&request, &HashSet::new()).unwrap();
        let text = render_human(&decision, &Theme::plain());
        assert!(text.contains("Routing decision"));
        assert!(text.contains("Route: "));
        assert!(text.contains("Fallbacks:"));
        assert!(text.contains("Why: "));
    }
}
