use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use wayfinder::config::HostConfig;
use wayfinder::screens;

#[derive(Args)]
pub struct RoutesCommands {
    /// Also resolve a route key and show the destination it maps to
    #[arg(long)]
    pub resolve: Option<String>,
}

pub fn handle_routes_command(args: RoutesCommands, config: &HostConfig) -> Result<()> {
    let graph = screens::build_graph(config).context("Failed to build route table")?;

    println!("{}", "Routes".bold());
    for route in graph.routes() {
        let marker = if &route.key == graph.default_route() {
            " (default)".green().to_string()
        } else {
            String::new()
        };
        println!("  {}{}", route.key.as_str().cyan(), marker);
        for pattern in &route.patterns {
            println!("    {} {}", "pattern".dimmed(), pattern);
        }
        if !route.required.is_empty() {
            println!("    {} {}", "requires".dimmed(), route.required.join(", "));
        }
    }

    let aliases = graph.aliases();
    if !aliases.is_empty() {
        println!();
        println!("{}", "Aliases".bold());
        for (from, to) in aliases {
            println!("  {} -> {}", from.as_str().cyan(), to);
        }
    }

    if let Some(raw) = args.resolve {
        let step: super::Step = raw.parse()?;
        let super::Step::Navigate { route, params } = step else {
            anyhow::bail!("'{}' is not a route", raw);
        };

        println!();
        match graph.resolve(&route, &params) {
            Ok(destination) => println!(
                "{} {}",
                "Resolves to".bold(),
                destination.to_string().green()
            ),
            Err(err) => println!("{} {}", "Does not resolve:".bold(), err.to_string().red()),
        }
    }

    Ok(())
}
