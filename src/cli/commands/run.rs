use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::str::FromStr;
use std::sync::Arc;
use wayfinder::config::HostConfig;
use wayfinder::host::{HostHandle, HostRuntime, SurfaceId, SurfaceSignal, Transition};
use wayfinder::navigation::{HISTORY, Identity, NavParams, RouteKey};
use wayfinder::screens;

#[derive(Args)]
pub struct RunCommands {
    /// Identity the session navigates as
    #[arg(long, default_value = "anonymous")]
    pub account: String,

    /// Steps to replay: `route?key=value`, `back`, `detach`, `attach` or `destroy`
    #[arg(required = true)]
    pub steps: Vec<String>,
}

/// One scripted step of a session
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Navigate { route: RouteKey, params: NavParams },
    Back,
    Detach,
    Attach,
    Destroy,
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let step = match raw.trim() {
            "" => anyhow::bail!("Empty step"),
            "back" => Step::Back,
            "detach" => Step::Detach,
            "attach" => Step::Attach,
            "destroy" => Step::Destroy,
            other => {
                let (route, query) = other.split_once('?').unwrap_or((other, ""));
                let params = NavParams::from_query(query)
                    .with_context(|| format!("Invalid parameters in step '{}'", raw))?;
                Step::Navigate {
                    route: RouteKey::new(route),
                    params,
                }
            }
        };
        Ok(step)
    }
}

pub async fn handle_run_command(args: RunCommands, config: &HostConfig) -> Result<()> {
    let steps = args
        .steps
        .iter()
        .map(|raw| raw.parse::<Step>())
        .collect::<Result<Vec<_>>>()?;

    let builder = screens::bootstrap(config).context("Failed to bootstrap services")?;
    let directory = Arc::clone(builder.directory());
    let runtime = HostRuntime::spawn(builder).context("Failed to start screen host")?;
    let handle = runtime.handle();
    let identity = Identity::new(args.account);

    let mut surface = SurfaceId::new();
    handle.signal(SurfaceSignal::Attach(surface))?.wait().await?;
    print_current(&handle, "start");

    for (index, step) in steps.into_iter().enumerate() {
        let label = format!("{}", index + 1);
        match step {
            Step::Navigate { route, params } => {
                match handle.navigate(route.clone(), &params, &identity) {
                    Ok(pending) => report(pending.wait().await),
                    Err(err) => println!("  {} {}: {}", "rejected".red(), route, err),
                }
            }
            Step::Back => report(handle.back(&identity)?.wait().await),
            Step::Detach => {
                handle.signal(SurfaceSignal::Detach(surface))?.wait().await?;
            }
            Step::Attach => {
                let restored = handle.signal(SurfaceSignal::Attach(surface))?.wait().await?;
                if let Some(transition) = restored {
                    report(Ok(transition));
                }
            }
            Step::Destroy => {
                handle.signal(SurfaceSignal::Destroy(surface))?.wait().await?;
                // The framework hands out a new surface after a destroy
                surface = SurfaceId::new();
            }
        }
        print_current(&handle, &label);
    }

    runtime.shutdown();

    let history = directory.get(HISTORY)?;
    println!();
    println!("{} [{}]", "History".bold(), identity);
    for entry in history.entries(&identity) {
        println!(
            "  #{:<3} {} {}",
            entry.order,
            entry.visited_at.format("%H:%M:%S%.3f").to_string().dimmed(),
            entry.destination
        );
    }

    drop(handle);
    match Arc::try_unwrap(directory) {
        Ok(directory) => directory.teardown(),
        Err(_) => log::warn!("Service directory still shared at exit; skipping teardown"),
    }
    Ok(())
}

fn report(outcome: wayfinder::Result<Transition>) {
    match outcome {
        Ok(transition) if transition.fell_back() => {
            let reason = transition.fallback.map(|err| err.to_string()).unwrap_or_default();
            println!("  {} {} ({})", "fell back to".yellow(), transition.destination, reason);
        }
        Ok(transition) if !transition.attached => {
            println!("  {} {}", "deferred".yellow(), transition.destination);
        }
        Ok(transition) => println!("  {} {}", "->".green(), transition.destination),
        Err(err) => println!("  {} {}", "failed".red(), err),
    }
}

fn print_current(handle: &HostHandle, label: &str) {
    match handle.current() {
        Some(snapshot) => println!(
            "[{}] {} {} (#{}, {})",
            label.bold(),
            snapshot.title.cyan(),
            snapshot.destination,
            snapshot.generation,
            snapshot.identity
        ),
        None => println!("[{}] {}", label.bold(), "no screen attached".dimmed()),
    }
}
