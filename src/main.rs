use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use content_model::{ContentResolution, ScheduleKind, find_conflicts, statistics};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use signage_scheduler::config::Configuration;
use signage_scheduler::platform::display_surface::CommandDisplay;
use signage_scheduler::providers::{
    CatalogContentProvider, CollaboratorSet, FileDeviceStatusProvider, HttpConnectivityProbe,
};
use signage_scheduler::selector;
use signage_scheduler::SchedulerRegistry;

#[derive(Debug, Parser)]
#[command(
    name = "signage-scheduler",
    version,
    about = "unattended signage content scheduler"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Print what every configured screen would show right now and exit
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Deterministic RNG seed for Default pool draws (overrides selection-seed)
    #[arg(long = "selection-seed", value_name = "SEED")]
    selection_seed: Option<u64>,
    /// Evaluate the dry run at this RFC 3339 instant instead of now
    #[arg(long = "now", value_name = "RFC3339")]
    now: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        dry_run,
        selection_seed,
        now,
    } = Args::parse();

    let now_override = match now {
        Some(ts) => Some(
            DateTime::parse_from_rfc3339(&ts)
                .context("failed to parse --now")?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );
    let seed = selection_seed.or(cfg.selection_seed);

    if dry_run {
        return run_dry_run(&cfg, now_override.unwrap_or_else(Utc::now), seed).await;
    }

    let display = Arc::new(CommandDisplay::new(cfg.display.plan()).context("invalid display command")?);
    let collaborators = CollaboratorSet {
        connectivity: Some(Arc::new(
            HttpConnectivityProbe::new(cfg.connectivity.url.clone(), cfg.connectivity.timeout)
                .context("failed to build connectivity probe")?,
        )),
        device_status: Some(Arc::new(FileDeviceStatusProvider::new(
            cfg.device_status_path.clone(),
        ))),
        content: Some(Arc::new(CatalogContentProvider::new(cfg.catalog_path.clone()))),
        display: Some(display.clone()),
    };
    let registry = SchedulerRegistry::new(collaborators)
        .with_notices(cfg.notice_pages())
        .with_selection_seed(seed);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    if cfg.screens.is_empty() {
        tracing::warn!("no screens configured; waiting for shutdown");
    }
    for screen in &cfg.screens {
        let interval = cfg.refresh_interval_for(screen);
        let initial = registry
            .start(&screen.screen_id, interval)
            .await
            .with_context(|| format!("failed to start screen {}", screen.screen_id))?;
        match initial {
            Some(item) => tracing::info!(
                screen_id = %screen.screen_id,
                content_id = item.id,
                title = %item.title,
                "initial content selected"
            ),
            None => tracing::info!(screen_id = %screen.screen_id, "no initial content"),
        }
    }

    cancel.cancelled().await;
    registry.cleanup().await;
    display.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn run_dry_run(cfg: &Configuration, now: DateTime<Utc>, seed: Option<u64>) -> Result<()> {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    let provider = CatalogContentProvider::new(cfg.catalog_path.clone()).with_now(now);
    let catalog = provider.load().await?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    println!(
        "# signage dry run\n# catalog: {}\n# now: {}\n# seed: {}\n",
        provider.path().display(),
        now.to_rfc3339(),
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    if cfg.screens.is_empty() {
        println!("(no screens configured)");
        return Ok(());
    }

    for screen in &cfg.screens {
        let items = catalog.items_for(&screen.screen_id);
        let stats = statistics(&items, now);
        println!(
            "## {} (every {})",
            screen.screen_id,
            humantime::format_duration(cfg.refresh_interval_for(screen))
        );
        println!(
            "  items: {} total, {} live, {} scheduled ({} upcoming), {} default",
            stats.total, stats.live, stats.scheduled, stats.upcoming_scheduled, stats.default
        );

        let resolution = catalog.resolve(&screen.screen_id, now);
        match &resolution {
            None => println!("  resolution: (no content)"),
            Some(ContentResolution::Single(item)) => {
                println!("  resolution: {} #{} {}", item.schedule_kind, item.id, item.title)
            }
            Some(ContentResolution::DefaultPool(pool)) => {
                println!("  resolution: default pool of {}", pool.len());
                for item in pool.items() {
                    println!("    #{} {} ({}m)", item.id, item.title, item.duration_minutes);
                }
            }
        }
        match selector::select(None, resolution, true, now, &mut rng) {
            selector::Selection::Update {
                display_url,
                content,
            } => println!("  would show: #{} {}", content.id, display_url),
            selector::Selection::Unchanged => println!("  would show: (nothing)"),
        }

        for item in items
            .iter()
            .filter(|item| item.schedule_kind == ScheduleKind::Schedule)
        {
            let Some(start) = item.start_time else {
                continue;
            };
            for conflict in find_conflicts(&items, start, item.duration_minutes) {
                // Each overlapping pair is reported once.
                if conflict.id > item.id {
                    println!(
                        "  conflict: #{} {} overlaps #{} {} ({} - {})",
                        item.id,
                        item.title,
                        conflict.id,
                        conflict.title,
                        conflict.start.to_rfc3339(),
                        conflict.end.to_rfc3339()
                    );
                }
            }
        }
        println!();
    }
    Ok(())
}
