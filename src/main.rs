// src/main.rs

use anyhow::{Context as _, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use varkeep::activation::{ActivationReport, PackageState, RecoveryOutcome, SessionLock};
use varkeep::cache::{CachedLookup, DirectorySnapshot, ScanCache};
use varkeep::config::{Config, VamLayout};
use varkeep::packages::name::ARCHIVE_EXTENSION;
use varkeep::packages::{Scanner, list_packages};
use varkeep::resolver::{self, DependencyStatus, Resolution, Universe};
use varkeep::session::Session;

#[derive(Parser)]
#[command(name = "varkeep")]
#[command(author, version, about = "Keep only the VaM packages your scenes need", long_about = None)]
struct Cli {
    /// VaM install directory (defaults to `vam_dir` from the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <config dir>/varkeep/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan packages and refresh the cache
    Scan {
        /// Ignore the cache and rescan every package
        #[arg(long)]
        rescan: bool,
    },
    /// List scenes found in packages and in Saves/scene
    Scenes {
        /// Only scenes from this package
        #[arg(short, long)]
        package: Option<String>,
        /// Flag scenes that only feature female looks
        #[arg(long)]
        looks: bool,
    },
    /// Show how a package's dependencies resolve
    Deps {
        /// Package filename
        package: String,
    },
    /// Compute which packages to keep (defaults to every scene package)
    Resolve {
        /// Seed packages
        seeds: Vec<String>,
        /// Also list unused packages
        #[arg(long)]
        unused: bool,
    },
    /// Start a session: disable every package the seeds do not need
    Disable {
        /// Seed packages (defaults to every scene package)
        seeds: Vec<String>,
    },
    /// Move an active session to a new seed set
    Reconcile {
        /// Seed packages (defaults to every scene package)
        seeds: Vec<String>,
    },
    /// Restore every disabled package and end the session
    Restore,
    /// Show package and session state
    Status,
    /// Recover from an interrupted run
    Recover,
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct Context {
    config: Config,
    layout: VamLayout,
    json: bool,
}

impl Context {
    fn new(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        let root = cli
            .root
            .clone()
            .or_else(|| config.vam_dir.clone())
            .ok_or_else(|| anyhow!("No VaM directory: pass --root or set vam_dir in the config"))?;

        let layout = VamLayout::new(root);
        layout.validate()?;

        Ok(Self {
            config,
            layout,
            json: cli.json,
        })
    }

    fn scanner(&self) -> Scanner {
        Scanner::new(self.config.scan_options())
    }

    /// Load the cache, refreshing and saving it when the directory changed
    fn cache(&self, force: bool) -> Result<ScanCache> {
        let snapshot = DirectorySnapshot::capture(
            &self.layout.addon_dir,
            self.layout.saves_scene_dir(),
            self.config.scan.include_hidden,
        )?;

        let cached = if force {
            None
        } else {
            ScanCache::load(&self.config.cache_path())
        };

        let base = match cached {
            Some(cache) if cache.is_current(&snapshot) => {
                info!("Cache is current ({} packages)", cache.packages.len());
                return Ok(cache);
            }
            Some(cache) => cache,
            None => ScanCache::new(&self.layout.addon_dir),
        };

        let previews = self
            .config
            .scan
            .previews
            .then(|| self.config.preview_store());
        let (cache, stats) = base.refresh(
            &snapshot,
            &self.scanner(),
            previews.as_ref(),
            self.config.scan.max_threads,
        );
        cache
            .save(&self.config.cache_path())
            .with_context(|| format!("Failed to save cache to {}", self.config.cache_path().display()))?;

        info!(
            "Scanned {} packages, reused {}, {} loose scenes",
            stats.scanned, stats.reused, stats.loose
        );
        Ok(cache)
    }

    /// Resolve the keep set for explicit seeds, or every scene package
    fn resolve(&self, cache: &ScanCache, seeds: &[String]) -> Result<Resolution> {
        let universe = Universe::from_directory(&self.layout.addon_dir)?;
        let seeds: Vec<String> = if seeds.is_empty() {
            resolver::seeds_from_scenes(cache.scenes()).into_iter().collect()
        } else {
            seeds.iter().map(|s| package_filename(s)).collect()
        };

        for seed in &seeds {
            if !universe.contains(seed) {
                warn!("Seed {} is not in {}", seed, self.layout.addon_dir.display());
            }
        }

        let scanner = self.scanner();
        let mut lookup = CachedLookup::new(cache, &scanner, &self.layout.addon_dir);
        let resolution = resolver::resolve(
            seeds.iter().map(String::as_str),
            &universe,
            &mut lookup,
            &self.config.resolve.protected_markers,
        );
        debug!("Resolution scanned {} uncached packages", lookup.misses());
        Ok(resolution)
    }

    fn open_session(&self) -> Result<Session> {
        let session = Session::open(self.layout.engine(), &self.layout.lock_path)?;
        if let Some(outcome) = session.recovered() {
            self.print_recovery(outcome)?;
        }
        Ok(session)
    }

    fn print_report(&self, action: &str, report: &ActivationReport) -> Result<()> {
        if self.json {
            return print_json(report);
        }

        let (disabled, restored) = report.counts();
        println!("{}: {} disabled, {} restored", action, disabled, restored);
        for name in &report.skipped {
            println!("  [SKIP] {} (destination exists)", name);
        }
        for name in &report.dropped {
            println!("  [GONE] {}", name);
        }
        for failure in &report.failures {
            println!("  [FAILED] {}: {}", failure.name, failure.reason);
        }
        if !report.is_clean() {
            println!("Some renames failed; run the command again to retry them");
        }
        Ok(())
    }

    fn print_recovery(&self, outcome: &RecoveryOutcome) -> Result<()> {
        if self.json {
            return print_json(outcome);
        }

        println!(
            "Recovered interrupted {} pass: {} adopted, {} released",
            outcome
                .op
                .map(|op| format!("{:?}", op).to_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
            outcome.adopted.len(),
            outcome.released.len()
        );
        if let Some(report) = &outcome.rolled_forward {
            self.print_report("Finished restore", report)?;
        }
        Ok(())
    }
}

/// Accept package names with or without the archive extension
fn package_filename(name: &str) -> String {
    if name.ends_with(ARCHIVE_EXTENSION) {
        name.to_string()
    } else {
        format!("{}{}", name, ARCHIVE_EXTENSION)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_scan(ctx: &Context, rescan: bool) -> Result<()> {
    let cache = ctx.cache(rescan)?;
    let scenes = cache.scenes();
    let packaged = scenes.iter().filter(|s| s.package().is_some()).count();

    println!("Packages scanned: {}", cache.packages.len());
    println!("Packages with scenes: {}", cache.packages.values().filter(|r| r.has_scenes()).count());
    println!("Scenes: {} packaged, {} loose", packaged, scenes.len() - packaged);
    Ok(())
}

fn cmd_scenes(ctx: &Context, package: Option<&str>, looks: bool) -> Result<()> {
    let mut cache = ctx.cache(false)?;
    let package = package.map(package_filename);

    let selected: Vec<(String, Option<String>, Option<String>)> = cache
        .scenes()
        .into_iter()
        .filter(|scene| package.is_none() || scene.package() == package.as_deref())
        .map(|scene| {
            (
                scene.scene_name.clone(),
                scene.package().map(str::to_string),
                scene.preview_file.clone(),
            )
        })
        .collect();

    let mut looks_changed = false;
    for (scene_name, owner, preview) in &selected {
        let flag = match (looks, owner) {
            (true, Some(pkg)) => {
                let known = cache.looks(pkg, scene_name);
                let value = known.unwrap_or_else(|| {
                    Scanner::detect_looks(&ctx.layout.addon_dir.join(pkg), scene_name)
                });
                if known.is_none() {
                    cache.set_looks(pkg, scene_name, value);
                    looks_changed = true;
                }
                if value { " [looks]" } else { "" }
            }
            _ => "",
        };

        let preview = if preview.is_some() { " [preview]" } else { "" };
        match owner {
            Some(pkg) => println!("{}  ({}){}{}", scene_name, pkg, preview, flag),
            None => println!("{}  (Saves/scene)", scene_name),
        }
    }

    if looks_changed {
        cache.save(&ctx.config.cache_path())?;
    }
    println!("{} scenes", selected.len());
    Ok(())
}

fn cmd_deps(ctx: &Context, package: &str) -> Result<()> {
    let cache = ctx.cache(false)?;
    let name = package_filename(package);
    let universe = Universe::from_directory(&ctx.layout.addon_dir)?;
    if !universe.contains(&name) {
        return Err(varkeep::Error::NotFound(format!("package {}", name)).into());
    }

    let record = match cache.get(&name) {
        Some(record) => record.clone(),
        None => ctx.scanner().scan(&ctx.layout.addon_dir.join(&name)),
    };
    let report = resolver::dependency_report(record.dependencies.as_slice(), &universe);

    if ctx.json {
        return print_json(&report);
    }

    println!("{} declares {} dependencies", name, record.dependencies.len());
    for line in &report.lines {
        match &line.status {
            DependencyStatus::Present { chosen, matches } if *matches > 1 => {
                println!("  [OK] {} -> {} (+{} more)", line.token, chosen, matches - 1)
            }
            DependencyStatus::Present { chosen, .. } => println!("  [OK] {} -> {}", line.token, chosen),
            DependencyStatus::Missing => println!("  [MISSING] {}", line.token),
        }
    }
    println!("{} present, {} missing", report.present, report.missing);
    Ok(())
}

fn cmd_resolve(ctx: &Context, seeds: &[String], show_unused: bool) -> Result<()> {
    let cache = ctx.cache(false)?;
    let resolution = ctx.resolve(&cache, seeds)?;

    println!("Keep: {} packages", resolution.keep.len());
    for name in resolution.keep.iter() {
        println!("  {}", name);
    }
    println!("Unused: {} packages", resolution.unused.len());
    if show_unused {
        for name in &resolution.unused {
            println!("  {}", name);
        }
    }
    if !resolution.missing.is_empty() {
        println!("Missing dependencies: {}", resolution.missing.len());
        for token in &resolution.missing {
            println!("  {}", token);
        }
    }
    Ok(())
}

fn cmd_disable(ctx: &Context, seeds: &[String]) -> Result<()> {
    let mut session = ctx.open_session()?;
    let cache = ctx.cache(false)?;
    let resolution = ctx.resolve(&cache, seeds)?;
    if resolution.keep.is_empty() {
        return Err(anyhow!("Nothing to keep; refusing to disable every package"));
    }

    let report = session.start(&resolution.keep)?;
    ctx.print_report("Session started", &report)?;
    println!("Run `varkeep restore` to bring everything back");
    Ok(())
}

fn cmd_reconcile(ctx: &Context, seeds: &[String]) -> Result<()> {
    let mut session = ctx.open_session()?;
    let cache = ctx.cache(false)?;
    let resolution = ctx.resolve(&cache, seeds)?;

    let report = session.reconcile(&resolution.keep)?;
    ctx.print_report("Reconciled", &report)
}

fn cmd_restore(ctx: &Context) -> Result<()> {
    let mut session = ctx.open_session()?;
    if !session.state().is_active() {
        println!("No active session");
        return Ok(());
    }

    let report = session.end()?;
    ctx.print_report("Restored", &report)
}

fn cmd_status(ctx: &Context) -> Result<()> {
    let packages = list_packages(&ctx.layout.addon_dir)?;
    let enabled = packages.iter().filter(|p| p.state == PackageState::Enabled).count();
    let shadowed = packages.iter().filter(|p| p.shadowed).count();

    println!("VaM directory: {}", ctx.layout.root.display());
    println!("Packages: {} ({} enabled, {} disabled)", packages.len(), enabled, packages.len() - enabled);
    if shadowed > 0 {
        println!("  {} packages exist in both forms", shadowed);
    }

    let engine = ctx.layout.engine();
    match engine.manifest()? {
        Some(manifest) => {
            println!("Session: active ({} packages disabled by varkeep)", manifest.len());
            if let Some(saved_at) = manifest.saved_at {
                println!("  Last updated: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            for name in engine.inconsistencies(&manifest) {
                println!("  [STALE] {}", name);
            }
        }
        None => println!("Session: none"),
    }

    if SessionLock::is_held(&ctx.layout.lock_path) {
        println!("Another varkeep process holds the session lock");
    }
    if engine.needs_recovery() {
        println!("An interrupted run needs recovery: run `varkeep recover`");
    }
    Ok(())
}

fn cmd_recover(ctx: &Context) -> Result<()> {
    let session = ctx.open_session()?;
    if session.recovered().is_none() {
        println!("Nothing to recover");
    }
    Ok(())
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "varkeep", &mut std::io::stdout());
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return Ok(());
    }

    let ctx = Context::new(&cli)?;
    match &cli.command {
        Commands::Scan { rescan } => cmd_scan(&ctx, *rescan),
        Commands::Scenes { package, looks } => cmd_scenes(&ctx, package.as_deref(), *looks),
        Commands::Deps { package } => cmd_deps(&ctx, package),
        Commands::Resolve { seeds, unused } => cmd_resolve(&ctx, seeds, *unused),
        Commands::Disable { seeds } => cmd_disable(&ctx, seeds),
        Commands::Reconcile { seeds } => cmd_reconcile(&ctx, seeds),
        Commands::Restore => cmd_restore(&ctx),
        Commands::Status => cmd_status(&ctx),
        Commands::Recover => cmd_recover(&ctx),
        Commands::Completions { .. } => Ok(()),
    }
}

