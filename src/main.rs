// Delta bundler core - CLI entry point.
// Thin wrapper: parses args, wires the library's components together,
// drives one build or a watch session.

use bramble::cache::Cache;
use bramble::config::Config;
use bramble::core::models::ModuleType;
use bramble::core::traits::{Reporter, TracingReporter};
use bramble::delta::DeltaCalculator;
use bramble::graph::DependencyGraph;
use bramble::id_allocator::IdAllocator;
use bramble::resolver::Resolver;
use bramble::serializers::{delta_response, file_ram, plain, ram_bundle};
use bramble::session::Session;
use bramble::utils::{BundlerError, Logger, Result};
use bramble::watch::NotifyWatcher;
use bramble::worker_pool::WorkerPool;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Plain,
    IndexedRam,
    FileRam,
}

#[derive(Parser)]
#[command(name = "bramble")]
#[command(about = "Delta bundler core: incremental dependency graph, transform cache, bundle serializers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single build and emit one bundle artifact.
    Build {
        /// Project root (defaults to the current directory).
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Entry source file(s), relative to root or absolute.
        #[arg(short, long, required = true)]
        entry: Vec<String>,
        /// Target platform (must be one of config's `platforms`).
        #[arg(short, long, default_value = "web")]
        platform: String,
        /// Bundle format to emit.
        #[arg(short, long, value_enum, default_value = "plain")]
        format: FormatArg,
        /// Output path: a file for plain/indexed-ram, a directory for file-ram.
        #[arg(short, long, default_value = "bundle.js")]
        out: String,
        /// Development transform (unminified, hot-reload scaffolding kept).
        #[arg(long)]
        dev: bool,
        /// Minify (forwarded to the transform options; minification itself
        /// stays an external pass over the serializer's output, spec.md §1).
        #[arg(long)]
        minify: bool,
        /// External URL to reference in the plain bundle's
        /// `//# sourceMappingURL=` trailer.
        #[arg(long)]
        source_map_url: Option<String>,
        /// Inline the source map as a base64 data URL instead.
        #[arg(long)]
        inline_source_map: bool,
    },
    /// Start a long-lived delta session, printing each delta as JSON.
    Watch {
        #[arg(short, long, default_value = ".")]
        root: String,
        #[arg(short, long, required = true)]
        entry: Vec<String>,
        #[arg(short, long, default_value = "web")]
        platform: String,
    },
}

fn transform_options(platform: &str, dev: bool, minify: bool) -> bramble::core::traits::TransformOptions {
    bramble::core::traits::TransformOptions {
        platform: platform.to_string(),
        dev,
        minify,
        hot: false,
    }
}

async fn build_session(
    root: &str,
    entries: &[String],
    platform: &str,
    dev: bool,
    minify: bool,
) -> Result<Session> {
    let root = PathBuf::from(root);
    let mut config = Config::load(&root)?;
    if !config.platforms.iter().any(|p| p == platform) {
        config.platforms.push(platform.to_string());
    }
    if config.reset_cache {
        Cache::new(config.cache_dir(), u64::MAX)?.clear()?;
    }

    let resolver = Resolver::new(config.clone());
    let cache = Arc::new(Cache::new(config.cache_dir(), 512 * 1024 * 1024)?);
    let worker_pool = Arc::new(WorkerPool::new(
        cache,
        config.max_workers,
        config.transformer_key.clone(),
    ));
    let allocator = IdAllocator::new();
    let options = transform_options(platform, dev, minify);

    let graph = DependencyGraph::new(resolver, worker_pool, allocator, options, platform.to_string())?;

    let entry_points: Vec<(PathBuf, ModuleType)> = entries
        .iter()
        .map(|e| {
            let path = PathBuf::from(e);
            let absolute = if path.is_absolute() { path } else { config.project_roots[0].join(path) };
            (absolute, ModuleType::Module)
        })
        .collect();

    let calculator = DeltaCalculator::new(graph, entry_points);
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);
    Logger::session_start(&root.display().to_string(), entries.len());
    Ok(Session::new(calculator, reporter))
}

#[allow(clippy::too_many_arguments)]
async fn run_build(
    root: String,
    entry: Vec<String>,
    platform: String,
    format: FormatArg,
    out: String,
    dev: bool,
    minify: bool,
    source_map_url: Option<String>,
    inline_source_map: bool,
) -> Result<()> {
    let session = build_session(&root, &entry, &platform, dev, minify).await?;
    session.get_delta(false).await?;
    let (graph, allocator) = session.snapshot().await;
    session.end();

    match format {
        FormatArg::Plain => {
            let bundle = plain::serialize(&graph, &allocator, source_map_url.as_deref(), inline_source_map)?;
            tokio::fs::write(&out, &bundle.code).await?;
            if !inline_source_map {
                tokio::fs::write(format!("{out}.map"), &bundle.map).await?;
            }
        }
        FormatArg::IndexedRam => {
            let bytes = ram_bundle::serialize(&graph, &allocator)?;
            tokio::fs::write(&out, bytes).await?;
        }
        FormatArg::FileRam => {
            file_ram::write(std::path::Path::new(&out), &graph, &allocator).await?;
        }
    }

    Logger::info(&format!("bundle written to {out}"));
    Ok(())
}

async fn run_watch(root: String, entry: Vec<String>, platform: String) -> Result<()> {
    let session = Arc::new(build_session(&root, &entry, &platform, true, false).await?);
    let (epoch, delta) = session.get_delta(false).await?;
    print_delta(&epoch, &delta, &session).await?;

    let roots = Config::load(&PathBuf::from(&root))?.project_roots.clone();
    let watcher = NotifyWatcher::new(&roots)?;

    let driver_session = session.clone();
    session
        .drive_watcher(watcher, move |epoch, delta| {
            let session = driver_session.clone();
            async move {
                if let Err(e) = print_delta(&epoch, &delta, &session).await {
                    Logger::error(&format!("failed to serialize delta: {e}"));
                }
            }
        })
        .await
}

async fn print_delta(epoch: &str, delta: &bramble::core::models::Delta, session: &Session) -> Result<()> {
    let (_graph, allocator) = session.snapshot().await;
    let response = delta_response::serialize(epoch, delta, &allocator)?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    Logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            root,
            entry,
            platform,
            format,
            out,
            dev,
            minify,
            source_map_url,
            inline_source_map,
        } => run_build(root, entry, platform, format, out, dev, minify, source_map_url, inline_source_map).await,
        Commands::Watch { root, entry, platform } => run_watch(root, entry, platform).await,
    };

    if let Err(e) = result {
        match &e {
            BundlerError::Transform(_) | BundlerError::Unresolved(_) => {
                eprintln!("{}", e.format_detailed());
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
