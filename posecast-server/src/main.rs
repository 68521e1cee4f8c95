use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use posecast_config::{Config, ConfigLoad, ConfigLoader};
use posecast_core::{DefaultSourceOpener, ModelDirFactory, RedisBlobStore};
use posecast_model::Resolution;
use posecast_server::{
    PoseService,
    batch::{self, BatchOptions},
    transport::RedisBus,
};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "posecast-server")]
#[command(about = "Pose estimation streaming service controlled over pub/sub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(long, env = "POSECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL used for pub/sub and the blob cache (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Service name; also the command channel (overrides config)
    #[arg(long, env = "POSECAST_SERVICE_NAME")]
    service_name: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Estimate poses for folders of images and write them to a CSV file
    Batch(BatchArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct BatchArgs {
    /// Input folders; every jpg/png inside is processed
    #[arg(long = "folder", num_args = 1.., default_value = "./images/")]
    folders: Vec<PathBuf>,

    #[arg(long, default_value = "./pose-coordinates.csv")]
    out: PathBuf,

    /// cmu / mobilenet_thin / mobilenet_v2_large / mobilenet_v2_small
    #[arg(long, default_value = "cmu")]
    model: String,

    /// Network input resolution
    #[arg(long, default_value = "432x368")]
    resolution: Resolution,

    /// Humans with fewer detected parts are not written
    #[arg(long, default_value_t = batch::DEFAULT_MIN_PARTS)]
    min_parts: usize,

    #[arg(long, default_value_t = batch::DEFAULT_UPSAMPLE)]
    resize_out_ratio: f32,

    /// Directory holding `<model>.onnx` files (overrides config)
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_runtime_config(&cli.serve)?;

    if let Some(command) = cli.command {
        match command {
            Command::Batch(args) => {
                run_batch(config, args).await?;
                return Ok(());
            }
        }
    }

    run_server(config).await
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config.clone() {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(url) = args.redis_url.clone() {
        config.redis.url = url;
    }
    if let Some(name) = args.service_name.clone() {
        config.service.name = name;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,posecast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    Ok(config)
}

async fn run_batch(config: Config, args: BatchArgs) -> anyhow::Result<()> {
    let models_dir = args.models_dir.unwrap_or(config.models.dir);
    let options = BatchOptions {
        folders: args.folders,
        out: args.out,
        model: args.model,
        resolution: args.resolution,
        min_parts: args.min_parts,
        upsample: args.resize_out_ratio,
    };

    let summary = tokio::task::spawn_blocking(move || {
        batch::run_batch(&options, &ModelDirFactory::new(models_dir))
    })
    .await
    .context("batch task failed")??;

    info!(
        images = summary.images,
        detected = summary.detected,
        matched = summary.matched,
        rows = summary.rows,
        "batch complete"
    );
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        service = %config.service.name,
        redis = %config.redis.url,
        blob_ttl = ?config.stream.blob_ttl,
        conflict_policy = %config.stream.conflict_policy,
        models_dir = %config.models.dir.display(),
        "starting posecast server"
    );

    let bus = RedisBus::connect(&config.redis.url)
        .await
        .context("failed to connect to Redis pub/sub")?;
    let blobs = RedisBlobStore::connect(&config.redis.url)
        .await
        .context("failed to connect to the Redis blob cache")?;

    let service = PoseService::new(
        &config,
        Arc::new(bus),
        Arc::new(blobs),
        Arc::new(DefaultSourceOpener),
        Arc::new(ModelDirFactory::new(config.models.dir.clone())),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        signal.cancel();
    });

    service
        .run(shutdown)
        .await
        .context("pose service stopped with an error")?;
    info!("posecast server stopped");
    Ok(())
}
