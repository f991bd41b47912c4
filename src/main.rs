use chat_gateway::config::load_env_layers;
use chat_gateway::{build_router, AppState, Backend, GatewayConfig, InstancePreset, SharedJournal};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-gateway",
    about = "Chat-completion gateway speaking the Anthropic and OpenAI wire formats",
    version
)]
struct Cli {
    /// Built-in instance to run (see --list-instances)
    #[arg(short, long, conflicts_with = "config")]
    instance: Option<String>,

    /// Path to an instance description (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides instance and environment)
    #[arg(short, long)]
    port: Option<u16>,

    /// Default model (overrides instance and environment)
    #[arg(long)]
    model: Option<String>,

    /// Directory holding the instance-local .env; its parent holds the shared one
    #[arg(long, default_value = ".")]
    env_dir: PathBuf,

    /// Request journal path (JSONL)
    #[arg(long, default_value = "chat-gateway.jsonl")]
    log_file: PathBuf,

    /// Print the built-in instances and exit
    #[arg(long)]
    list_instances: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.list_instances {
        println!("Built-in instances:");
        for preset in InstancePreset::all() {
            println!(
                "  {:<10} {:?}  port {:<5} model {:<32} {}",
                preset.name, preset.mode, preset.port, preset.model, preset.purpose
            );
        }
        return Ok(());
    }

    for path in load_env_layers(&cli.env_dir) {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = match (cli.instance.as_deref(), cli.config.as_deref()) {
        (Some(name), _) => match InstancePreset::from_name(name) {
            Some(preset) => preset.to_config(),
            None => anyhow::bail!("Unknown instance '{name}'. Use --list-instances to see them."),
        },
        (None, Some(path)) => GatewayConfig::load(path)?,
        (None, None) => anyhow::bail!("Either --instance or --config is required"),
    };

    let mut config = config.with_env_overrides(|name| std::env::var(name).ok())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    let client = reqwest::Client::builder().build()?;

    let backend = match Backend::from_config(&config, client, |name| std::env::var(name).ok()) {
        Ok(backend) => backend,
        Err(e) => {
            error!(instance = %config.instance, error = %e, "Cannot start gateway");
            std::process::exit(1);
        }
    };
    let api_key_configured = matches!(backend, Backend::Remote(_));

    let journal = SharedJournal::open(&cli.log_file)?;
    journal.compact()?;

    info!("  Instance:  {}", config.instance);
    info!("  Mode:      {}", config.mode_name());
    info!("  Model:     {}", config.model);
    info!("  Port:      {}", config.port);
    if let Some(ref purpose) = config.purpose {
        info!("  Purpose:   {}", purpose);
    }
    info!("  Images:    {}", config.image_output());
    info!("  Journal:   {}", cli.log_file.display());

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        backend,
        journal,
        api_key_configured,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
