use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use fedkit::{
    DeploymentMode, FederationConfig, HttpManifestSource, MountBoundary, MountRequest, MountState,
    Properties, RemoteLoader, UnitCatalog,
};
use fedkit_http::HttpClientBuilder;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// PulseGrid federation host - mounts independently deployed UI units
#[derive(Parser)]
#[command(name = "federation-host")]
#[command(about = "PulseGrid federation host - mounts independently deployed UI units")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment mode override (selects remote locators)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Development,
    Production,
}

impl From<Mode> for DeploymentMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Development => DeploymentMode::Development,
            Mode::Production => DeploymentMode::Production,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a unit, print its placeholder, then its final render or fallback
    Run(MountArgs),
    /// Validate configuration and exit
    Check,
    /// Serve the clinical-flags remote manifest
    ServeRemote {
        /// Port to listen on (loopback only)
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
}

#[derive(clap::Args)]
struct MountArgs {
    /// Remote to mount from
    #[arg(long, default_value = clinical_flags::REMOTE_NAME)]
    remote: String,

    /// Exposed unit to mount
    #[arg(long, default_value = clinical_flags::WIDGET_UNIT)]
    unit: String,

    /// `displayName` property passed to the unit
    #[arg(long)]
    display_name: Option<String>,

    /// `patientId` property passed to the unit
    #[arg(long)]
    patient_id: Option<String>,

    /// `activeFlag` property passed to the unit
    #[arg(long)]
    active_flag: Option<String>,
}

impl MountArgs {
    fn default_target() -> Self {
        Self {
            remote: clinical_flags::REMOTE_NAME.to_owned(),
            unit: clinical_flags::WIDGET_UNIT.to_owned(),
            display_name: None,
            patient_id: None,
            active_flag: None,
        }
    }

    fn properties(&self) -> Properties {
        let mut props = Properties::new().with_callback("onFlagClick", |flag| {
            tracing::info!(%flag, "flag clicked");
            None
        });
        if let Some(name) = &self.display_name {
            props.insert("displayName", name.as_str());
        }
        if let Some(patient) = &self.patient_id {
            props.insert("patientId", patient.as_str());
        }
        if let Some(flag) = &self.active_flag {
            props.insert("activeFlag", flag.as_str());
        }
        props
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config
        && !Path::new(path).is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.to_string_lossy());
    }

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (PULSEGRID__*) -> 4) CLI overrides
    let mut config = FederationConfig::load(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    fedkit::init_logging(&config.logging, cli.verbose)?;
    tracing::info!(host = %config.name, mode = %config.mode, "federation host starting");

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match cli.command.unwrap_or_else(|| Commands::Run(MountArgs::default_target())) {
        Commands::Run(args) => run_mount(&config, &args).await,
        Commands::Check => check_config(&config),
        Commands::ServeRemote { port } => serve_remote(port).await,
    }
}

fn check_config(config: &FederationConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let registry = config.build_registry()?;
    println!("Configuration is valid");
    println!("mode: {}", config.mode);
    for name in registry.remote_names() {
        let remote = registry.lookup_remote(&name)?;
        println!("remote {name} -> {}", remote.locator);
    }
    Ok(())
}

fn build_loader(config: &FederationConfig) -> Result<Arc<RemoteLoader>> {
    let registry = Arc::new(config.build_registry()?);
    let client = HttpClientBuilder::with_config(config.http.client_config(config.mode)).build()?;

    let catalog = UnitCatalog::new();
    clinical_flags::register(&catalog);

    let loader = RemoteLoader::new(
        registry,
        Arc::new(HttpManifestSource::new(client)),
        Arc::new(catalog),
    );
    let outcome = loader.negotiate_host()?;
    tracing::info!(bound = ?outcome.newly_bound, "host shared instances bound");
    Ok(Arc::new(loader))
}

async fn run_mount(config: &FederationConfig, args: &MountArgs) -> Result<()> {
    let loader = build_loader(config)?;
    let boundary = MountBoundary::mount(
        loader,
        MountRequest::new(&args.remote, &args.unit, args.properties()),
    );
    // Current-thread runtime: the load task cannot run before this yields.
    println!("{}", boundary.render());

    let state = tokio::select! {
        state = boundary.settled() => state,
        _ = tokio::signal::ctrl_c() => {
            boundary.unmount();
            anyhow::bail!("interrupted before {} settled", args.unit);
        }
    };

    println!("{}", boundary.render());
    match state {
        MountState::Ready(_) => tracing::info!(mount_id = %boundary.id(), "unit mounted"),
        MountState::Failed(failure) => tracing::warn!(
            mount_id = %boundary.id(),
            kind = %failure.kind(),
            error = %failure.error(),
            "unit unavailable; fallback rendered"
        ),
        MountState::Loading => {}
    }
    Ok(())
}

async fn serve_remote(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!(
        "serving {} at http://{}{}",
        clinical_flags::REMOTE_NAME,
        listener.local_addr()?,
        clinical_flags::api::rest::REMOTE_ENTRY_PATH
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
        }
        shutdown.cancel();
    });

    clinical_flags::api::rest::serve(listener, cancel).await
}
