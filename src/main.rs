//! PostOffice binary entry point.
//!
//! Usage: postoffice [--config <path>] [--bind <ip>] [--port <port>] [-P]

use std::io::IsTerminal;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use postoffice::config::{self, ConfigError, PostOfficeConfig};
use postoffice::lifecycle::signals::wait_for_termination;
use postoffice::observability::{init_logging, metrics};
use postoffice::payload::Passphrase;
use postoffice::{Collaborators, Listener, PostOfficeServer, Shutdown};

/// A one way telegram machine!
#[derive(Parser, Debug)]
#[command(name = "postoffice")]
#[command(about = "A one way telegram machine: receive, store and print short messages")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "POSTOFFICE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on. Use 0.0.0.0 to accept non-local senders.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Don't send files to the printer.
    #[arg(short = 'P', long = "no-printer")]
    no_printer: bool,

    /// File whose first line is the GnuPG passphrase.
    #[arg(long, env = "POSTOFFICE_PASSPHRASE_FILE")]
    passphrase_file: Option<PathBuf>,

    /// GnuPG passphrase.
    #[arg(long, env = "POSTOFFICE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply_overrides(&self, config: &mut PostOfficeConfig) -> Result<(), ConfigError> {
        if self.bind.is_some() || self.port.is_some() {
            let current: SocketAddr = config
                .listener
                .bind_address
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 7878)));
            let ip = self.bind.unwrap_or(current.ip());
            let port = self.port.unwrap_or(current.port());
            config.listener.bind_address = SocketAddr::new(ip, port).to_string();
        }
        if self.no_printer {
            config.sink.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        config::validate_config(config).map_err(ConfigError::Validation)
    }

    fn passphrase(&self) -> std::io::Result<Option<Passphrase>> {
        if let Some(path) = &self.passphrase_file {
            return Passphrase::from_file(path).map(Some);
        }
        Ok(self.passphrase.as_deref().map(Passphrase::new))
    }
}

/// Ask on the terminal only when decryption needs a passphrase nobody supplied.
fn should_prompt(decryption_enabled: bool, supplied: bool, interactive: bool) -> bool {
    decryption_enabled && !supplied && interactive
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => PostOfficeConfig::default(),
    };
    args.apply_overrides(&mut config)?;

    init_logging(&config.observability);
    tracing::info!("postoffice v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        connection_limit = config.rate_limit.connection_limit,
        artifact_dir = %config.storage.artifact_dir.display(),
        decryption = config.decryption.enabled,
        printer = config.sink.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let mut passphrase = args.passphrase()?;
    if should_prompt(
        config.decryption.enabled,
        passphrase.is_some(),
        std::io::stdin().is_terminal(),
    ) {
        let entered = rpassword::prompt_password("GPG passphrase: ")?;
        if !entered.is_empty() {
            passphrase = Some(Passphrase::new(entered));
        }
    }
    if config.decryption.enabled && passphrase.is_none() {
        tracing::warn!("No passphrase given, gpg will rely on its agent");
    }

    // Binding is the only failure that stops the process.
    let listener = Listener::bind(&config.listener).await?;

    let server = PostOfficeServer::new(&config, Collaborators::from_config(&config, passphrase));
    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
        }
        _ = wait_for_termination() => {
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
