//! Certflow - certificate issuance over ACME
//!
//! This is the main entry point for the Certflow CLI.

use anyhow::Context;
use certflow_acme::{
    Certificate, CertificateInfo, InstantAcmeDriver, KeyFactory, KeyType, RenewOutcome,
};
use certflow_core::config::{AppConfig, ConfigLoader, LoggingConfig};
use certflow_core::{CertService, MemoryCertRepo};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File next to the issued chain that remembers the certificate URL for renewals
const CERT_URL_FILE: &str = "cert_url";

#[derive(Parser)]
#[command(name = "certflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a certificate using its DNS provider or website
    Obtain {
        /// Certificate id from the configuration
        id: String,
    },

    /// Renew a previously issued certificate
    Renew {
        id: String,
    },

    /// Issue a certificate with manually published DNS records
    Manual {
        id: String,
    },

    /// Manage ACME accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Key utilities
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show the subject names and validity of a PEM certificate
    Inspect {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Register a configured account and store its key
    Register {
        id: String,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Generate a private key (P256, P384, 2048, 3072, 4096)
    Generate {
        key_type: KeyType,

        /// Write the PEM here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Key { action: KeyAction::Generate { key_type, out } } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            let key = tokio::task::spawn_blocking(move || KeyFactory::generate(key_type)).await??;
            let pem = key.to_pem()?;
            match out {
                Some(path) => {
                    write_private(&path, &pem).await?;
                    tracing::info!("🔑 {} key written to {:?}", key_type, path);
                }
                None => print!("{}", pem),
            }
        }

        Commands::Inspect { path } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            let pem = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("cannot read {:?}", path))?;
            print_info(&CertificateInfo::parse(&pem)?);
        }

        command => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.logging, cli.verbose);
            let output_dir = config.acme.output_dir.clone();

            let repo = Arc::new(MemoryCertRepo::from_config(&config));
            let driver = Arc::new(InstantAcmeDriver::new());
            let service = CertService::new(repo, driver, config.acme.clone());

            match command {
                Commands::Obtain { id } => {
                    let certificate = service.obtain_auto(&id).await?;
                    write_certificate(&output_dir, &id, &certificate).await?;
                }

                Commands::Renew { id } => match service.renew(&id).await? {
                    RenewOutcome::Renewed(certificate) => {
                        write_certificate(&output_dir, &id, &certificate).await?;
                    }
                    RenewOutcome::Reissued { certificate, renewal_error } => {
                        println!(
                            "Renewal by URL failed ({}), a new certificate was issued",
                            renewal_error
                        );
                        write_certificate(&output_dir, &id, &certificate).await?;
                    }
                    RenewOutcome::Failed(e) => return Err(e.into()),
                },

                Commands::Manual { id } => {
                    let _eviction = service.start_session_eviction();
                    run_manual(&service, &output_dir, &id).await?;
                }

                Commands::Account { action: AccountAction::Register { id } } => {
                    let record = service.register_account(&id).await?;
                    let path = account_key_path(&config, &id);
                    if let Some(pem) = &record.private_key {
                        write_private(&path, pem).await?;
                    }
                    let account_url = record.account_url.unwrap_or_default();
                    println!("Account '{}' registered: {}", id, account_url);
                    println!("Key stored at {}", path.display());
                }

                Commands::Key { .. } | Commands::Inspect { .. } => {}
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

/// Load the configuration and fill in state kept beside the issued files
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => ConfigLoader::default_path()
            .context("no config directory on this platform, pass --config")?,
    };
    let mut config = ConfigLoader::load(&path)?;

    for account in &mut config.accounts {
        if account.private_key.is_none() && account.private_key_file.is_none() {
            let path = config.acme.output_dir.join("accounts").join(format!("{}.key", account.id));
            account.private_key_file = Some(path);
        }
    }

    for cert in &mut config.certs {
        if cert.cert_url.is_none() {
            let stored = config.acme.output_dir.join(&cert.id).join(CERT_URL_FILE);
            if let Ok(url) = std::fs::read_to_string(stored) {
                cert.cert_url = Some(url.trim().to_string());
            }
        }
    }
    Ok(config)
}

fn account_key_path(config: &AppConfig, id: &str) -> PathBuf {
    config
        .accounts
        .iter()
        .find(|a| a.id == id)
        .and_then(|a| a.private_key_file.clone())
        .unwrap_or_else(|| config.acme.output_dir.join("accounts").join(format!("{}.key", id)))
}

async fn run_manual(service: &CertService, output_dir: &Path, id: &str) -> anyhow::Result<()> {
    let records = service.manual_dns(id).await?;

    println!("Publish these DNS records, then press Enter:");
    println!();
    for record in &records {
        println!("  {}  {}  {}", record.name, record.record_type, record.value);
    }
    println!();

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    let certificate = service.obtain_manual(id).await?;
    write_certificate(output_dir, id, &certificate).await
}

async fn write_certificate(
    output_dir: &Path,
    id: &str,
    certificate: &Certificate,
) -> anyhow::Result<()> {
    let dir = output_dir.join(id);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("fullchain.pem"), &certificate.chain_pem).await?;
    write_private(&dir.join("privkey.pem"), &certificate.private_key_pem).await?;
    tokio::fs::write(dir.join(CERT_URL_FILE), &certificate.url).await?;

    println!("Certificate written to {}", dir.display());
    if let Ok(info) = certificate.info() {
        print_info(&info);
    }
    Ok(())
}

async fn write_private(path: &Path, pem: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, pem).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

fn print_info(info: &CertificateInfo) {
    println!("  names:      {}", info.dns_names.join(", "));
    println!("  issuer:     {}", info.issuer.as_deref().unwrap_or("-"));
    println!("  not before: {}", info.not_before);
    println!("  not after:  {}", info.not_after);
}
