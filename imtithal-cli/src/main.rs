use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k256::pkcs8::{EncodePrivateKey, LineEnding};

use imtithal_core::chain::DocumentHash;
use imtithal_core::config::EnvironmentType;
use imtithal_core::csr::{SubjectAttributes, ToBase64String};
use imtithal_core::invoice::builder;
use imtithal_core::invoice::qr::QrPayload;
use imtithal_core::invoice::InvoiceRecord;

#[derive(Parser)]
#[command(name = "imtithal")]
#[command(about = "Operations CLI for the tax invoice compliance engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a certificate signing request from a properties file.
    Csr {
        #[arg(long)]
        properties: PathBuf,
        /// Target environment: sandbox, simulation, or production.
        #[arg(long, default_value = "sandbox")]
        env: String,
        /// Where to write the generated private key (PEM).
        #[arg(long)]
        private_key: Option<PathBuf>,
        /// Where to write the base64 CSR; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Emit base64 over the PEM encoding instead of raw DER.
        #[arg(long)]
        pem: bool,
    },
    /// Print the canonical XML for an invoice record (JSON input).
    Canonicalize {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the SHA-256 content hash of an invoice's canonical form.
    Digest {
        #[arg(long)]
        invoice: PathBuf,
    },
    /// Print the pre-signing QR payload (tags 1-5) for an invoice.
    Qr {
        #[arg(long)]
        invoice: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Csr {
            properties,
            env,
            private_key,
            out,
            pem,
        } => {
            let env = EnvironmentType::from_str(&env)?;
            let subject = SubjectAttributes::from_properties(&properties)?;
            let (csr, key) = subject.build_with_key(env)?;

            if let Some(path) = private_key {
                let key_pem = key
                    .to_pkcs8_pem(LineEnding::LF)
                    .context("encode private key")?;
                fs::write(&path, key_pem.as_bytes())
                    .with_context(|| format!("write private key to {}", path.display()))?;
            }

            let encoded = if pem {
                csr.to_pem_base64_string()?
            } else {
                csr.to_base64_string()?
            };
            emit(out, &encoded)?;
        }
        Commands::Canonicalize { invoice, out } => {
            let canonical = canonicalize(&invoice)?;
            emit(out, canonical.xml())?;
        }
        Commands::Digest { invoice } => {
            let canonical = canonicalize(&invoice)?;
            println!("{}", DocumentHash::digest(canonical.xml().as_bytes()));
        }
        Commands::Qr { invoice } => {
            let canonical = canonicalize(&invoice)?;
            println!("{}", QrPayload::from_canonical(&canonical).encode()?);
        }
    }
    Ok(())
}

fn canonicalize(path: &PathBuf) -> Result<builder::CanonicalInvoice> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("read invoice record from {}", path.display()))?;
    let record: InvoiceRecord =
        serde_json::from_str(&json).context("parse invoice record JSON")?;
    Ok(builder::build(&record)?)
}

fn emit(out: Option<PathBuf>, content: &str) -> Result<()> {
    match out {
        Some(path) => fs::write(&path, content)
            .with_context(|| format!("write output to {}", path.display()))?,
        None => println!("{content}"),
    }
    Ok(())
}
