//! CA Enroll - command-line client
//!
//! ```bash
//! # Register an account
//! ca-enroll register --action /register --field email=jdoe@example.org --field token=abc
//!
//! # Enroll for a client certificate, writes client.p12
//! ca-enroll enroll --token abc --comment "laptop" --validity 365
//! ```
//!
//! Configuration is read from `--config`, or `config.toml` when present.
//! `RUST_LOG` overrides the log filter; `-v` switches the default to `debug`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use ca_enroll::configs::AppConfig;
use ca_enroll::crypto::{HashAlgorithm, OpensslProvider, SignatureScheme};
use ca_enroll::enrollment::{EnrollmentFlow, EnrollmentForm, EnrollmentOutcome};
use ca_enroll::page::ConsolePage;
use ca_enroll::protocol::FormFields;
use ca_enroll::registration::{RegistrationOutcome, RegistrationSubmitter};
use ca_enroll::transport::HttpTransport;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Registration and client certificate enrollment
#[derive(Parser)]
#[command(name = "ca-enroll", version, about)]
struct Cli {
    /// Configuration file (defaults to config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit the registration form
    Register {
        /// Form action, absolute or relative to server.base_url
        #[arg(long)]
        action: String,

        /// Form field, repeatable
        #[arg(long = "field", value_name = "NAME=VALUE", value_parser = FormFields::parse_pair)]
        fields: Vec<(String, String)>,
    },
    /// Generate a key, request a certificate and save the PKCS#12 bundle
    Enroll {
        #[arg(long, default_value = "")]
        token: String,

        #[arg(long, default_value = "")]
        comment: String,

        /// Requested validity, passed to the server as-is
        #[arg(long, default_value = "")]
        validity: String,

        /// Bundle destination (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        common_name: Option<String>,

        #[arg(long)]
        organization: Option<String>,

        #[arg(long)]
        organizational_unit: Option<String>,

        /// rsassa-pkcs1-v1-5 or ecdsa (rsa-pss is accepted but has no key generation support)
        #[arg(long)]
        scheme: Option<SignatureScheme>,

        /// sha-1, sha-256, sha-384 or sha-512
        #[arg(long)]
        hash: Option<HashAlgorithm>,

        /// Also print the bundle as a data: URL
        #[arg(long)]
        data_url: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let transport =
        HttpTransport::new(config.server.timeout()).context("Failed to create HTTP client")?;

    match cli.command {
        Commands::Register { action, fields } => {
            let submitter = RegistrationSubmitter::new(transport, config.server.base_url()?);
            let mut page = ConsolePage::new(config.output.bundle_path.clone());
            let form: FormFields = fields.into_iter().collect();

            match submitter
                .submit(&mut page, &action, &form)
                .await
                .context("Registration failed")?
            {
                RegistrationOutcome::Accepted => info!("registration complete"),
                RegistrationOutcome::Rejected { .. } => {
                    anyhow::bail!("Registration rejected by the server")
                }
            }
        }
        Commands::Enroll {
            token,
            comment,
            validity,
            output,
            common_name,
            organization,
            organizational_unit,
            scheme,
            hash,
            data_url,
        } => {
            let mut subject = config.subject.clone();
            if let Some(cn) = common_name {
                subject = subject.common_name(cn);
            }
            if let Some(org) = organization {
                subject = subject.organization(org);
            }
            if let Some(ou) = organizational_unit {
                subject = subject.organizational_unit(ou);
            }

            let mut algorithm = config.key;
            if let Some(scheme) = scheme {
                algorithm.scheme = scheme;
            }
            if let Some(hash) = hash {
                algorithm.hash = hash;
            }

            let flow = EnrollmentFlow::new(OpensslProvider, transport, config.server.enroll_url()?)
                .subject(subject)
                .algorithm(algorithm);
            let output = output.unwrap_or_else(|| config.output.bundle_path.clone());
            let mut page = ConsolePage::new(output).print_data_url(data_url);
            let form = EnrollmentForm {
                token,
                comment,
                validity,
            };

            if let EnrollmentOutcome::Issued { download } = flow
                .run(&mut page, &form)
                .await
                .context("Enrollment failed")?
            {
                info!(file = %download.file_name, "enrollment complete");
            }
        }
    }

    Ok(())
}
