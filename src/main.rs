use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use merit_rs::{AppCredentials, Environment, Merit, MeritConfig, MeritQuery, MeritStatus, Org};

/// Command-line client for the Merit API
#[derive(Parser)]
#[command(name = "merit-rs", version, about)]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct AuthArgs {
    /// App ID from the Merit developer portal
    #[arg(long, env = "MERIT_APP_ID", global = true, hide_env_values = true)]
    app_id: Option<String>,

    /// App secret from the Merit developer portal
    #[arg(long, env = "MERIT_APP_SECRET", global = true, hide_env_values = true)]
    app_secret: Option<String>,

    /// Organization ID (org commands only)
    #[arg(long, env = "MERIT_ORG_ID", global = true)]
    org_id: Option<String>,

    /// Use live data (`true`) or the sandbox (`false`)
    #[arg(
        long,
        env = "MERIT_PRODUCTION",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    production: Option<bool>,

    /// Use the sandbox instead of live data (same as `--production false`)
    #[arg(long, global = true)]
    sandbox: bool,

    /// Override the API base URL
    #[arg(long, env = "MERIT_API_URL", global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the link-app flow and print the URL to send the user to
    Link {
        #[arg(long)]
        success_url: String,
        #[arg(long)]
        failure_url: String,
    },
    /// Exchange an org_id_token from the link-app flow for the org ID
    OrgId { org_id_token: String },
    /// Show the org's profile
    OrgInfo,
    /// List the org's merit templates
    Templates {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// List (id, title) template choices
    TemplateChoices {
        /// Leave out the empty choice
        #[arg(long)]
        no_empty: bool,
    },
    /// Show a merit template
    Template { template_id: String },
    /// Show the fields enabled on a merit template
    TemplateFields { template_id: String },
    /// Show a field
    Field { field_id: String },
    /// List merits issued by the org
    Merits {
        #[arg(long)]
        template_id: Option<String>,
        /// One of Accepted, Pending, Unapproved, Revoked, ...
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// List proposed merits awaiting approval for a template
    Pending { template_id: String },
    /// Propose a merit from a JSON file (`-` for stdin)
    Propose { body: PathBuf },
    /// Send a merit from a JSON file (`-` for stdin)
    Send { body: PathBuf },
    /// Edit a merit with the JSON edits in a file (`-` for stdin)
    Edit { merit_id: String, body: PathBuf },
    /// Revoke a merit
    Revoke {
        merit_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Transfer a merit to a new email address
    Transfer { merit_id: String, email: String },
    /// Print the static QR lookup URL for a member's merit
    Translate { merit_id: String, email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "merit_rs=info".into()))
        .init();

    let cli = Cli::parse();
    let app = build_app(&cli.auth)?;
    let org_client = || org(&app, &cli.auth);

    match cli.command {
        Command::Link {
            success_url,
            failure_url,
        } => print_json(&app.link_with_merit(&success_url, &failure_url).await?),
        Command::OrgId { org_id_token } => {
            println!("{}", app.get_org_id_from_token(&org_id_token).await?);
            Ok(())
        }
        Command::OrgInfo => print_json(&org_client()?.get_org_info().await?),
        Command::Templates { limit } => {
            print_json(&org_client()?.get_all_org_merit_templates(limit).await?)
        }
        Command::TemplateChoices { no_empty } => {
            for (id, title) in org_client()?.get_org_merit_template_choices(!no_empty).await? {
                println!("{}\t{}", id.as_deref().unwrap_or(""), title);
            }
            Ok(())
        }
        Command::Template { template_id } => {
            print_json(&org_client()?.get_merit_template(&template_id).await?)
        }
        Command::TemplateFields { template_id } => {
            print_json(&org_client()?.get_template_field_choices(&template_id).await?)
        }
        Command::Field { field_id } => print_json(&org_client()?.get_field(&field_id).await?),
        Command::Merits {
            template_id,
            status,
            email,
            limit,
        } => {
            let mut query = MeritQuery::default().limit(limit);
            if let Some(template_id) = template_id {
                query = query.template(template_id);
            }
            if let Some(status) = status {
                query = query.status(status.parse::<MeritStatus>()?);
            }
            if let Some(email) = email {
                query = query.recipient_email(email);
            }
            let merits = org_client()?.get_all_merits(&query).await?;
            tracing::info!("fetched {} merit(s)", merits.len());
            print_json(&merits)
        }
        Command::Pending { template_id } => {
            print_json(&org_client()?.get_template_pending_merits(&template_id).await?)
        }
        Command::Propose { body } => {
            println!("{}", org_client()?.propose_merit(&read_json(&body)?).await?);
            Ok(())
        }
        Command::Send { body } => {
            println!("{}", org_client()?.send_merit(&read_json(&body)?).await?);
            Ok(())
        }
        Command::Edit { merit_id, body } => {
            org_client()?.edit_merit(&merit_id, &read_json(&body)?).await?;
            eprintln!("Merit {} updated", merit_id);
            Ok(())
        }
        Command::Revoke { merit_id, reason } => {
            org_client()?.revoke_merit(&merit_id, &reason).await?;
            eprintln!("Merit {} revoked", merit_id);
            Ok(())
        }
        Command::Transfer { merit_id, email } => {
            println!("{}", org_client()?.update_email(&merit_id, &email).await?);
            Ok(())
        }
        Command::Translate { merit_id, email } => {
            println!("{}", org_client()?.uuid_translation(&merit_id, &email).await?);
            Ok(())
        }
    }
}

fn build_app(auth: &AuthArgs) -> Result<Merit> {
    let credentials = AppCredentials::new(
        auth.app_id
            .clone()
            .context("missing app ID (--app-id or MERIT_APP_ID)")?,
        auth.app_secret
            .clone()
            .context("missing app secret (--app-secret or MERIT_APP_SECRET)")?,
    );

    let production = !auth.sandbox && auth.production.unwrap_or(true);
    let config = MeritConfig {
        base_url: auth.api_url.clone().filter(|url| !url.trim().is_empty()),
        ..MeritConfig::new(Environment::from_production(production))
    };

    tracing::debug!(environment = %config.environment, "using {}", config.base_url());
    Merit::with_config(credentials, config).context("Failed to build Merit client")
}

fn org(app: &Merit, auth: &AuthArgs) -> Result<Org> {
    let org_id = auth
        .org_id
        .as_deref()
        .context("missing org ID (--org-id or MERIT_ORG_ID)")?;
    Ok(app.org(org_id))
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read JSON from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
