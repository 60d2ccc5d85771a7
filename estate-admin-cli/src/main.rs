//! Estate Admin CLI
//!
//! Command-line client for the estate marketplace admin backend.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from --password or ESTATE_ADMIN_PASSWORD)
//! estate-admin login ops@example.com
//!
//! # Show the stored session
//! estate-admin status
//!
//! # Query an admin resource
//! estate-admin get listings --query status=pending
//!
//! # Update a membership tier
//! estate-admin patch /memberships/gold --data '{"monthlyPrice": 19}'
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use estate_admin_client::{ApiRequest, AuthEvent, Resource};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod session;

use session::{Context, Options};

#[derive(Parser)]
#[command(name = "estate-admin")]
#[command(about = "Admin client for the estate marketplace backend")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend base URL (overrides config file and ESTATE_ADMIN_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Cookie jar holding the session
    #[arg(long, global = true)]
    jar: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        /// Admin email address
        email: String,

        /// Admin password
        #[arg(long, env = "ESTATE_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the session and forget stored credentials
    Logout,

    /// Show the stored session
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// GET a resource (listings, users, memberships, premium-pricing,
    /// promotions, news, reports) or any path
    Get {
        target: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
    },

    /// POST a JSON body to a path
    Post {
        target: String,

        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// PUT a JSON body to a path
    Put {
        target: String,

        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// PATCH a path with a JSON body
    Patch {
        target: String,

        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// DELETE a path
    Delete { target: String },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = Options {
        base_url: cli.base_url,
        jar: cli.jar,
        config: cli.config,
    };

    let mut context = session::connect(&options)?;
    let result = run(&mut context, cli.command).await;

    if let Some(AuthEvent::Unauthorized { reason }) = context.session_ended() {
        eprintln!("Session ended ({}). Run `estate-admin login` again.", reason);
    }
    result
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(context: &mut Context, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => login(context, &email, &password).await,
        Commands::Logout => {
            context.client.logout().await;
            println!("Logged out");
            Ok(())
        }
        Commands::Status { format } => status(context, &format),
        Commands::Get { target, query } => {
            let request = query
                .into_iter()
                .fold(ApiRequest::get(resolve_target(&target)), |request, (k, v)| {
                    request.query(k, v)
                });
            execute(context, request).await
        }
        Commands::Post { target, data } => {
            execute(context, with_data(ApiRequest::post(resolve_target(&target)), data)?).await
        }
        Commands::Put { target, data } => {
            execute(context, with_data(ApiRequest::put(resolve_target(&target)), data)?).await
        }
        Commands::Patch { target, data } => {
            execute(context, with_data(ApiRequest::patch(resolve_target(&target)), data)?).await
        }
        Commands::Delete { target } => {
            execute(context, ApiRequest::delete(resolve_target(&target))).await
        }
        Commands::Config => show_config(context),
    }
}

async fn login(context: &Context, email: &str, password: &str) -> Result<()> {
    let session = context
        .client
        .login(email, password)
        .await
        .context("Login failed")?;

    info!("Session stored in {:?}", context.jar_path);
    match session.subject {
        Some(subject) => println!("Logged in as admin {}", subject),
        None => println!("Logged in"),
    }
    if !context.client.store().is_available() {
        eprintln!("Warning: no cookie jar available, the session will not be kept");
    }
    Ok(())
}

fn status(context: &Context, format: &str) -> Result<()> {
    let session = context.client.session();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        _ => match session {
            None => println!("Not logged in"),
            Some(session) => {
                println!(
                    "Admin:          {}",
                    session.subject.as_deref().unwrap_or("(unknown)")
                );
                println!("Access token:   {}", describe_expiry(session.access_expires_at));
                if session.access_expired {
                    println!("                (expired, will refresh on next request)");
                }
                if session.has_refresh_token {
                    println!("Refresh token:  {}", describe_expiry(session.refresh_expires_at));
                } else {
                    println!("Refresh token:  none");
                }
            }
        },
    }
    Ok(())
}

fn describe_expiry(expires_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match expires_at {
        Some(at) => format!("expires {}", at.to_rfc3339()),
        None => "no expiry claim".to_string(),
    }
}

async fn execute(context: &Context, request: ApiRequest) -> Result<()> {
    let method = request.method.clone();
    let path = request.path.clone();

    let body: serde_json::Value = context
        .client
        .try_request(request)
        .await
        .with_context(|| format!("{} {} failed", method, path))?;

    if !body.is_null() {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(())
}

fn show_config(context: &Context) -> Result<()> {
    match &context.config_path {
        Some(path) if path.exists() => println!("# loaded from {}", path.display()),
        Some(path) => println!("# defaults ({} not found)", path.display()),
        None => println!("# defaults (no config directory)"),
    }
    print!("{}", toml::to_string_pretty(context.client.config())?);

    match &context.jar_path {
        Some(jar) => println!("# cookie jar: {}", jar.display()),
        None => println!("# cookie jar: unavailable"),
    }
    Ok(())
}

/// Map a resource name to its collection path; anything else is a path.
fn resolve_target(target: &str) -> String {
    match target.parse::<Resource>() {
        Ok(resource) => resource.path(),
        Err(_) => target.to_string(),
    }
}

fn with_data(request: ApiRequest, data: Option<String>) -> Result<ApiRequest> {
    match data {
        None => Ok(request),
        Some(data) => {
            let body: serde_json::Value =
                serde_json::from_str(&data).context("--data is not valid JSON")?;
            Ok(request.json(body))
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}
