use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use investi::auth::{SignUpOutcome, SqliteCredentialStore};
use investi::{ApiClient, Config, RequestOptions};
use reqwest::Method;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "investi")]
#[command(about = "Command-line client for the Investi backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/investi/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Credential database (default: $XDG_DATA_HOME/investi/credentials.db)
  #[arg(long)]
  credentials: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in with email and password
  Login {
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Create an account
  Signup {
    email: String,
    #[arg(long)]
    password: String,
    /// Display name stored on the profile
    #[arg(long)]
    name: Option<String>,
  },
  /// Sign out and forget stored credentials
  Logout,
  /// Show the signed-in user's profile
  Whoami,
  /// GET a REST path and print the JSON response
  Get {
    /// Path under the REST base, e.g. /posts
    path: String,
    /// Query parameter as key=value; may be repeated
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Serve from the response cache when possible
    #[arg(long)]
    cached: bool,
    /// Retry transient failures this many times
    #[arg(long, default_value_t = 0)]
    retries: u32,
  },
  /// Probe connectivity and show session state
  Status,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got {}", raw))?;
  Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = investi::logging::init(&config.log)?;

  let credentials = match args.credentials {
    Some(path) => path,
    None => Config::credentials_path()?,
  };
  let store = Arc::new(SqliteCredentialStore::open(&credentials)?);
  let client = ApiClient::new(&config, store)?;

  match args.command {
    Command::Login { email, password } => {
      let session = client.auth().sign_in(&email, &password).await?;
      println!("Signed in as {}", session.user_id);
    }
    Command::Signup {
      email,
      password,
      name,
    } => {
      let metadata = name.map(|n| json!({ "nombre": n }));
      match client.auth().sign_up(&email, &password, metadata).await? {
        SignUpOutcome::Session(session) => {
          println!("Signed up and signed in as {}", session.user_id);
        }
        SignUpOutcome::ConfirmationRequired(user) => {
          println!("Account {} created, check your email to confirm", user.id);
        }
      }
    }
    Command::Logout => {
      client.auth().sign_out().await?;
      println!("Signed out");
    }
    Command::Whoami => {
      let user_id = client
        .auth()
        .current_user_id()?
        .ok_or_else(|| eyre!("Not signed in"))?;
      let profile = client.fetch_profile(&user_id).await?;
      println!("{}", user_id);
      if let Some(name) = profile.name {
        println!("name:     {}", name);
      }
      if let Some(username) = profile.username {
        println!("username: {}", username);
      }
      if let Some(email) = profile.email {
        println!("email:    {}", email);
      }
    }
    Command::Get {
      path,
      params,
      cached,
      retries,
    } => {
      let mut options = RequestOptions::new();
      options.params = params;

      let body = if cached {
        let result = client
          .request_with_cache(Method::GET, &path, &options)
          .await?;
        eprintln!("source: {:?}", result.source);
        result.data
      } else {
        client
          .request_with_retry(Method::GET, &path, &options, retries)
          .await?
      };

      let summary = client.metrics_summary();
      tracing::debug!(
        requests = summary.count,
        errors = summary.errors,
        avg_duration_ms = summary.avg_duration_ms,
        "Pipeline metrics"
      );

      match body {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => eprintln!("(empty response)"),
      }
    }
    Command::Status => {
      let status = client
        .connection()
        .check_now(&client.health_probe())
        .await;
      println!("connection: {:?}", status);
      println!("signed in:  {}", client.auth().is_authenticated()?);
      if let Some(expires_at) = client.auth().expires_at()? {
        let expiry = chrono::DateTime::from_timestamp(expires_at, 0)
          .map(|t| t.to_rfc3339())
          .unwrap_or_else(|| expires_at.to_string());
        println!("expires:    {}", expiry);
      }
    }
  }

  Ok(())
}
