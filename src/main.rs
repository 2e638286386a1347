//! Blogcast - a blog platform with live publish notifications.
//!
//! One binary runs the HTTP/WebSocket API server and doubles as its own
//! client for registering, publishing, and watching the live feed.

mod api;
mod auth;
mod client;
mod config;
mod error;
mod events;
mod models;
mod posts;
mod storage;
#[cfg(test)]
mod testutil;
mod tui;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::client::{ApiClient, Session};
use crate::config::Config;
use crate::models::{CreatePostInput, LoginInput, RegisterInput};

const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "blogcast")]
#[command(about = "A blog platform with live publish notifications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Path to config file
        #[arg(short, long)]
        config: Option<String>,

        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Watch the live publish feed
    Watch,

    /// Register a new account
    Register {
        username: String,
        email: String,
        password: String,
    },

    /// Log in with an existing account
    Login { email: String, password: String },

    /// Forget the stored session
    Logout,

    /// Publish a new post
    Publish {
        title: String,
        content: String,

        /// Save as a draft instead of publishing
        #[arg(long)]
        draft: bool,
    },

    /// List published posts
    Posts {
        /// Show your own posts instead, drafts included
        #[arg(short, long)]
        mine: bool,
    },

    /// Show who the stored session belongs to
    Whoami,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Initialize default configuration file
        #[arg(short, long)]
        init: bool,
    },

    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging (skip for watch so the TUI stays clean)
    let is_watch = matches!(cli.command, Commands::Watch);

    if !is_watch || cli.debug {
        let level = if cli.debug {
            Level::DEBUG
        } else if cli.verbose {
            Level::INFO
        } else {
            Level::WARN
        };

        let _ = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .try_init();
    }

    match cli.command {
        Commands::Serve { config, host, port } => {
            run_serve(config, host, port).await?;
        }
        Commands::Watch => {
            let config = load_config(None)?;
            client::watch(&config).await?;
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            run_register(&username, &email, &password).await?;
        }
        Commands::Login { email, password } => {
            run_login(&email, &password).await?;
        }
        Commands::Logout => {
            let config = load_config(None)?;
            Session::clear(&config)?;
            println!("{DIM}Session cleared.{RESET}");
        }
        Commands::Publish {
            title,
            content,
            draft,
        } => {
            run_publish(title, content, draft).await?;
        }
        Commands::Posts { mine } => {
            run_posts(mine).await?;
        }
        Commands::Whoami => {
            run_whoami().await?;
        }
        Commands::Config { show, init } => {
            manage_config(show, init)?;
        }
        Commands::Version => {
            println!("{BOLD}blogcast{RESET} v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let default = Config::default_path();
            if default.exists() {
                Config::load(&default.to_string_lossy())
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn run_serve(
    config_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.http_port = port;
    }
    config.ensure_dirs()?;

    println!("{GREEN}{BOLD}blogcast{RESET} v{}", env!("CARGO_PKG_VERSION"));
    println!("{DIM}database:{RESET} {:?}", config.db_path);
    println!("{DIM}api:{RESET}      {}", config.base_url());
    println!("{DIM}feed:{RESET}     {}", config.subscribe_url());
    println!();

    info!("starting blogcast server");
    api::run_server(&config).await
}

async fn run_register(username: &str, email: &str, password: &str) -> Result<()> {
    let config = load_config(None)?;
    let client = ApiClient::new(config.base_url(), None);

    let response = client
        .register(&RegisterInput {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })
        .await?;

    Session {
        token: response.token,
        user: response.user.clone(),
    }
    .save(&config)?;

    println!(
        "{GREEN}Registered and logged in as {BOLD}{}{RESET} <{}>",
        response.user.username, response.user.email
    );
    Ok(())
}

async fn run_login(email: &str, password: &str) -> Result<()> {
    let config = load_config(None)?;
    let client = ApiClient::new(config.base_url(), None);

    let response = client
        .login(&LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await?;

    Session {
        token: response.token,
        user: response.user.clone(),
    }
    .save(&config)?;

    println!(
        "{GREEN}Logged in as {BOLD}{}{RESET}",
        response.user.username
    );
    Ok(())
}

async fn run_publish(title: String, content: String, draft: bool) -> Result<()> {
    let config = load_config(None)?;
    let Some(session) = Session::load(&config) else {
        bail!("not logged in; run `blogcast login` or `blogcast register` first");
    };

    let client = ApiClient::new(config.base_url(), Some(session.token));
    let post = client
        .create_post(&CreatePostInput {
            title,
            content,
            published: if draft { Some(false) } else { None },
        })
        .await?;

    if post.published {
        println!("{GREEN}Published{RESET} {BOLD}{}{RESET} ({})", post.title, post.id);
    } else {
        println!("{DIM}Saved draft{RESET} {BOLD}{}{RESET} ({})", post.title, post.id);
    }
    Ok(())
}

async fn run_posts(mine: bool) -> Result<()> {
    let config = load_config(None)?;

    let posts = if mine {
        let Some(session) = Session::load(&config) else {
            bail!("not logged in; run `blogcast login` first");
        };
        let client = ApiClient::new(config.base_url(), Some(session.token));
        client.my_posts().await?
    } else {
        let client = ApiClient::new(config.base_url(), None);
        client.published_posts().await?
    };

    if posts.is_empty() {
        println!("{DIM}No posts yet.{RESET}");
        return Ok(());
    }

    for post in posts {
        let marker = if post.published {
            format!("{GREEN}●{RESET}")
        } else {
            format!("{DIM}○ draft{RESET}")
        };
        println!(
            "{marker} {BOLD}{}{RESET} {DIM}by {} · {}{RESET}",
            post.title,
            post.author.username,
            post.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn run_whoami() -> Result<()> {
    let config = load_config(None)?;
    let Some(session) = Session::load(&config) else {
        println!("{DIM}Not logged in.{RESET}");
        return Ok(());
    };

    // Confirm the token is still accepted by the server.
    let client = ApiClient::new(config.base_url(), Some(session.token));
    let profile = client.me().await?;
    println!(
        "{GREEN}{BOLD}{}{RESET} <{}> {DIM}since {}{RESET}",
        profile.username,
        profile.email,
        profile.created_at.format("%Y-%m-%d")
    );
    Ok(())
}

fn manage_config(show: bool, init: bool) -> Result<()> {
    let config_path = Config::default_path();

    if init {
        let config = Config::default();
        config.ensure_dirs()?;
        config.save(&config_path.to_string_lossy())?;
        println!("{GREEN}Configuration created at {:?}{RESET}", config_path);
        return Ok(());
    }

    if show || !init {
        let config = if config_path.exists() {
            Config::load(&config_path.to_string_lossy())?
        } else {
            println!("{DIM}No config file found, showing defaults{RESET}");
            Config::default()
        };

        println!("data_dir:              {:?}", config.data_dir);
        println!("db_path:               {:?}", config.db_path);
        println!("host:                  {}", config.host);
        println!("http_port:             {}", config.http_port);
        println!("token_ttl_hours:       {}", config.token_ttl_hours);
        println!("notification_ttl_secs: {}", config.notification_ttl_secs);
        println!("log_level:             {}", config.log_level);
    }

    Ok(())
}
