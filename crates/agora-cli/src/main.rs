//! agora - command-line front end for the forum API.
//!
//! Usage:
//!   agora login [email]
//!   agora logout
//!   agora whoami
//!   agora posts [--tag TAG] [--page N]
//!   agora karma
//!   agora leaderboard [N]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agora_core::api::{LogoutReason, SessionEvent};
use agora_core::config::ConfiguredClient;
use agora_core::karma;
use agora_core::models::{ListParams, LoginRequest};
use agora_core::utils::{format_optional, format_relative, truncate_string};
use agora_core::{Account, Config};

/// Directory for the optional daily log file
const LOG_DIR_ENV: &str = "AGORA_LOG_DIR";

const DEFAULT_LEADERBOARD_SIZE: u32 = 10;

const USAGE: &str = "Usage: agora <login [email] | logout | whoami | posts [--tag TAG] [--page N] | karma | leaderboard [N]>";

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default "warn"). When AGORA_LOG_DIR is set,
/// events are also written to a daily rolling file there; the returned guard
/// must live until exit so the file writer flushes.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV).map(PathBuf::from) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "agora.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let mut config = Config::load()?;
    let client = config.client()?;
    info!(command = %command, api_url = %config.api_url(), "agora starting");

    if command != "logout" {
        client.session().subscribe(|event| {
            if let SessionEvent::LoggedOut {
                reason: LogoutReason::RefreshFailed,
                ..
            } = event
            {
                eprintln!("Your session has expired. Run `agora login` to sign in again.");
            }
        });
    }

    match command.as_str() {
        "login" => login(&client, &mut config, args.get(1).cloned()).await,
        "logout" => logout(&client).await,
        "whoami" => whoami(&client).await,
        "posts" => posts(&client, &args[1..]).await,
        "karma" => show_karma(&client).await,
        "leaderboard" => {
            let limit = match args.get(1) {
                Some(n) => n.parse().context("Leaderboard size must be a number")?,
                None => DEFAULT_LEADERBOARD_SIZE,
            };
            leaderboard(&client, limit).await
        }
        other => bail!("Unknown command '{}'\n{}", other, USAGE),
    }
}

fn prompt_email(default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("Email [{}]: ", d),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim();
    if email.is_empty() {
        default
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Email required"))
    } else {
        Ok(email.to_string())
    }
}

async fn login(client: &ConfiguredClient, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(e) => e,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password required");
    }

    let account = Account::new();
    let user = account
        .login(
            client,
            &LoginRequest {
                email: email.clone(),
                password,
            },
        )
        .await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {} (@{})", user.display_name(), user.username);
    Ok(())
}

async fn logout(client: &ConfiguredClient) -> Result<()> {
    Account::new().logout(client).await;
    println!("Signed out");
    Ok(())
}

async fn whoami(client: &ConfiguredClient) -> Result<()> {
    let account = Account::new();
    account.watch(client);
    account.init(client).await;

    match account.user() {
        Some(user) => {
            println!("{} (@{})", user.display_name(), user.username);
            println!("  email:  {}", format_optional(&user.email, "-"));
            println!("  bio:    {}", format_optional(&user.bio, "-"));
            println!("  karma:  {} (level {})", user.karma_points, user.karma_level);
            println!("  posts:  {}  comments: {}", user.posts_count, user.comments_count);
            if user.is_staff {
                println!("  staff");
            }
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

async fn posts(client: &ConfiguredClient, args: &[String]) -> Result<()> {
    let mut tag = None;
    let mut params = ListParams::default();

    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--tag" => tag = Some(rest.next().context("--tag needs a value")?.clone()),
            "--page" => {
                let page = rest.next().context("--page needs a value")?;
                params.page = Some(page.parse().context("Page must be a number")?);
            }
            other => bail!("Unknown option '{}'", other),
        }
    }

    let page = match tag {
        Some(ref tag) => client.posts_by_tag(tag, &params).await?,
        None => client.posts(&params).await?,
    };

    let now = Utc::now();
    for post in &page.results {
        let when = post
            .published_at
            .or(post.created_at)
            .map(|at| format_relative(at, now))
            .unwrap_or_default();
        println!(
            "{:<50}  {:<16}  {:>4} likes  {:>4} comments  {}",
            truncate_string(&post.title, 50),
            truncate_string(post.author_name(), 16),
            post.likes_count,
            post.comments_count,
            when
        );
    }
    println!(
        "\n{} posts total{}",
        page.count,
        if page.has_more() { ", more with --page" } else { "" }
    );
    Ok(())
}

async fn show_karma(client: &ConfiguredClient) -> Result<()> {
    let overview = karma::overview(client, DEFAULT_LEADERBOARD_SIZE).await?;
    let progress = overview.progress;

    println!(
        "{}: {} points, level {}",
        overview.mine.username, overview.mine.karma_points, progress.current_level
    );
    println!(
        "  {}% to level {} ({} points to go)",
        progress.progress_percent, progress.next_level, progress.points_to_next
    );
    if let Some(rank) = overview.rank() {
        println!("  #{} on the leaderboard", rank);
    }

    if !overview.mine.recent_history.is_empty() {
        println!("\nRecent:");
        let now = Utc::now();
        for event in &overview.mine.recent_history {
            println!(
                "  {:>+5}  {:<40}  {}",
                event.points,
                truncate_string(&event.reason, 40),
                format_relative(event.created_at, now)
            );
        }
    }
    Ok(())
}

async fn leaderboard(client: &ConfiguredClient, limit: u32) -> Result<()> {
    let entries = client.leaderboard(limit).await?;
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}. {:<24} {:>6} points  level {}",
            i + 1,
            truncate_string(&entry.username, 24),
            entry.karma_points,
            entry.karma_level
        );
    }
    Ok(())
}
