//! manga-cms server entry point.

use clap::Parser;
use manga_cms::{
    config::{Cli, Command, Config, UserCommand, WorkCommand},
    db::{self, Database, WorkFilter},
    server,
    upload::UploadPipeline,
};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::Work { action }) => cmd_work(action, &config).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Serve { bind, uploads }) => cmd_serve(config, bind, uploads).await,
        None => {
            // Default: start server
            cmd_serve(config, None, None).await
        }
    }
}

/// Initialize config, database and upload directories.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = open_database(&config)?;
    println!("Initialized database: {}", config.database.path.display());

    std::fs::create_dir_all(&config.storage.uploads_dir)?;
    std::fs::create_dir_all(&config.storage.staging_dir)?;
    println!(
        "Created upload directories: {}, {}",
        config.storage.uploads_dir.display(),
        config.storage.staging_dir.display()
    );

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: manga-cms serve");

    Ok(())
}

/// Work management commands.
async fn cmd_work(action: WorkCommand, config: &Config) -> anyhow::Result<()> {
    let db = open_database(config)?;

    match action {
        WorkCommand::List { title } => {
            let mut filter = WorkFilter::new(Some(1), Some(u32::MAX));
            filter.title = title;

            let mut works = Vec::new();
            loop {
                let batch = db.list_works(&filter)?;
                let done = batch.len() < filter.limit as usize;
                works.extend(batch);
                if done {
                    break;
                }
                filter.page += 1;
            }

            if works.is_empty() {
                println!("No works found.");
            } else {
                println!("{:<6} {:<32} {:<14} {:<4} CREATED", "ID", "SLUG", "STATUS", "VIP");
                println!("{}", "-".repeat(80));
                for summary in works {
                    let work = summary.work;
                    println!(
                        "{:<6} {:<32} {:<14} {:<4} {}",
                        work.id,
                        work.slug,
                        work.status,
                        if work.is_vip { "yes" } else { "no" },
                        db::timestamp_to_datetime(work.created_at).format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        WorkCommand::Del { slug } => {
            let pipeline = UploadPipeline::new(db, config.storage.clone());
            if pipeline.delete_work(&slug)? {
                println!("Deleted work: {}", slug);
            } else {
                println!("Work not found: {}", slug);
            }
        }
    }

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = open_database(config)?;

    match action {
        UserCommand::Add { username, vip } => {
            let user = db.create_user(&username, vip)?;
            println!(
                "Created user: {} (vip: {}, id: {})",
                user.username, user.is_vip, user.id
            );
        }

        UserCommand::Del { username } => {
            if db.delete_user(&username)? {
                println!("Deleted user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::List => {
            let users = db.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<6} {:<24} {:<4} CREATED", "ID", "USERNAME", "VIP");
                println!("{}", "-".repeat(60));
                for user in users {
                    println!(
                        "{:<6} {:<24} {:<4} {}",
                        user.id,
                        user.username,
                        if user.is_vip { "yes" } else { "no" },
                        db::timestamp_to_datetime(user.created_at).format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    uploads: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Override from CLI
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(dir) = uploads {
        config.storage.uploads_dir = dir;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manga_cms=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Open database; the server does not start without it
    let db = open_database(&config)?;

    std::fs::create_dir_all(&config.storage.uploads_dir)?;
    std::fs::create_dir_all(&config.storage.staging_dir)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        uploads = %config.storage.uploads_dir.display(),
        "Starting manga-cms server"
    );

    let bind = config.server.bind;
    let state = server::AppState::new(config, db);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    Ok(Database::open(&config.database.path)?)
}
