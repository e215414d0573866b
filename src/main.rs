mod cli;

use madden::config::{self, Config};
use madden_db::migrations;
use madden_db::pool::open_pool;
use madden_db::Catalog;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        // validate loads the config itself so it can report what it found
        Commands::Validate | Commands::Version => None,
        _ => Some(load(&cli)?),
    };

    // Respect RUST_LOG env var if set, then the config filter, then the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        config
            .as_ref()
            .and_then(|c| c.logging.filter.clone())
            .unwrap_or_else(|| {
                if cli.verbose {
                    "madden=debug,madden_db=debug,maddenctl=debug".to_string()
                } else {
                    "madden=info,madden_db=info,maddenctl=info".to_string()
                }
            })
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match (cli.command, config) {
        (Commands::Migrate, Some(config)) => migrate(&config),
        (Commands::Status, Some(config)) => status(&config),
        (Commands::Validate, _) => validate(&cli.config, &cli.db),
        (Commands::Version, _) => {
            println!("maddenctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        (_, None) => anyhow::bail!("configuration was not loaded"),
    }
}

fn load(cli: &Cli) -> Result<Config> {
    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    Ok(config)
}

fn db_path(config: &Config) -> Result<String> {
    config
        .database
        .path
        .to_str()
        .map(str::to_string)
        .with_context(|| format!("Database path is not valid UTF-8: {:?}", config.database.path))
}

fn migrate(config: &Config) -> Result<()> {
    let path = db_path(config)?;
    tracing::info!("Migrating catalog at {}", path);

    let pool = open_pool(&path, config.database.pool_options())
        .with_context(|| format!("Failed to open database {path}"))?;
    let catalog = Catalog::new(pool);
    let applied = catalog.schema.ensure_schema()?;
    let version = catalog.schema.current_version()?;

    println!("Applied {applied} migration(s); schema version {version}");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let path = db_path(config)?;
    if !config.database.path.exists() {
        anyhow::bail!("Database does not exist: {path} (run `maddenctl migrate` first)");
    }

    let pool = open_pool(&path, config.database.pool_options())
        .with_context(|| format!("Failed to open database {path}"))?;
    let catalog = Catalog::new(pool);

    let version = catalog.schema.current_version()?;
    println!("Database: {path}");
    println!("Schema version: {version} (latest {})", migrations::latest_version());
    if version < migrations::latest_version() {
        println!("Pending migrations: run `maddenctl migrate`");
        return Ok(());
    }

    let summary = catalog.summaries.current()?;
    let published = catalog.published.current()?;
    match summary.created_at {
        Some(at) => println!("Summary ({}): {}", at.to_rfc3339(), summary.summary),
        None => println!("Summary: (none)"),
    }
    println!("Published: {}", published.published);
    Ok(())
}

fn validate(config_path: &Option<std::path::PathBuf>, db: &Option<std::path::PathBuf>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path.as_deref())?;
    if let Some(db) = db {
        config.database.path = db.clone();
    }
    config::validate_config(&config)?;

    println!("Configuration is valid");
    println!("  Database: {}", config.database.path.display());
    println!("  Pool size: {}", config.database.pool_size);
    println!("  Busy timeout: {}ms", config.database.busy_timeout_ms);
    if !config.database.path.exists() {
        println!("  (database file does not exist yet)");
    }
    Ok(())
}
