mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Overrides the configured database file.
pub const ENV_DB_PATH: &str = "MADDEN_DB_PATH";

/// Overrides the configured pool size.
pub const ENV_DB_POOL_SIZE: &str = "MADDEN_DB_POOL_SIZE";

/// Load configuration from a TOML file, applying environment overrides
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, env_lookup)
}

/// Load configuration from a TOML file, reading overrides through `lookup`
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_overrides(&mut config, lookup)?;
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./madden.toml",
        "~/.config/madden/config.toml",
        "/etc/madden/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_overrides(&mut config, env_lookup)?;
    validate_config(&config)?;
    Ok(config)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Apply environment overrides, reading variables through `lookup`.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.is_empty()) {
        config.database.path = PathBuf::from(shellexpand::tilde(&path).into_owned());
    }

    if let Some(size) = lookup(ENV_DB_POOL_SIZE) {
        config.database.pool_size = size
            .trim()
            .parse()
            .with_context(|| format!("{ENV_DB_POOL_SIZE} is not a valid pool size: {size:?}"))?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.database.path.as_os_str().is_empty() {
        anyhow::bail!("Database path cannot be empty");
    }

    if config.database.pool_size == 0 {
        anyhow::bail!("Database pool size must be at least 1");
    }

    if config.database.busy_timeout_ms == 0 {
        tracing::warn!("Busy timeout is 0; concurrent writers will fail immediately");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("madden.db"));
        assert_eq!(config.database.pool_size, 4);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        apply_overrides(&mut config, |key| match key {
            ENV_DB_PATH => Some("/var/lib/madden/catalog.db".to_string()),
            ENV_DB_POOL_SIZE => Some("12".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/madden/catalog.db"));
        assert_eq!(config.database.pool_size, 12);
    }

    #[test]
    fn bad_pool_size_override_is_rejected() {
        let mut config = Config::default();
        let err = apply_overrides(&mut config, |key| {
            (key == ENV_DB_POOL_SIZE).then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_DB_POOL_SIZE));
    }

    #[test]
    fn zero_pool_size_is_invalid() {
        let mut config = Config::default();
        config.database.pool_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
