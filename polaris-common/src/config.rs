//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve the service data folder with the usual priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Locate the configuration file for the platform
fn locate_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("polaris").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    let system_config = PathBuf::from("/etc/polaris/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("polaris"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/polaris"))
}

/// Read a string setting from the settings table
pub async fn get_setting(pool: &sqlx::SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Read an integer setting, falling back to a default when unset or unparseable
pub async fn get_setting_i64(pool: &sqlx::SqlitePool, key: &str, default: i64) -> i64 {
    match get_setting(pool, key).await {
        Ok(Some(v)) => v.parse().unwrap_or(default),
        _ => default,
    }
}

/// Upsert a setting value
pub async fn set_setting(pool: &sqlx::SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
