//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `<home>/config.toml` (or the path in `OTTO_CONFIG`)
//! 2. Apply `OTTO_*` environment variable overrides
//! 3. Fall back to [`AppConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp` then renames to `<path>` to avoid partial writes
//! corrupting the config file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use super::schema::AppConfig;

// ─── home_dir ─────────────────────────────────────────────────────────────

/// Resolve `<home>` — the root under which `state.db`, `secrets/`, `logs/`,
/// and `config.toml` live. Defaults to the platform data directory for
/// `otto`; overridable with `OTTO_HOME`.
pub fn home_dir() -> PathBuf {
    if let Ok(v) = env::var("OTTO_HOME") {
        return PathBuf::from(v);
    }
    directories::ProjectDirs::from("dev", "otto-runtime", "otto")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".otto"))
}

// ─── default_config_path ─────────────────────────────────────────────────

/// Return the default config file path: `<home>/config.toml`.
pub fn default_config_path() -> PathBuf {
    home_dir().join("config.toml")
}

// ─── load_config ──────────────────────────────────────────────────────────

/// Load [`AppConfig`] from the given path, falling back to defaults if the
/// file does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load config from the default path (or `OTTO_CONFIG`), falling back to
/// defaults on any error.
pub fn load_default_config() -> AppConfig {
    let path = env::var("OTTO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path());

    load_config(&path).unwrap_or_default()
}

// ─── apply_env_overrides ──────────────────────────────────────────────────

/// Apply `OTTO_*` environment variable overrides to `config`.
///
/// Supported overrides (§6 and §6.1 of the design):
/// - `OTTO_INTERNAL_API_HOST` — must be `127.0.0.1` or `localhost`.
/// - `OTTO_INTERNAL_API_PORT` — 1–65535.
/// - `OTTO_EXTERNAL_API_HOST`
/// - `OTTO_EXTERNAL_API_PORT` — 1–65535.
/// - `OTTO_SCHEDULER_TICK_MS`, `OTTO_SCHEDULER_LEASE_MS`, `OTTO_SCHEDULER_WORKERS`
/// - `OTTO_DELIVERY_TICK_MS`
fn apply_env_overrides(config: &mut AppConfig) -> Result<(), String> {
    if let Ok(v) = env::var("OTTO_INTERNAL_API_HOST") {
        if v != "127.0.0.1" && v != "localhost" {
            return Err(format!(
                "OTTO_INTERNAL_API_HOST must be '127.0.0.1' or 'localhost', got '{v}'"
            ));
        }
        config.http.internal_host = v;
    }
    if let Ok(v) = env::var("OTTO_INTERNAL_API_PORT") {
        config.http.internal_port = parse_port(&v, "OTTO_INTERNAL_API_PORT")?;
    }
    if let Ok(v) = env::var("OTTO_EXTERNAL_API_HOST") {
        config.http.external_host = v;
    }
    if let Ok(v) = env::var("OTTO_EXTERNAL_API_PORT") {
        config.http.external_port = parse_port(&v, "OTTO_EXTERNAL_API_PORT")?;
    }
    if let Ok(v) = env::var("OTTO_SCHEDULER_TICK_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            config.scheduler.tick_ms = ms;
        }
    }
    if let Ok(v) = env::var("OTTO_SCHEDULER_LEASE_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            config.scheduler.lease_ms = ms;
        }
    }
    if let Ok(v) = env::var("OTTO_SCHEDULER_WORKERS") {
        if let Ok(n) = v.parse::<usize>() {
            config.scheduler.worker_pool_size = n.max(1);
        }
    }
    if let Ok(v) = env::var("OTTO_DELIVERY_TICK_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            config.delivery.tick_ms = ms;
        }
    }
    Ok(())
}

fn parse_port(v: &str, var_name: &str) -> Result<u16, String> {
    v.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| format!("{var_name} must be an integer in 1-65535, got '{v}'"))
}

// ─── save_config ──────────────────────────────────────────────────────────

/// Atomically save `config` to `path`: write to `<path>.tmp`, then rename.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("failed to serialise config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;
    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;
    Ok(())
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[scheduler]
tick_ms = 2000
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.scheduler.tick_ms, 2000);
        assert_eq!(config.scheduler.lease_ms, 60_000);
        assert_eq!(config.http.internal_port, 4180);
    }

    #[test]
    fn load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[scheduler]
tick_ms = 500
lease_ms = 30000
worker_pool_size = 16
claim_batch_limit = 64

[delivery]
tick_ms = 250
backoff_base_secs = 10
backoff_cap_secs = 600
max_attempts = 5

[http]
internal_host = "127.0.0.1"
internal_port = 5000
external_host = "0.0.0.0"
external_port = 5001
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.scheduler.worker_pool_size, 16);
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.http.internal_port, 5000);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut original = AppConfig::default();
        original.scheduler.tick_ms = 1500;
        original.http.external_port = 9999;

        save_config(&path, &original).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, original, "config should round-trip through save/load");
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let nested_path = dir.path().join("a").join("b").join("config.toml");
        save_config(&nested_path, &AppConfig::default()).unwrap();
        assert!(nested_path.exists(), "config should be created in nested dirs");
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "this is not valid toml!!!");
        let result = load_config(&path);
        assert!(result.is_err(), "invalid TOML should return an error");
    }

    #[test]
    fn rejects_non_loopback_internal_host_env_override() {
        let mut config = AppConfig::default();
        // SAFETY: test runs single-threaded w.r.t. this var.
        unsafe { env::set_var("OTTO_INTERNAL_API_HOST", "0.0.0.0") };
        let result = apply_env_overrides(&mut config);
        unsafe { env::remove_var("OTTO_INTERNAL_API_HOST") };
        assert!(result.is_err(), "non-loopback internal host should be rejected");
    }

    #[test]
    fn accepts_localhost_internal_host_env_override() {
        let mut config = AppConfig::default();
        unsafe { env::set_var("OTTO_INTERNAL_API_HOST", "localhost") };
        let result = apply_env_overrides(&mut config);
        unsafe { env::remove_var("OTTO_INTERNAL_API_HOST") };
        assert!(result.is_ok());
        assert_eq!(config.http.internal_host, "localhost");
    }

    #[test]
    fn rejects_invalid_port_env_override() {
        let mut config = AppConfig::default();
        unsafe { env::set_var("OTTO_EXTERNAL_API_PORT", "not-a-port") };
        let result = apply_env_overrides(&mut config);
        unsafe { env::remove_var("OTTO_EXTERNAL_API_PORT") };
        assert!(result.is_err());
    }
}
