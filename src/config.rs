use crate::client::Endpoints;
use crate::layout::Size;
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Editor configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local collaborator service.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Base URL of the collaborator endpoints
    pub api_url: String,
    pub list_tables_path: String,
    pub execute_query_path: String,
    pub dashboard_path: String,
    pub test_connection_path: String,
    /// HTTP request timeout in seconds (default: `30`)
    pub request_timeout_secs: u64,
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Where exports and the event journal live
    pub workspace_dir: PathBuf,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost/kanvas/api/mysql".to_string(),
            list_tables_path: "list-tables.php".to_string(),
            execute_query_path: "execute-query.php".to_string(),
            dashboard_path: "dashboard.php".to_string(),
            test_connection_path: "ping-server.php".to_string(),
            request_timeout_secs: 30,
            canvas_width: 1000.0,
            canvas_height: 1000.0,
            workspace_dir: PathBuf::from("./dashboards"),
        }
    }
}

impl EditorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                             |
    /// |------------------------|-------------------------------------|
    /// | `DASHBOARD_API_URL`    | `http://localhost/kanvas/api/mysql` |
    /// | `LIST_TABLES_PATH`     | `list-tables.php`                   |
    /// | `EXECUTE_QUERY_PATH`   | `execute-query.php`                 |
    /// | `DASHBOARD_PATH`       | `dashboard.php`                     |
    /// | `TEST_CONNECTION_PATH` | `ping-server.php`                   |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                |
    /// | `CANVAS_WIDTH`         | `1000`                              |
    /// | `CANVAS_HEIGHT`        | `1000`                              |
    /// | `WORKSPACE_DIR`        | `./dashboards`                      |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).unwrap_or(default);

        let request_timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout_secs);
        let canvas_width: f32 =
            parse_var(&lookup, "CANVAS_WIDTH")?.unwrap_or(defaults.canvas_width);
        let canvas_height: f32 =
            parse_var(&lookup, "CANVAS_HEIGHT")?.unwrap_or(defaults.canvas_height);

        if !(canvas_width > 0.0 && canvas_height > 0.0) {
            return Err(anyhow!(
                "Canvas size must be positive, got {} x {}",
                canvas_width,
                canvas_height
            ));
        }

        Ok(Self {
            api_url: var("DASHBOARD_API_URL", defaults.api_url),
            list_tables_path: var("LIST_TABLES_PATH", defaults.list_tables_path),
            execute_query_path: var("EXECUTE_QUERY_PATH", defaults.execute_query_path),
            dashboard_path: var("DASHBOARD_PATH", defaults.dashboard_path),
            test_connection_path: var("TEST_CONNECTION_PATH", defaults.test_connection_path),
            request_timeout_secs,
            canvas_width,
            canvas_height,
            workspace_dir: lookup("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
        })
    }

    pub fn endpoints(&self) -> Endpoints {
        let base = self.api_url.trim_end_matches('/');
        let join = |path: &str| format!("{}/{}", base, path.trim_start_matches('/'));
        Endpoints {
            list_tables: join(&self.list_tables_path),
            execute_query: join(&self.execute_query_path),
            dashboard: join(&self.dashboard_path),
            test_connection: join(&self.test_connection_path),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn canvas_size(&self) -> Size {
        Size::new(self.canvas_width, self.canvas_height)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} must be a valid number, got '{}': {}", key, raw, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<EditorConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EditorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(
            config.endpoints(),
            Endpoints::under("http://localhost/kanvas/api/mysql")
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.canvas_size(), Size::new(1000.0, 1000.0));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DASHBOARD_API_URL", "https://db.example.com/api/"),
            ("DASHBOARD_PATH", "/dashboards"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("CANVAS_WIDTH", "1280"),
            ("WORKSPACE_DIR", "/tmp/dash"),
        ])
        .unwrap();

        assert_eq!(config.endpoints().dashboard, "https://db.example.com/api/dashboards");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.canvas_size(), Size::new(1280.0, 1000.0));
        assert_eq!(config.workspace_dir, PathBuf::from("/tmp/dash"));
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let err = config_from(&[("REQUEST_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_SECS"));

        assert!(config_from(&[("CANVAS_HEIGHT", "-1")]).is_err());
    }
}
