//! On-disk configuration, loaded once at startup with `toml`+`serde` the
//! way the teacher's service configs are loaded, then used to seed the
//! live, mutable `ConfigMutator` state `info-core` holds from then on.

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub enterprise: bool,

    #[serde(default = "default_core_threads")]
    pub core_threads: usize,

    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default)]
    pub namespaces: Vec<NamespaceSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NamespaceSettings {
    pub name: String,
    #[serde(default = "default_memory_size")]
    pub memory_size: u64,
}

fn default_bind() -> String {
    "0.0.0.0:3003".to_string()
}

/// Single-node deployments never set this explicitly; a fixed placeholder
/// is good enough since there's no heartbeat/exchange subsystem here to
/// assign a real cluster-unique node id (spec.md §1).
fn default_node_id() -> String {
    "BB9000000000000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_core_threads() -> usize {
    4
}

fn default_max_threads() -> usize {
    32
}

fn default_queue_depth() -> usize {
    256
}

fn default_memory_size() -> u64 {
    1024 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind: default_bind(),
            node_id: default_node_id(),
            log_level: default_log_level(),
            enterprise: false,
            core_threads: default_core_threads(),
            max_threads: default_max_threads(),
            queue_depth: default_queue_depth(),
            namespaces: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("parsing {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = toml::from_str("bind = \"127.0.0.1:4000\"").unwrap();
        assert_eq!(settings.bind, "127.0.0.1:4000");
        assert_eq!(settings.core_threads, 4);
        assert!(settings.namespaces.is_empty());
    }

    #[test]
    fn parses_namespace_table() {
        let text = r#"
            bind = "127.0.0.1:4000"

            [[namespaces]]
            name = "test"
            memory_size = 2147483648
        "#;
        let settings: Settings = toml::from_str(text).unwrap();
        assert_eq!(settings.namespaces.len(), 1);
        assert_eq!(settings.namespaces[0].name, "test");
    }

    #[test]
    fn load_reads_a_real_file_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:5000\"\nlog_level = \"debug\"").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.bind, "127.0.0.1:5000");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn load_reports_the_path_on_a_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/path/info-server.toml")).unwrap_err();
        assert!(err.contains("nonexistent"));
    }
}
