//! Harness configuration loading
//!
//! Reads `lofn.toml` from the project directory: the GCP project id, the
//! function list, emulator options, and an optional dotenv-style file whose
//! contents are overlaid onto every function runtime's environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use lofn_core::prelude::*;
use lofn_core::{FunctionDescriptor, TriggerKind};

/// Config file name, resolved relative to the project directory.
pub const CONFIG_FILE: &str = "lofn.toml";

/// First port assigned to function runtimes; subsequent functions count up.
pub const DEFAULT_BASE_PORT: u16 = 8080;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    project: String,
    base_port: Option<u16>,
    env_file: Option<PathBuf>,
    #[serde(default)]
    emulator: RawEmulator,
    #[serde(default)]
    functions: Vec<RawFunction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEmulator {
    data_dir: Option<PathBuf>,
    host_port: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFunction {
    name: String,
    entry_point: Option<String>,
    source: Option<PathBuf>,
    trigger: Option<RawTrigger>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// `trigger = "http"` or `trigger = { topic = "..." }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTrigger {
    Named(String),
    PubSub { topic: String },
}

/// Validated harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub project: String,
    pub base_port: u16,
    pub functions: Vec<FunctionDescriptor>,
    pub emulator_data_dir: Option<PathBuf>,
    pub emulator_host_port: Option<String>,
    /// KEY=VALUE pairs from `env_file`, applied to every function runtime
    pub env_overlay: Vec<(String, String)>,
}

/// Load and validate `lofn.toml` from `project_dir`.
pub fn load(project_dir: &Path) -> Result<HarnessConfig> {
    let path = project_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Err(Error::ConfigNotFound { path });
    }

    let text = std::fs::read_to_string(&path)?;
    let raw: RawConfig = toml::from_str(&text)
        .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;

    let functions = raw
        .functions
        .into_iter()
        .map(|function| {
            let trigger = convert_trigger(function.trigger, &function.name)?;
            Ok(FunctionDescriptor {
                name: function.name,
                entry_point: function.entry_point,
                source: function.source,
                trigger,
                env: function.env,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let env_overlay = match raw.env_file {
        Some(env_file) => {
            let env_path = project_dir.join(&env_file);
            let contents = std::fs::read_to_string(&env_path).map_err(|e| {
                Error::config(format!("env_file {}: {e}", env_path.display()))
            })?;
            parse_env_file(&contents)
        }
        None => Vec::new(),
    };

    Ok(HarnessConfig {
        project: raw.project,
        base_port: raw.base_port.unwrap_or(DEFAULT_BASE_PORT),
        functions,
        emulator_data_dir: raw.emulator.data_dir,
        emulator_host_port: raw.emulator.host_port,
        env_overlay,
    })
}

/// Absent trigger means plain HTTP, matching what a deploy would default to.
fn convert_trigger(raw: Option<RawTrigger>, function_name: &str) -> Result<TriggerKind> {
    match raw {
        None => Ok(TriggerKind::Http),
        Some(RawTrigger::Named(name)) if name == "http" => Ok(TriggerKind::Http),
        Some(RawTrigger::Named(other)) => Err(Error::config(format!(
            "function '{function_name}': unknown trigger '{other}'"
        ))),
        Some(RawTrigger::PubSub { topic }) => Ok(TriggerKind::PubSub { topic }),
    }
}

/// Parse dotenv-style contents: one KEY=VALUE per line, `#` comments,
/// optional `export ` prefix, optional double quotes around the value.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, contents: &str) {
        std::fs::write(dir.join(CONFIG_FILE), contents).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(dir.path());
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "project = \"demo\"\n");

        let config = load(dir.path()).unwrap();
        assert_eq!(config.project, "demo");
        assert_eq!(config.base_port, DEFAULT_BASE_PORT);
        assert!(config.functions.is_empty());
        assert!(config.env_overlay.is_empty());
    }

    #[test]
    fn test_load_functions_with_triggers() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
project = "demo"
base_port = 9000

[[functions]]
name = "receive-webhook"
trigger = "http"

[[functions]]
name = "receive-pubsub"
entry_point = "handlePubSub"
source = "dist/receive-pubsub"
trigger = { topic = "t1" }

[[functions]]
name = "untriggered"
"#,
        );

        let config = load(dir.path()).unwrap();
        assert_eq!(config.base_port, 9000);
        assert_eq!(config.functions.len(), 3);

        assert_eq!(config.functions[0].trigger, TriggerKind::Http);
        assert_eq!(
            config.functions[1].trigger,
            TriggerKind::PubSub {
                topic: "t1".to_string()
            }
        );
        assert_eq!(config.functions[1].target(), "handlePubSub");
        // Absent trigger defaults to http
        assert_eq!(config.functions[2].trigger, TriggerKind::Http);
    }

    #[test]
    fn test_load_rejects_unknown_trigger() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "project = \"demo\"\n[[functions]]\nname = \"fn\"\ntrigger = \"storage\"\n",
        );
        let result = load(dir.path());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_emulator_options_and_env_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\nB=\"two\"\n").unwrap();
        write_config(
            dir.path(),
            r#"
project = "demo"
env_file = ".env"

[emulator]
host_port = "localhost:8085"
"#,
        );

        let config = load(dir.path()).unwrap();
        assert_eq!(config.emulator_host_port.as_deref(), Some("localhost:8085"));
        assert_eq!(
            config.env_overlay,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "project = \"demo\"\nenv_file = \".env\"\n");
        assert!(matches!(load(dir.path()), Err(Error::Config { .. })));
    }

    #[test]
    fn test_parse_env_file() {
        let parsed = parse_env_file(
            "# comment\n\nexport TOKEN=abc\nURL=\"http://x\"\nBROKEN_LINE\nK = spaced \n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TOKEN".to_string(), "abc".to_string()),
                ("URL".to_string(), "http://x".to_string()),
                ("K".to_string(), "spaced".to_string()),
            ]
        );
    }
}
