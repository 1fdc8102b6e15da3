use std::path::{Path, PathBuf};
use colored::Colorize;
use json_comments::StripComments;
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub debug: bool,
    pub api_addr: String,
    /// Empty means `<data dir>/mdchat/storage.json`.
    pub storage_path: String,
    pub markdown: bool,
    pub progressive_reveal: bool,
    pub reveal_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            api_addr: "http://127.0.0.1:5000".to_string(),
            storage_path: "".to_string(),
            markdown: true,
            progressive_reveal: true,
            reveal_interval_ms: 20,
        }
    }
}

impl Config {
    pub fn storage_path(&self) -> PathBuf {
        if !self.storage_path.is_empty() {
            return PathBuf::from(&self.storage_path);
        }
        let mut data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        data_dir.push("mdchat");
        data_dir.push("storage.json");
        data_dir
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(debug) = var("MDCHAT_DEBUG") { self.debug = debug.to_lowercase() == "true"; }
        if let Some(api_addr) = var("MDCHAT_API_ADDR") { self.api_addr = api_addr; }
        if let Some(path) = var("MDCHAT_STORAGE_PATH") { self.storage_path = path; }
        if let Some(markdown) = var("MDCHAT_MARKDOWN") { self.markdown = markdown.to_lowercase() == "true"; }
        if let Some(reveal) = var("MDCHAT_PROGRESSIVE_REVEAL") { self.progressive_reveal = reveal.to_lowercase() == "true"; }
        if let Some(ms) = var("MDCHAT_REVEAL_INTERVAL_MS") { if let Ok(n) = ms.parse() { self.reveal_interval_ms = n; } }
    }
}

pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MDCHAT_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let mut config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.push("mdchat");
    config_dir.push("mdchat.config.json");
    config_dir
}

fn parse_config(json: &str) -> Result<Config, serde_json::Error> {
    serde_json::from_reader(StripComments::new(json.as_bytes()))
}

/// Writes the defaults on first start so there is a file to edit.
fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let default_json = serde_json::to_string_pretty(&Config::default()).unwrap_or_else(|_| "{}".to_string());
    std::fs::write(path, default_json)
}

fn load_config_from<F: Fn(&str) -> Option<String>>(path: &Path, var: F) -> Config {
    if !path.exists() {
        match write_default_config(path) {
            Ok(()) => println!("{}", format!("Created default config at '{}'", path.display()).green()),
            Err(e) => println!("{}", format!("Failed to write default config to '{}': {}", path.display(), e).red()),
        }
    }

    let mut config = match std::fs::read_to_string(path).map(|json| parse_config(&json)) {
        Ok(Ok(file_config)) => file_config,
        Ok(Err(e)) => {
            println!("{}\nUsing default config", format!("Failed to parse {}: {}", path.display(), e).red());
            Config::default()
        }
        Err(_) => Config::default(),
    };
    config.apply_env(var);
    config
}

pub fn load_config() -> Config {
    load_config_from(&get_config_path(), |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_with_comments_keeps_defaults() {
        let config = parse_config(
            r#"{
                // local dev server
                "api_addr": "http://localhost:8080",
                "reveal_interval_ms": 5
            }"#,
        )
        .unwrap();
        assert_eq!(config.api_addr, "http://localhost:8080");
        assert_eq!(config.reveal_interval_ms, 5);
        assert!(config.markdown);
        assert!(config.progressive_reveal);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("MDCHAT_API_ADDR", "http://chat.internal"),
            ("MDCHAT_MARKDOWN", "FALSE"),
            ("MDCHAT_REVEAL_INTERVAL_MS", "not a number"),
            ("MDCHAT_DEBUG", "true"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_addr, "http://chat.internal");
        assert!(!config.markdown);
        assert!(config.debug);
        assert_eq!(config.reveal_interval_ms, 20);
    }

    #[test]
    fn first_start_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdchat").join("mdchat.config.json");

        let config = load_config_from(&path, |_| None);

        assert_eq!(config, Config::default());
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(parse_config(&written).unwrap(), Config::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdchat.config.json");
        std::fs::write(&path, "{ \"api_addr\": ").unwrap();

        let config = load_config_from(&path, |name| {
            (name == "MDCHAT_API_ADDR").then(|| "http://override:9000".to_string())
        });

        assert_eq!(config.api_addr, "http://override:9000");
        assert_eq!(config.reveal_interval_ms, 20);
    }

    #[test]
    fn explicit_storage_path_wins() {
        let config = Config { storage_path: "/tmp/chat.json".to_string(), ..Config::default() };
        assert_eq!(config.storage_path(), PathBuf::from("/tmp/chat.json"));
    }
}
