//! Configuration loading for the `nfa-learning` binary.
//!
//! Everything lives in one TOML file. Agents and modules listed there seed the
//! in-memory directory and module registry at startup; embedders that own a
//! real registry implement [`crate::learning::AgentDirectory`] instead.

use crate::error::{ConfigError, Error, Result};
use crate::learning::{
    Account, AgentId, InMemoryDirectory, LearningConfig, LearningModule, MerkleTreeLearning,
    ModuleRegistry,
};

use serde::{Deserialize, Serialize};

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Directory holding learning.db.
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub log: LogConfig,
    pub learning: LearningConfig,
    pub agents: Vec<AgentEntry>,
    pub modules: Vec<ModuleEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            api: ApiConfig::default(),
            log: LogConfig::default(),
            learning: LearningConfig::default(),
            agents: Vec::new(),
            modules: vec![ModuleEntry {
                address: Account::from("merkle"),
                kind: ModuleKind::MerkleTree,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ApiConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 19_870,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LogConfig {
    pub debug: bool,
    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
}

/// An agent known to the in-memory directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: AgentId,
    pub owner: Account,
    #[serde(default)]
    pub delegates: Vec<Account>,
}

/// A learning module registered under an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub address: Account,
    #[serde(default)]
    pub kind: ModuleKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    #[default]
    MerkleTree,
}

impl ModuleKind {
    fn build(self) -> Arc<dyn LearningModule> {
        match self {
            Self::MerkleTree => Arc::new(MerkleTreeLearning),
        }
    }
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.learning
            .validate()
            .map_err(|message| Error::Config(ConfigError::Invalid(message)))?;

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id) {
                return Err(
                    ConfigError::Invalid(format!("agent {} is listed twice", agent.id)).into(),
                );
            }
        }
        if self.modules.is_empty() {
            return Err(
                ConfigError::Invalid("at least one learning module is required".into()).into(),
            );
        }
        Ok(())
    }

    /// Build the directory described by `[[agents]]`.
    pub fn directory(&self) -> InMemoryDirectory {
        let directory = InMemoryDirectory::new();
        for agent in &self.agents {
            directory.set_owner(agent.id, agent.owner.clone());
            for delegate in &agent.delegates {
                directory.add_delegate(agent.id, delegate.clone());
            }
        }
        directory
    }

    /// Build the registry described by `[[modules]]`.
    pub fn module_registry(&self) -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        for module in &self.modules {
            registry.register(module.address.clone(), module.kind.build());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::AgentDirectory as _;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.learning.max_updates_per_day, 50);
        assert_eq!(config.api.port, 19_870);
        assert!(config.module_registry().contains(&Account::from("merkle")));
    }

    #[test]
    fn agents_seed_the_directory() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/var/lib/nfa"

            [learning]
            max_updates_per_day = 5

            [[agents]]
            id = 1
            owner = "0xalice"
            delegates = ["0xbob"]

            [[modules]]
            address = "0xmerkle"
            kind = "merkle_tree"
            "#,
        )
        .unwrap();

        assert_eq!(config.learning.max_updates_per_day, 5);
        assert_eq!(config.learning.rate_window_secs, 86_400);

        let directory = config.directory();
        assert_eq!(directory.owner_of(AgentId(1)), Some(Account::from("0xalice")));
        assert!(directory.is_delegate(AgentId(1), &Account::from("0xbob")));
        assert!(config.module_registry().contains(&Account::from("0xmerkle")));
    }

    #[test]
    fn example_config_parses() {
        let config = Config::from_toml_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.learning.confidence_milestones, vec![0.80, 0.95]);
        assert_eq!(config.agents.len(), 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = Config::from_toml_str("[learning]\nrate_window_secs = 0\n").unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::Invalid(_))));

        let error = Config::from_toml_str(
            "[[agents]]\nid = 1\nowner = \"a\"\n[[agents]]\nid = 1\nowner = \"b\"\n",
        )
        .unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::Invalid(_))));

        let error = Config::from_toml_str("modules = []\n").unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::Invalid(_))));

        let error = Config::from_toml_str("data_dir = [").unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::Parse(_))));
    }
}
