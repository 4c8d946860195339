//! YAML configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{action::Action, condition::ConditionSet, types::Repo};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub meta: MetaConfig,
    pub repository: RepositoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    /// SQLite file holding the change tracker.
    pub database_path: PathBuf,
    /// Login the bot posts as; used to recognise its own comments.
    #[serde(default)]
    pub bot_user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    /// Title of the milestone `assign_next_milestone` moves pull requests to.
    #[serde(default)]
    pub next_milestone: Option<String>,
    #[serde(default)]
    pub pr_approvers: Vec<String>,
    #[serde(default)]
    pub filters: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default)]
    pub conditions: ConditionSet,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn repo(&self) -> Result<Repo> {
        Repo::new(&self.repository.owner, &self.repository.name).map_err(|e| {
            anyhow::anyhow!(
                "Invalid repository '{}/{}': {}",
                self.repository.owner,
                self.repository.name,
                e
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
meta:
  database_path: cache.sqlite
  bot_user: galaxybot
repository:
  owner: galaxyproject
  name: galaxy
  next_milestone: "17.01"
  pr_approvers:
    - alice
    - bob
  filters:
    - name: needs-review
      conditions:
        - state: open
        - plus__lt: 1
        - created_at__lt: relative::7 days ago
      actions:
        - action: comment
          comment: >
            {author}, this pull request has been waiting
            for a week.
        - action: assign_tag
          action_value: needs-review
    - name: approved
      conditions:
        state: open
        plus__ge: 2
      actions:
        - action: assign_next_milestone
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.meta.database_path, PathBuf::from("cache.sqlite"));
        assert_eq!(config.meta.bot_user.as_deref(), Some("galaxybot"));
        assert_eq!(config.repo().unwrap().to_string(), "galaxyproject/galaxy");
        assert_eq!(config.repository.next_milestone.as_deref(), Some("17.01"));
        assert_eq!(config.repository.pr_approvers, vec!["alice", "bob"]);
        assert_eq!(config.repository.filters.len(), 2);

        let review = &config.repository.filters[0];
        assert_eq!(review.name, "needs-review");
        assert_eq!(
            review.conditions.iter().collect::<Vec<_>>(),
            vec![
                ("state", "open"),
                ("plus__lt", "1"),
                ("created_at__lt", "relative::7 days ago"),
            ]
        );
        assert_eq!(review.actions.len(), 2);

        let approved = &config.repository.filters[1];
        assert_eq!(approved.conditions.len(), 2);
        assert_eq!(approved.actions, vec![Action::AssignNextMilestone]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(
            "meta:\n  database_path: db.sqlite\nrepository:\n  owner: o\n  name: r\n",
        )
        .unwrap();
        assert!(config.meta.bot_user.is_none());
        assert!(config.repository.pr_approvers.is_empty());
        assert!(config.repository.filters.is_empty());
    }

    #[test]
    fn test_unknown_action_fails_to_load() {
        let yaml = r#"
meta:
  database_path: db.sqlite
repository:
  owner: o
  name: r
  filters:
    - name: broken
      actions:
        - action: merge
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/conf.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
