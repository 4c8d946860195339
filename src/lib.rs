//! Mergerbot: rule-driven pull request automation.
//!
//! Polls a repository's pull requests, keeps the ones that changed since
//! the last run, and evaluates configured rules against each. A rule is an
//! ordered list of conditions (title, state, labels, branch, approver
//! votes, age) and the actions to take when all of them hold: commenting,
//! labelling, or moving the pull request to the next milestone.

pub mod action;
pub mod bot;
pub mod cache;
pub mod cli;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod forge;
pub mod github;
pub mod rule;
pub mod time;
pub mod types;
pub mod votes;

pub use action::{Action, ActionSettings};
pub use bot::{MergerBot, RunSummary};
pub use cache::ChangeTracker;
pub use cli::{RunOptions, parse_args};
pub use condition::{Condition, ConditionKind, ConditionSet, Operator};
pub use config::Config;
pub use context::RunContext;
pub use error::{BotError, BotResult};
pub use forge::Forge;
pub use github::GitHub;
pub use rule::{Rule, RuleSettings};
pub use types::{Comment, Milestone, PrState, PullRequest, Repo, RepoError};
pub use votes::Vote;
