//! Named conditions and their evaluation against a single pull request.
//!
//! A condition key is a base name optionally followed by `__` and an
//! operator, e.g. `title_contains`, `title_contains__not` or `plus__ge`.
//! Vote counts and creation times are compared numerically; every other
//! condition produces a flag that `not` can invert.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use regex::Regex;
use serde::{Deserialize, Deserializer, de::Error as _};
use tracing::debug;

use crate::{
    context::RunContext,
    error::{BotError, BotResult},
    forge::Forge,
    time::{DateExpr, seconds_relative_to},
    types::PullRequest,
    votes::{Vote, tally},
};

const OPERATOR_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    TitleContains,
    Milestone,
    State,
    HasTag,
    Plus,
    Minus,
    ToBranch,
    CreatedAt,
}

impl ConditionKind {
    const ALL: [ConditionKind; 8] = [
        ConditionKind::TitleContains,
        ConditionKind::Milestone,
        ConditionKind::State,
        ConditionKind::HasTag,
        ConditionKind::Plus,
        ConditionKind::Minus,
        ConditionKind::ToBranch,
        ConditionKind::CreatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::TitleContains => "title_contains",
            ConditionKind::Milestone => "milestone",
            ConditionKind::State => "state",
            ConditionKind::HasTag => "has_tag",
            ConditionKind::Plus => "plus",
            ConditionKind::Minus => "minus",
            ConditionKind::ToBranch => "to_branch",
            ConditionKind::CreatedAt => "created_at",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Numeric conditions need a comparison operator; the rest are flags.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConditionKind::Plus | ConditionKind::Minus | ConditionKind::CreatedAt
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Eq,
    Ne,
    Lt,
    Le,
    Not,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Not => "not",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(Operator::Gt),
            "ge" => Some(Operator::Ge),
            "eq" => Some(Operator::Eq),
            "ne" => Some(Operator::Ne),
            "lt" => Some(Operator::Lt),
            "le" => Some(Operator::Le),
            "not" => Some(Operator::Not),
            _ => None,
        }
    }

    /// Integer comparison; `None` for `not`, which has no numeric meaning.
    pub fn compare(&self, lhs: i64, rhs: i64) -> Option<bool> {
        match self {
            Operator::Gt => Some(lhs > rhs),
            Operator::Ge => Some(lhs >= rhs),
            Operator::Eq => Some(lhs == rhs),
            Operator::Ne => Some(lhs != rhs),
            Operator::Lt => Some(lhs < rhs),
            Operator::Le => Some(lhs <= rhs),
            Operator::Not => None,
        }
    }
}

/// Raw result of a check, before any operator is applied.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Flag(bool),
    Count(i64),
    Instant(DateTime<Utc>),
}

/// A validated condition from a rule's configuration.
#[derive(Debug, Clone)]
pub struct Condition {
    key: String,
    value: String,
    kind: ConditionKind,
    operator: Option<Operator>,
    label_pattern: Option<Regex>,
}

impl Condition {
    /// Parses a `name[__op]` key and its comparison value, rejecting
    /// combinations that could never evaluate.
    pub fn new(key: &str, value: &str) -> BotResult<Self> {
        let (name, operator) = match key.split_once(OPERATOR_SEPARATOR) {
            Some((name, op)) => {
                let operator = Operator::from_name(op).ok_or_else(|| {
                    BotError::config(format!("unknown operator '{op}' in condition '{key}'"))
                })?;
                (name, Some(operator))
            }
            None => (key, None),
        };
        let kind = ConditionKind::from_name(name)
            .ok_or_else(|| BotError::config(format!("unknown condition '{name}'")))?;

        if kind.is_numeric() {
            match operator {
                None => {
                    return Err(BotError::config(format!(
                        "condition '{key}' needs a comparison operator (gt, ge, eq, ne, lt, le)"
                    )));
                }
                Some(Operator::Not) => {
                    return Err(BotError::config(format!(
                        "condition '{key}' is numeric and cannot be negated"
                    )));
                }
                Some(_) => {}
            }
        }

        let label_pattern = match kind {
            ConditionKind::Plus | ConditionKind::Minus => {
                parse_threshold(key, value)?;
                None
            }
            ConditionKind::CreatedAt => {
                DateExpr::parse(value)?;
                None
            }
            // Labels match from their start, not as a whole.
            ConditionKind::HasTag => Some(Regex::new(&format!("^(?:{value})")).map_err(|e| {
                BotError::config(format!("invalid label pattern '{value}' in '{key}': {e}"))
            })?),
            _ => None,
        };

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
            kind,
            operator,
            label_pattern,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }

    /// Evaluates the condition for `pr`.
    ///
    /// Vote conditions count comments from `approvers` only. Comments and
    /// labels are fetched through `ctx`, so repeated conditions on the
    /// same pull request cost a single request each.
    pub async fn evaluate<F>(
        &self,
        pr: &PullRequest,
        approvers: &HashSet<String>,
        forge: &F,
        ctx: &mut RunContext,
    ) -> BotResult<bool>
    where
        F: Forge + ?Sized,
    {
        let outcome = self.check(pr, approvers, forge, ctx).await?;

        match (outcome, self.operator) {
            (Outcome::Flag(flag), Some(Operator::Not)) => Ok(!flag),
            (Outcome::Flag(flag), _) => Ok(flag),
            (Outcome::Count(count), Some(op)) => {
                self.compare(op, count, parse_threshold(&self.key, &self.value)?)
            }
            (Outcome::Instant(instant), Some(op)) => {
                debug!(created = %HumanTime::from(instant), expr = %self.value, "comparing time");
                let seconds = seconds_relative_to(instant, &self.value, ctx.now())?;
                self.compare(op, seconds, 0)
            }
            (_, None) => Err(BotError::config(format!(
                "condition '{}' needs a comparison operator",
                self.key
            ))),
        }
    }

    fn compare(&self, op: Operator, lhs: i64, rhs: i64) -> BotResult<bool> {
        op.compare(lhs, rhs).ok_or_else(|| {
            BotError::config(format!(
                "operator '{}' cannot compare numbers in '{}'",
                op.as_str(),
                self.key
            ))
        })
    }

    async fn check<F>(
        &self,
        pr: &PullRequest,
        approvers: &HashSet<String>,
        forge: &F,
        ctx: &mut RunContext,
    ) -> BotResult<Outcome>
    where
        F: Forge + ?Sized,
    {
        let value = self.value.as_str();
        let outcome = match self.kind {
            ConditionKind::TitleContains => Outcome::Flag(pr.title.contains(value)),
            ConditionKind::Milestone => Outcome::Flag(pr.milestone.as_deref() == Some(value)),
            ConditionKind::State => Outcome::Flag(check_state(pr, value)),
            ConditionKind::ToBranch => Outcome::Flag(pr.base_branch == value),
            ConditionKind::CreatedAt => Outcome::Instant(pr.created_at),
            ConditionKind::HasTag => {
                let pattern = self
                    .label_pattern
                    .as_ref()
                    .ok_or_else(|| BotError::config(format!("'{}' has no pattern", self.key)))?;
                let labels = ctx.labels(forge, pr).await?;
                Outcome::Flag(labels.iter().any(|label| pattern.is_match(label)))
            }
            ConditionKind::Plus => {
                let comments = ctx.comments(forge, pr).await?;
                Outcome::Count(tally(comments, Vote::Up, approvers) as i64)
            }
            ConditionKind::Minus => {
                let comments = ctx.comments(forge, pr).await?;
                Outcome::Count(tally(comments, Vote::Down, approvers) as i64)
            }
        };
        Ok(outcome)
    }
}

fn check_state(pr: &PullRequest, value: &str) -> bool {
    if value == "merged" {
        pr.merged
    } else {
        pr.state.as_str() == value
    }
}

fn parse_threshold(key: &str, value: &str) -> BotResult<i64> {
    value.trim().parse::<i64>().map_err(|_| {
        BotError::config(format!(
            "condition '{key}' expects an integer, got '{value}'"
        ))
    })
}

/// Condition key/value pairs in declaration order.
///
/// Accepts either a sequence of maps or one flat map, so both of these
/// configure the same rule:
///
/// ```yaml
/// conditions:
///   - state: open
///   - plus__ge: 2
/// ```
///
/// ```yaml
/// conditions:
///   state: open
///   plus__ge: 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet(Vec<(String, String)>);

impl ConditionSet {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validates every pair, failing on the first bad one.
    pub fn compile(&self) -> BotResult<Vec<Condition>> {
        self.iter().map(|(k, v)| Condition::new(k, v)).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ConditionSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("condition values must be scalars, got {other:?}")),
    }
}

impl<'de> Deserialize<'de> for ConditionSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Sequence(Vec<serde_yaml::Mapping>),
            Flat(serde_yaml::Mapping),
        }

        let maps = match Raw::deserialize(deserializer)? {
            Raw::Sequence(maps) => maps,
            Raw::Flat(map) => vec![map],
        };

        let mut pairs = Vec::new();
        for map in maps {
            for (key, value) in map {
                let key = scalar_to_string(key).map_err(D::Error::custom)?;
                let value = scalar_to_string(value).map_err(D::Error::custom)?;
                pairs.push((key, value));
            }
        }
        Ok(ConditionSet(pairs))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::types::PrState;

    fn config_err(key: &str, value: &str) -> bool {
        matches!(Condition::new(key, value), Err(BotError::Configuration(_)))
    }

    #[test]
    fn test_key_parsing() {
        let cond = Condition::new("title_contains__not", "WIP").unwrap();
        assert_eq!(cond.kind(), ConditionKind::TitleContains);
        assert_eq!(cond.operator(), Some(Operator::Not));

        let cond = Condition::new("plus__ge", "2").unwrap();
        assert_eq!(cond.kind(), ConditionKind::Plus);
        assert_eq!(cond.operator(), Some(Operator::Ge));

        let cond = Condition::new("state", "open").unwrap();
        assert_eq!(cond.operator(), None);
    }

    #[test]
    fn test_invalid_conditions_are_rejected() {
        assert!(config_err("older_than", "today"));
        assert!(config_err("state__between", "open"));
        assert!(config_err("plus", "2"));
        assert!(config_err("minus__not", "1"));
        assert!(config_err("plus__ge", "two"));
        assert!(config_err("created_at__lt", "fuzzy::yesterday"));
        assert!(config_err("created_at", "relative::yesterday"));
        assert!(config_err("has_tag", "(unclosed"));
    }

    #[test]
    fn test_operator_compare() {
        assert_eq!(Operator::Gt.compare(2, 1), Some(true));
        assert_eq!(Operator::Ge.compare(1, 1), Some(true));
        assert_eq!(Operator::Eq.compare(1, 2), Some(false));
        assert_eq!(Operator::Ne.compare(1, 2), Some(true));
        assert_eq!(Operator::Lt.compare(1, 1), Some(false));
        assert_eq!(Operator::Le.compare(1, 1), Some(true));
        assert_eq!(Operator::Not.compare(1, 1), None);
    }

    #[test]
    fn test_check_state() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut pr = PullRequest {
            id: 1,
            number: 1,
            title: "x".to_string(),
            author: "alice".to_string(),
            state: PrState::Closed,
            merged: true,
            milestone: None,
            base_branch: "dev".to_string(),
            created_at: now - TimeDelta::days(1),
            updated_at: now,
        };
        assert!(check_state(&pr, "merged"));
        assert!(check_state(&pr, "closed"));
        assert!(!check_state(&pr, "open"));

        pr.merged = false;
        assert!(!check_state(&pr, "merged"));
    }

    #[test]
    fn test_condition_set_sequence_of_maps() {
        let yaml = r#"
- state: open
  title_contains: "[PROCEDURES]"
- to_branch: dev
  created_at__lt: "relative::0 days ago"
- title_contains__not: Blah
- plus__ge: 2
"#;
        let set: ConditionSet = serde_yaml::from_str(yaml).unwrap();
        let mut pairs: Vec<(&str, &str)> = set.iter().collect();
        pairs.sort();

        let mut expected = vec![
            ("state", "open"),
            ("title_contains", "[PROCEDURES]"),
            ("to_branch", "dev"),
            ("created_at__lt", "relative::0 days ago"),
            ("title_contains__not", "Blah"),
            ("plus__ge", "2"),
        ];
        expected.sort();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_condition_set_flat_map_keeps_declaration_order() {
        let yaml = r#"
title_contains__not: Blah
state: open
plus__ge: 2
to_branch: dev
"#;
        let set: ConditionSet = serde_yaml::from_str(yaml).unwrap();
        let pairs: Vec<(&str, &str)> = set.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("title_contains__not", "Blah"),
                ("state", "open"),
                ("plus__ge", "2"),
                ("to_branch", "dev"),
            ]
        );
        assert_eq!(set.compile().unwrap().len(), 4);
    }

    #[test]
    fn test_condition_set_rejects_nested_values() {
        let yaml = "state:\n  - open\n";
        assert!(serde_yaml::from_str::<ConditionSet>(yaml).is_err());
    }
}
