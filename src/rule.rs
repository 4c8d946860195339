use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info};

use crate::{
    action::{self, Action, ActionSettings},
    condition::{Condition, ConditionSet},
    context::RunContext,
    error::BotResult,
    forge::Forge,
    types::PullRequest,
};

/// Repository-wide settings shared by every rule.
#[derive(Debug, Clone, Default)]
pub struct RuleSettings {
    /// Users whose votes count towards `plus` and `minus`.
    pub approvers: HashSet<String>,
    pub actions: ActionSettings,
    /// Evaluate and log, but never act.
    pub dry_run: bool,
}

/// A named set of conditions and the actions to take when all hold.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
    settings: Arc<RuleSettings>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        conditions: &ConditionSet,
        actions: Vec<Action>,
        settings: Arc<RuleSettings>,
    ) -> BotResult<Self> {
        let name = name.into();
        let conditions = conditions.compile()?;
        debug!(
            rule = %name,
            conditions = conditions.len(),
            actions = actions.len(),
            "registered rule"
        );
        Ok(Self {
            name,
            conditions,
            actions,
            settings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Condition key/value pairs in evaluation order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions.iter().map(|c| (c.key(), c.value()))
    }

    /// Evaluates a single `key`/`value` condition against `pr` in the
    /// context of this rule's approvers.
    pub async fn evaluate<F>(
        &self,
        pr: &PullRequest,
        key: &str,
        value: &str,
        forge: &F,
        ctx: &mut RunContext,
    ) -> BotResult<bool>
    where
        F: Forge + ?Sized,
    {
        Condition::new(key, value)?
            .evaluate(pr, &self.settings.approvers, forge, ctx)
            .await
    }

    /// Whether every condition holds for `pr`, stopping at the first that
    /// does not.
    pub async fn matches<F>(
        &self,
        pr: &PullRequest,
        forge: &F,
        ctx: &mut RunContext,
    ) -> BotResult<bool>
    where
        F: Forge + ?Sized,
    {
        for condition in &self.conditions {
            let result = condition
                .evaluate(pr, &self.settings.approvers, forge, ctx)
                .await?;
            debug!(
                rule = %self.name,
                pr = pr.number,
                "{}, {} => {}",
                condition.key(),
                condition.value(),
                result
            );
            if !result {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Applies the rule to `pr`, running its actions in order when it
    /// matches. Returns whether it matched.
    pub async fn apply<F>(
        &self,
        pr: &PullRequest,
        forge: &F,
        ctx: &mut RunContext,
    ) -> BotResult<bool>
    where
        F: Forge + ?Sized,
    {
        if !self.matches(pr, forge, ctx).await? {
            return Ok(false);
        }

        info!(rule = %self.name, pr = pr.number, "matched {}", pr);
        for action in &self.actions {
            if self.settings.dry_run {
                info!(
                    rule = %self.name,
                    pr = pr.number,
                    action = action.name(),
                    "dry run, skipping action"
                );
                continue;
            }
            debug!(rule = %self.name, pr = pr.number, action = action.name(), "executing action");
            action::execute(action, pr, &self.settings.actions, forge, ctx).await?;
        }
        Ok(true)
    }
}
