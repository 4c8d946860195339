use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::{
    action::ActionSettings,
    cache::ChangeTracker,
    config::Config,
    context::RunContext,
    forge::Forge,
    rule::{Rule, RuleSettings},
    types::PullRequest,
};

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Pull requests that were new or changed since the last run.
    pub examined: usize,
    /// Rule applications that matched, across all pull requests.
    pub matched: usize,
    /// Pull requests left unrecorded because a forge request or the cache
    /// write failed.
    pub failed: usize,
}

/// Applies the configured rules to every changed pull request.
pub struct MergerBot<F> {
    forge: F,
    rules: Vec<Rule>,
    tracker: ChangeTracker,
    dry_run: bool,
}

impl<F: Forge> MergerBot<F> {
    pub fn new(forge: F, rules: Vec<Rule>, tracker: ChangeTracker, dry_run: bool) -> Self {
        Self {
            forge,
            rules,
            tracker,
            dry_run,
        }
    }

    /// Builds the rules described by `config`, resolving the next
    /// milestone through `forge`.
    pub async fn from_config(
        config: &Config,
        forge: F,
        tracker: ChangeTracker,
        dry_run: bool,
    ) -> Result<Self> {
        let next_milestone = match &config.repository.next_milestone {
            Some(title) => Some(
                forge
                    .find_milestone(title)
                    .await?
                    .with_context(|| format!("Milestone '{}' does not exist", title))?,
            ),
            None => None,
        };

        let settings = Arc::new(RuleSettings {
            approvers: config
                .repository
                .pr_approvers
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
            actions: ActionSettings {
                bot_user: config.meta.bot_user.clone(),
                next_milestone,
            },
            dry_run,
        });

        let rules = config
            .repository
            .filters
            .iter()
            .map(|rule| {
                Rule::new(
                    &rule.name,
                    &rule.conditions,
                    rule.actions.clone(),
                    Arc::clone(&settings),
                )
                .with_context(|| format!("Invalid rule '{}'", rule.name))
            })
            .collect::<Result<Vec<_>>>()?;
        info!(rules = rules.len(), "registered rules");

        Ok(Self::new(forge, rules, tracker, dry_run))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Pull requests that are new or modified since their last record.
    pub async fn changed_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let mut changed = Vec::new();
        for pr in self.forge.list_pull_requests().await? {
            if self.tracker.is_changed(&pr)? {
                debug!(pr = pr.number, updated_at = %pr.updated_at, "pull request changed");
                changed.push(pr);
            }
        }
        Ok(changed)
    }

    /// Runs every rule over every changed pull request.
    ///
    /// A failing rule never stops the run. Only pull requests whose rules
    /// all completed without a forge failure are recorded, so the rest are
    /// looked at again next time.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with(RunContext::new()).await
    }

    pub async fn run_with(&self, mut ctx: RunContext) -> Result<RunSummary> {
        let changed = self.changed_pull_requests().await?;
        info!("Found {} PRs to examine", changed.len());

        let mut summary = RunSummary {
            examined: changed.len(),
            ..RunSummary::default()
        };

        for pr in &changed {
            debug!("Evaluating {}", pr);
            let mut complete = true;

            for rule in &self.rules {
                match rule.apply(pr, &self.forge, &mut ctx).await {
                    Ok(true) => summary.matched += 1,
                    Ok(false) => {}
                    Err(e) if e.is_transient() => {
                        warn!(rule = rule.name(), pr = pr.number, "{}", e);
                        complete = false;
                    }
                    Err(e) => {
                        error!(rule = rule.name(), pr = pr.number, "{}", e);
                    }
                }
            }

            ctx.forget(pr);

            if !complete {
                summary.failed += 1;
            } else if !self.dry_run {
                if let Err(e) = self.tracker.record(pr.id, pr.updated_at) {
                    error!(pr = pr.number, "{:#}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
