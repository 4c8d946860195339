use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    context::RunContext,
    error::{BotError, BotResult},
    forge::Forge,
    types::{Comment, Milestone, PullRequest},
};

const AUTHOR_PLACEHOLDER: &str = "{author}";

/// Something a rule does to a pull request once all of its conditions
/// hold.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Posts `comment`, with `{author}` replaced by `@<login>`.
    Comment { comment: String },
    /// Adds the label named by `action_value`.
    AssignTag { action_value: String },
    /// Moves the pull request to the repository's next milestone.
    AssignNextMilestone,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Comment { .. } => "comment",
            Action::AssignTag { .. } => "assign_tag",
            Action::AssignNextMilestone => "assign_next_milestone",
        }
    }
}

/// Settings an action may need beyond the pull request itself.
#[derive(Debug, Clone, Default)]
pub struct ActionSettings {
    pub bot_user: Option<String>,
    pub next_milestone: Option<Milestone>,
}

/// Renders a comment template for `pr` as a single trimmed line.
pub fn render_comment(template: &str, pr: &PullRequest) -> String {
    template
        .replace(AUTHOR_PLACEHOLDER, &format!("@{}", pr.author))
        .trim()
        .replace("\r\n", " ")
        .replace('\n', " ")
}

/// Performs `action` on `pr`.
///
/// Comments are only posted when no identical comment exists yet on the
/// pull request.
pub async fn execute<F>(
    action: &Action,
    pr: &PullRequest,
    settings: &ActionSettings,
    forge: &F,
    ctx: &mut RunContext,
) -> BotResult<()>
where
    F: Forge + ?Sized,
{
    match action {
        Action::Comment { comment } => execute_comment(comment, pr, settings, forge, ctx).await,
        Action::AssignTag { action_value } => {
            forge
                .add_label(pr, action_value)
                .await
                .map_err(BotError::Transient)?;
            ctx.remember_label(pr, action_value);
            info!(pr = pr.number, label = %action_value, "added label");
            Ok(())
        }
        Action::AssignNextMilestone => {
            let milestone = settings.next_milestone.as_ref().ok_or_else(|| {
                BotError::config("assign_next_milestone requires repository.next_milestone")
            })?;
            forge
                .set_milestone(pr, milestone)
                .await
                .map_err(BotError::Transient)?;
            info!(pr = pr.number, milestone = %milestone.title, "assigned milestone");
            Ok(())
        }
    }
}

async fn execute_comment<F>(
    template: &str,
    pr: &PullRequest,
    settings: &ActionSettings,
    forge: &F,
    ctx: &mut RunContext,
) -> BotResult<()>
where
    F: Forge + ?Sized,
{
    let body = render_comment(template, pr);

    let comments = ctx.comments(forge, pr).await?;
    if let Some(previous) = comments.iter().find(|c| c.body == body) {
        if settings.bot_user.as_deref() == Some(previous.author.as_str()) {
            info!(pr = pr.number, "comment previously posted, not duplicating");
        } else {
            warn!(
                pr = pr.number,
                author = %previous.author,
                "identical comment already posted by a different user, not duplicating"
            );
        }
        return Ok(());
    }

    forge
        .post_comment(pr, &body)
        .await
        .map_err(BotError::Transient)?;
    info!(pr = pr.number, "posted comment");

    let author = settings.bot_user.clone().unwrap_or_default();
    ctx.remember_comment(pr, Comment::new(author, body));
    Ok(())
}
