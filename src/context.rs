use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    error::{BotError, BotResult},
    forge::Forge,
    types::{Comment, PullRequest},
};

/// State that lives for exactly one run of the bot.
///
/// Comments and labels are fetched at most once per pull request and
/// reused by every rule that needs them, until [`RunContext::forget`]
/// drops them. Nothing here is persisted.
#[derive(Debug)]
pub struct RunContext {
    now: DateTime<Utc>,
    comments: HashMap<u64, Vec<Comment>>,
    labels: HashMap<u64, Vec<String>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Creates a context whose relative dates resolve against `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            comments: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub async fn comments<F>(&mut self, forge: &F, pr: &PullRequest) -> BotResult<&[Comment]>
    where
        F: Forge + ?Sized,
    {
        if !self.comments.contains_key(&pr.id) {
            let fetched = forge
                .fetch_comments(pr)
                .await
                .map_err(BotError::Transient)?;
            debug!(pr = pr.number, count = fetched.len(), "fetched comments");
            self.comments.insert(pr.id, fetched);
        }
        Ok(self
            .comments
            .get(&pr.id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    pub async fn labels<F>(&mut self, forge: &F, pr: &PullRequest) -> BotResult<&[String]>
    where
        F: Forge + ?Sized,
    {
        if !self.labels.contains_key(&pr.id) {
            let fetched = forge.fetch_labels(pr).await.map_err(BotError::Transient)?;
            debug!(pr = pr.number, labels = ?fetched, "fetched labels");
            self.labels.insert(pr.id, fetched);
        }
        Ok(self
            .labels
            .get(&pr.id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Drops everything memoized for `pr` once its rules have run.
    pub fn forget(&mut self, pr: &PullRequest) {
        self.comments.remove(&pr.id);
        self.labels.remove(&pr.id);
    }

    /// Records a comment the bot just posted so later rules in this run
    /// see it without refetching.
    pub fn remember_comment(&mut self, pr: &PullRequest, comment: Comment) {
        if let Some(comments) = self.comments.get_mut(&pr.id) {
            comments.push(comment);
        }
    }

    /// Records a label the bot just added.
    pub fn remember_label(&mut self, pr: &PullRequest, label: &str) {
        if let Some(labels) = self.labels.get_mut(&pr.id) {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
