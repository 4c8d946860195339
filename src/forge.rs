use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Comment, Milestone, PullRequest};

/// The code-hosting platform the bot reads from and acts on.
///
/// Every method is a network round trip; failures surface as transient
/// errors and cause the affected pull request to be retried next run.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Lists every pull request in the repository, open and closed.
    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>>;

    /// Fetches the full conversation of a pull request, oldest first.
    async fn fetch_comments(&self, pr: &PullRequest) -> Result<Vec<Comment>>;

    /// Fetches the labels of the issue backing a pull request.
    async fn fetch_labels(&self, pr: &PullRequest) -> Result<Vec<String>>;

    async fn add_label(&self, pr: &PullRequest, name: &str) -> Result<()>;

    async fn set_milestone(&self, pr: &PullRequest, milestone: &Milestone) -> Result<()>;

    async fn post_comment(&self, pr: &PullRequest, body: &str) -> Result<()>;

    /// Looks up a milestone by its exact title.
    async fn find_milestone(&self, title: &str) -> Result<Option<Milestone>>;
}
