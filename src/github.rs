use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::{
    Octocrab,
    models::{self, IssueState},
    params,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    forge::Forge,
    types::{Comment, Milestone, PrState, PullRequest, Repo},
};

const PAGE_SIZE: u8 = 100;
const GHOST_USER: &str = "ghost";

pub fn get_github_token() -> Result<String> {
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN", "GITHUB_OAUTH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            return Ok(token);
        }
    }

    let output = Command::new("gh").args(["auth", "token"]).output()?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// Creates an authenticated GitHub client using available credentials.
pub fn setup_github_client() -> Result<Octocrab> {
    let token = get_github_token().context("Failed to obtain GitHub authentication token")?;
    Octocrab::builder()
        .personal_token(token)
        .build()
        .context("Failed to create GitHub client")
}

#[derive(Debug, Deserialize)]
struct MilestoneEntry {
    number: u64,
    title: String,
}

/// [`Forge`] backed by the GitHub REST API.
pub struct GitHub {
    client: Octocrab,
    repo: Repo,
}

impl GitHub {
    pub fn new(client: Octocrab, repo: Repo) -> Self {
        Self { client, repo }
    }

    /// One page of the repository's open milestones, numbered from 1.
    async fn milestone_page(&self, page: u32) -> Result<Vec<MilestoneEntry>> {
        let route = format!("/repos/{}/{}/milestones", self.repo.owner(), self.repo.name());
        self.client
            .get(
                route,
                Some(&serde_json::json!({
                    "state": "open",
                    "per_page": PAGE_SIZE,
                    "page": page,
                })),
            )
            .await
            .with_context(|| format!("Failed to list milestones of {} (page {page})", self.repo))
    }
}

/// Converts the REST pull request model into the bot's view of it.
pub fn convert_pull_request(pr: models::pulls::PullRequest) -> Result<PullRequest> {
    let state = match pr.state {
        Some(IssueState::Open) => PrState::Open,
        Some(IssueState::Closed) => PrState::Closed,
        other => anyhow::bail!("PR #{} has unsupported state {:?}", pr.number, other),
    };
    let created_at = pr
        .created_at
        .with_context(|| format!("PR #{} has no creation time", pr.number))?;

    Ok(PullRequest {
        id: pr.id.0,
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        author: pr
            .user
            .map(|user| user.login)
            .unwrap_or_else(|| GHOST_USER.to_string()),
        state,
        merged: pr.merged_at.is_some(),
        milestone: pr.milestone.map(|m| m.title),
        base_branch: pr.base.ref_field,
        created_at,
        updated_at: pr.updated_at.unwrap_or(created_at),
    })
}

#[async_trait]
impl Forge for GitHub {
    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let first_page = self
            .client
            .pulls(self.repo.owner(), self.repo.name())
            .list()
            .state(params::State::All)
            .per_page(PAGE_SIZE)
            .send()
            .await
            .with_context(|| format!("Failed to list pull requests of {}", self.repo))?;
        let all = self
            .client
            .all_pages(first_page)
            .await
            .with_context(|| format!("Failed to page through pull requests of {}", self.repo))?;
        debug!(count = all.len(), repo = %self.repo, "listed pull requests");

        all.into_iter().map(convert_pull_request).collect()
    }

    async fn fetch_comments(&self, pr: &PullRequest) -> Result<Vec<Comment>> {
        let first_page = self
            .client
            .issues(self.repo.owner(), self.repo.name())
            .list_comments(pr.number)
            .per_page(PAGE_SIZE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch comments of PR #{}", pr.number))?;
        let comments = self.client.all_pages(first_page).await?;

        Ok(comments
            .into_iter()
            .map(|c| Comment::new(c.user.login, c.body.unwrap_or_default()))
            .collect())
    }

    async fn fetch_labels(&self, pr: &PullRequest) -> Result<Vec<String>> {
        let first_page = self
            .client
            .issues(self.repo.owner(), self.repo.name())
            .list_labels_for_issue(pr.number)
            .per_page(PAGE_SIZE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch labels of PR #{}", pr.number))?;
        let labels = self.client.all_pages(first_page).await?;

        Ok(labels.into_iter().map(|label| label.name).collect())
    }

    async fn add_label(&self, pr: &PullRequest, name: &str) -> Result<()> {
        self.client
            .issues(self.repo.owner(), self.repo.name())
            .add_labels(pr.number, &[name.to_string()])
            .await
            .with_context(|| format!("Failed to add label '{}' to PR #{}", name, pr.number))?;
        Ok(())
    }

    async fn set_milestone(&self, pr: &PullRequest, milestone: &Milestone) -> Result<()> {
        // Milestones can only be changed through the issue backing the PR.
        self.client
            .issues(self.repo.owner(), self.repo.name())
            .update(pr.number)
            .milestone(milestone.number)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to set milestone '{}' on PR #{}",
                    milestone.title, pr.number
                )
            })?;
        Ok(())
    }

    async fn post_comment(&self, pr: &PullRequest, body: &str) -> Result<()> {
        self.client
            .issues(self.repo.owner(), self.repo.name())
            .create_comment(pr.number, body)
            .await
            .with_context(|| format!("Failed to comment on PR #{}", pr.number))?;
        Ok(())
    }

    async fn find_milestone(&self, title: &str) -> Result<Option<Milestone>> {
        find_milestone_in_pages(move |page| self.milestone_page(page), title).await
    }
}

/// Scans milestone pages in order until `title` turns up or a short page
/// marks the end of the listing.
async fn find_milestone_in_pages<F, Fut>(
    mut fetch_page: F,
    title: &str,
) -> Result<Option<Milestone>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<MilestoneEntry>>>,
{
    for page in 1.. {
        let entries = fetch_page(page).await?;
        let last = entries.len() < PAGE_SIZE as usize;
        if let Some(m) = entries.into_iter().find(|m| m.title == title) {
            debug!(page, number = m.number, "found milestone '{}'", title);
            return Ok(Some(Milestone {
                number: m.number,
                title: m.title,
            }));
        }
        if last {
            break;
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn listing(count: u64) -> Vec<MilestoneEntry> {
        (1..=count)
            .map(|number| MilestoneEntry {
                number,
                title: format!("{}.{:02}", 17 + number / 12, number % 12),
            })
            .collect()
    }

    async fn search(all: Vec<MilestoneEntry>, title: &str) -> (Option<Milestone>, u32) {
        let fetched = Arc::new(AtomicU32::new(0));
        let pages: Vec<Vec<MilestoneEntry>> = {
            let mut all = all.into_iter().peekable();
            let mut pages = Vec::new();
            while all.peek().is_some() {
                pages.push(all.by_ref().take(PAGE_SIZE as usize).collect());
            }
            pages
        };
        let counter = Arc::clone(&fetched);
        let found = find_milestone_in_pages(
            move |page| {
                counter.fetch_add(1, Ordering::SeqCst);
                let entries = pages
                    .get(page as usize - 1)
                    .map(|p| {
                        p.iter()
                            .map(|m| MilestoneEntry {
                                number: m.number,
                                title: m.title.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                async move { Ok(entries) }
            },
            title,
        )
        .await
        .unwrap();
        (found, fetched.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_find_milestone_beyond_first_page() {
        let all = listing(150);
        let wanted = all[120].title.clone();

        let (found, pages) = search(all, &wanted).await;
        assert_eq!(
            found,
            Some(Milestone {
                number: 121,
                title: wanted,
            })
        );
        assert_eq!(pages, 2);
    }

    #[tokio::test]
    async fn test_find_milestone_stops_at_short_page() {
        let (found, pages) = search(listing(150), "99.99").await;
        assert_eq!(found, None);
        assert_eq!(pages, 2);
    }

    #[tokio::test]
    async fn test_find_milestone_full_last_page_needs_one_more_request() {
        let (found, pages) = search(listing(100), "99.99").await;
        assert_eq!(found, None);
        assert_eq!(pages, 2);
    }
}
