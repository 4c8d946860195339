use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::types::Comment;

// A vote is either a line holding only the bare token, or the emoji
// shortcode anywhere in the body.
static UPVOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(:\+1:|^[ \t]*\+1[ \t]*$)").expect("valid upvote regex"));
static DOWNVOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(:-1:|^[ \t]*-1[ \t]*$)").expect("valid downvote regex"));

/// Polarity of a vote comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    fn pattern(&self) -> &'static Regex {
        match self {
            Vote::Up => &UPVOTE,
            Vote::Down => &DOWNVOTE,
        }
    }

    /// Whether `body` casts this vote.
    pub fn matches(&self, body: &str) -> bool {
        // Bodies written on Windows keep a trailing '\r' on every line.
        self.pattern().is_match(&body.replace("\r\n", "\n"))
    }
}

/// Counts comments casting `vote` whose author is an approver.
pub fn tally(comments: &[Comment], vote: Vote, approvers: &HashSet<String>) -> usize {
    comments
        .iter()
        .filter(|comment| approvers.contains(&comment.author))
        .filter(|comment| vote.matches(&comment.body))
        .count()
}
