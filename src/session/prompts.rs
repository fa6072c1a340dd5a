//! Prompt text sent to Devin when scoping or completing a GitHub issue.

use crate::github::GitHubIssue;

/// Sent when the user asks Devin to implement an issue it already scoped.
pub const IMPLEMENT_FOLLOW_UP: &str = "Now that you have scoped the issue, please implement the solution by \
making the necessary code changes to complete this GitHub issue.";

/// Which of the two issue workflows a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Scope,
    Complete,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scope" => Ok(Self::Scope),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid session mode: {}", s)),
        }
    }
}

fn issue_header(issue: &GitHubIssue) -> String {
    let labels = if issue.labels.is_empty() {
        "No labels".to_string()
    } else {
        format!(
            "Labels: {}",
            issue
                .labels
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    let body = issue
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or("No description provided");

    format!(
        "**Issue #{}: {}**\n**URL**: {}\n**{}**\n\n**Description:**\n{}",
        issue.number, issue.title, issue.html_url, labels, body
    )
}

pub fn scoping_prompt(issue: &GitHubIssue) -> String {
    format!(
        "Please analyze and scope this GitHub issue. Provide a detailed assessment of what would be \
required to implement this feature/fix.\n\n{}\n\n{}",
        issue_header(issue),
        SCOPING_CHECKLIST
    )
}

pub fn completing_prompt(issue: &GitHubIssue) -> String {
    format!(
        "Please implement a complete solution for this GitHub issue and open a pull request with \
the changes.\n\n{}\n\n{}",
        issue_header(issue),
        COMPLETING_CHECKLIST
    )
}

/// Prompt for a session that already has the issue in context.
pub fn follow_up_prompt(mode: SessionMode) -> String {
    match mode {
        SessionMode::Scope => format!(
            "Please scope the GitHub issue we discussed again, taking any new information into account.\n\n{}",
            SCOPING_CHECKLIST
        ),
        SessionMode::Complete => IMPLEMENT_FOLLOW_UP.to_string(),
    }
}

pub fn prompt_for(mode: SessionMode, issue: &GitHubIssue) -> String {
    match mode {
        SessionMode::Scope => scoping_prompt(issue),
        SessionMode::Complete => completing_prompt(issue),
    }
}

/// Session title shown in the Devin web app.
pub fn session_title(issue: &GitHubIssue) -> String {
    format!("GitHub Issue #{}: {}", issue.number, issue.title)
}

const SCOPING_CHECKLIST: &str = "Please provide:
1. **Technical Scope**: What areas of the codebase would be affected?
2. **Implementation Approach**: High-level strategy for implementing this
3. **Complexity Assessment**: How complex is this issue to implement?
4. **Key Challenges**: What are the main technical challenges?
5. **Dependencies**: What prerequisites or dependencies exist?
6. **Confidence Score**: Rate your confidence (1-10) for successful completion

Also set the structured output to {\"scope\": \"<one paragraph technical scope>\", \"confidence_score\": <1-10>}.

Focus on providing a thorough scoping analysis that will help with implementation planning.";

const COMPLETING_CHECKLIST: &str = "Please:
1. Implement the change with tests
2. Keep the diff focused on this issue
3. Open a pull request that references the issue number
4. Reply with a short summary of what changed once you are done";
