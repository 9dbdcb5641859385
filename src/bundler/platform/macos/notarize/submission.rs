//! `notarytool` JSON responses and the rejection report built from them.

use serde::Deserialize;
use std::path::PathBuf;

/// A submission the notary service knows about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotarizationSubmission {
    pub id: String,
    /// The artifact notarized and later stapled: the app bundle for zip
    /// submissions, otherwise the dmg or pkg itself.
    pub artifact: PathBuf,
    /// Keychain profile holding the notary credentials.
    pub profile: String,
    pub status: SubmissionStatus,
    /// Issues reported with the verdict.
    pub issues: Vec<NotarizationIssue>,
}

impl NotarizationSubmission {
    /// A submission still waiting for its verdict.
    pub fn in_progress(id: impl Into<String>, artifact: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            artifact: artifact.into(),
            profile: profile.into(),
            status: SubmissionStatus::InProgress,
            issues: Vec::new(),
        }
    }

    /// Takes the verdict from `log`. A terminal status is never replaced.
    pub fn record(&mut self, log: &NotarizationLog) {
        if self.status.is_terminal() {
            return;
        }
        self.status = log.verdict();
        self.issues = log.issues.clone().unwrap_or_default();
    }
}

/// `notarytool submit --output-format json`
#[derive(Clone, Debug, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// `notarytool history --output-format json`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// `notarytool log <id>`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationLog {
    pub status: String,
    #[serde(default)]
    pub status_summary: Option<String>,
    #[serde(default)]
    pub issues: Option<Vec<NotarizationIssue>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationIssue {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub doc_url: Option<String>,
}

/// Where a submission stands with the notary service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    InProgress,
    Accepted,
    Invalid,
    Other(String),
}

impl SubmissionStatus {
    /// `Accepted` and `Invalid` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Invalid)
    }
}

impl NotarizationLog {
    pub fn verdict(&self) -> SubmissionStatus {
        match self.status.as_str() {
            "Accepted" => SubmissionStatus::Accepted,
            "Invalid" => SubmissionStatus::Invalid,
            "In Progress" => SubmissionStatus::InProgress,
            other => SubmissionStatus::Other(other.to_string()),
        }
    }

    /// The body of a rejection error: the summary, then one bullet per issue.
    pub fn rejection_report(&self) -> String {
        let mut report = self
            .status_summary
            .clone()
            .unwrap_or_else(|| "No details provided".to_string());

        for issue in self.issues.iter().flatten() {
            report.push_str(&format!(
                "\n\n    * ({}) {} [{}]\n      {}\n      {}",
                issue.severity.as_deref().unwrap_or("?"),
                issue.path.as_deref().unwrap_or_default(),
                issue
                    .architecture
                    .as_deref()
                    .unwrap_or("unknown architecture"),
                issue.message.as_deref().unwrap_or_default(),
                issue
                    .doc_url
                    .as_deref()
                    .unwrap_or("(No additional help available)"),
            ));
        }
        report
    }
}
