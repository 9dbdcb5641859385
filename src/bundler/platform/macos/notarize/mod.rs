//! Notarization: submit, wait for the verdict, staple.
//!
//! A run either submits a fresh artifact or resumes waiting on an earlier
//! submission by id. Waiting polls `notarytool log` until the service has a
//! verdict; `Accepted` is stapled onto the artifact, anything else fails the
//! run with the service's explanation.

pub mod submission;

pub use submission::{
    HistoryEntry, HistoryResponse, NotarizationIssue, NotarizationLog, NotarizationSubmission,
    SubmissionStatus, SubmitResponse,
};

use super::{
    archive::ditto_archive,
    identity::SigningIdentity,
    tools::{Invocation, ToolOutput, ToolRunner},
};
use crate::bundler::{
    error::{Error, Result},
    utils::fs,
};
use serde::de::DeserializeOwned;
use std::{
    ffi::OsString,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// `notarytool` exit code for missing credentials, and for a log that is
/// not available yet.
pub const NOTARYTOOL_UNAVAILABLE: i32 = 69;

pub const DEFAULT_PROFILE_PREFIX: &str = "kodegen-macos";

/// How long to keep asking for a notarization log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// An hour, checking every ten seconds.
    fn default() -> Self {
        Self {
            max_attempts: 360,
            delay: Duration::from_secs(10),
        }
    }
}

/// Drives `xcrun notarytool` and `xcrun stapler`.
pub struct Notarizer<R> {
    runner: Arc<R>,
    retry: RetryPolicy,
    profile_prefix: String,
    input_enabled: bool,
}

impl<R: ToolRunner> Notarizer<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            retry: RetryPolicy::default(),
            profile_prefix: DEFAULT_PROFILE_PREFIX.to_string(),
            input_enabled: true,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_profile_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.profile_prefix = prefix.into();
        self
    }

    /// Whether credentials may be collected interactively.
    pub fn with_input(mut self, enabled: bool) -> Self {
        self.input_enabled = enabled;
        self
    }

    /// Keychain profile name for the identity's team.
    pub fn profile_for(&self, identity: &SigningIdentity) -> Result<String> {
        let team_id = identity.team_id().ok_or(Error::AdhocNotarization)?;
        Ok(format!("{}-{}", self.profile_prefix, team_id))
    }

    /// The file actually uploaded for `artifact`: a zip beside an app
    /// bundle, or the dmg/pkg itself.
    pub fn submission_path(artifact: &Path) -> Result<PathBuf> {
        let extension = artifact
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        match extension.as_str() {
            "app" => {
                let mut zip: OsString = artifact.as_os_str().to_os_string();
                zip.push(".zip");
                Ok(PathBuf::from(zip))
            }
            "dmg" | "pkg" => Ok(artifact.to_path_buf()),
            _ => Err(Error::UnsupportedNotarizationArtifact {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            }),
        }
    }

    /// Submits `artifact`, waits for the verdict and staples it.
    pub async fn notarize(
        &self,
        artifact: &Path,
        identity: &SigningIdentity,
    ) -> Result<NotarizationSubmission> {
        let mut submission = self.submit(artifact, identity).await?;
        self.finalize(&mut submission).await?;
        Ok(submission)
    }

    /// Waits on an earlier submission of `artifact` and staples the result.
    pub async fn resume(
        &self,
        artifact: &Path,
        identity: &SigningIdentity,
        submission_id: &str,
    ) -> Result<NotarizationSubmission> {
        let mut submission = self
            .validate_submission(artifact, identity, submission_id)
            .await?;
        self.finalize(&mut submission).await?;
        Ok(submission)
    }

    /// Uploads `artifact` and returns the submission.
    ///
    /// An app bundle is zipped for upload; the zip is removed again whether
    /// or not the upload succeeds.
    pub async fn submit(
        &self,
        artifact: &Path,
        identity: &SigningIdentity,
    ) -> Result<NotarizationSubmission> {
        let team_id = identity.team_id().ok_or(Error::AdhocNotarization)?;
        let profile = self.profile_for(identity)?;
        let upload = Self::submission_path(artifact)?;
        let is_archive = upload != artifact;

        let outcome = async {
            if is_archive {
                log::info!("Archiving {} for notarization...", file_name(artifact));
                ditto_archive(self.runner.as_ref(), artifact, &upload).await?;
            }
            self.upload(&upload, &profile, team_id).await
        }
        .await;

        if is_archive {
            if let Err(e) = fs::remove_file(&upload).await {
                log::warn!("{e}");
            }
        }

        let id = outcome?;
        log::info!("✓ Submitted {} for notarization (submission {})", file_name(artifact), id);
        Ok(NotarizationSubmission::in_progress(id, artifact, profile))
    }

    async fn upload(&self, upload: &Path, profile: &str, team_id: &str) -> Result<String> {
        let mut credentials_stored = false;
        loop {
            let invocation = Invocation::new("xcrun")
                .args(["notarytool", "submit"])
                .arg(upload)
                .args(["--keychain-profile", profile, "--output-format", "json"]);
            let output = self.runner.run(&invocation).await?;

            if output.is_success() {
                let response: SubmitResponse = parse_json("notarytool submit", &output)?;
                if let Some(message) = &response.message {
                    log::debug!("{message}");
                }
                return Ok(response.id);
            }

            if output.code == Some(NOTARYTOOL_UNAVAILABLE) && !credentials_stored {
                self.store_credentials(team_id, profile).await?;
                credentials_stored = true;
                continue;
            }

            log::debug!("notarytool submit failed: {}", output.stderr.trim());
            return Err(Error::NotarizationSubmit {
                path: upload.to_path_buf(),
                profile: profile.to_string(),
            });
        }
    }

    /// Stores notary credentials for `team_id` under `profile`. The tool
    /// reads the app-specific password from the terminal.
    async fn store_credentials(&self, team_id: &str, profile: &str) -> Result<()> {
        if !self.input_enabled {
            return Err(Error::MissingNotaryCredentials {
                profile: profile.to_string(),
                team_id: team_id.to_string(),
            });
        }

        log::warn!(
            "Notarization uses credentials stored in your Keychain, once per signing certificate. \
             They are authenticated with your Apple ID and an app-specific password, which you \
             can generate at https://appleid.apple.com under 'Sign-in and Security'."
        );

        let invocation = Invocation::new("xcrun")
            .args(["notarytool", "store-credentials", "--team-id", team_id, profile])
            .interactive();
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            return Err(Error::CredentialStorage {
                team_id: team_id.to_string(),
            });
        }
        Ok(())
    }

    /// Checks that `submission_id` is a submission of `artifact` made with
    /// `identity`'s credentials.
    pub async fn validate_submission(
        &self,
        artifact: &Path,
        identity: &SigningIdentity,
        submission_id: &str,
    ) -> Result<NotarizationSubmission> {
        if !artifact.exists() {
            return Err(Error::ResumeArtifactMissing {
                path: artifact.to_path_buf(),
            });
        }
        let profile = self.profile_for(identity)?;
        let expected_name = file_name(&Self::submission_path(artifact)?);

        let invocation = Invocation::new("xcrun").args([
            "notarytool",
            "history",
            "--keychain-profile",
            profile.as_str(),
            "--output-format",
            "json",
        ]);
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            log::debug!("notarytool history failed: {}", output.stderr.trim());
            return Err(Error::NotarizationHistory);
        }
        let history: HistoryResponse = parse_json("notarytool history", &output)?;

        let entry = history
            .history
            .iter()
            .find(|entry| entry.id == submission_id)
            .ok_or_else(|| Error::UnknownSubmission {
                submission_id: submission_id.to_string(),
            })?;

        if entry.name != expected_name {
            return Err(Error::SubmissionMismatch {
                submission_id: submission_id.to_string(),
                recorded_name: entry.name.clone(),
            });
        }

        Ok(NotarizationSubmission::in_progress(
            submission_id,
            artifact,
            profile,
        ))
    }

    /// Waits for the verdict and staples it; Ctrl-C stops waiting.
    pub async fn finalize(&self, submission: &mut NotarizationSubmission) -> Result<()> {
        self.finalize_until(submission, async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No handler; never interrupt.
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Like [`Notarizer::finalize`], but stops waiting when `interrupt`
    /// completes. The verdict is recorded on `submission`.
    pub async fn finalize_until<F>(
        &self,
        submission: &mut NotarizationSubmission,
        interrupt: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        log::info!(
            "Waiting for notarization of {} (submission {})...",
            file_name(&submission.artifact),
            submission.id
        );

        let log = tokio::select! {
            biased;
            _ = interrupt => {
                return Err(Error::NotarizationInterrupted {
                    submission_id: submission.id.clone(),
                });
            }
            log = self.wait_for_log(submission) => log?,
        };
        submission.record(&log);

        match submission.status.clone() {
            SubmissionStatus::Accepted => self.staple(&submission.artifact).await,
            SubmissionStatus::Invalid => Err(Error::NotarizationRejected(log.rejection_report())),
            SubmissionStatus::InProgress => {
                Err(Error::UnexpectedNotarizationStatus("In Progress".to_string()))
            }
            SubmissionStatus::Other(status) => Err(Error::UnexpectedNotarizationStatus(status)),
        }
    }

    /// Polls for the submission's log until it is available.
    ///
    /// Exhausting the retry budget returns the last "not yet available"
    /// failure.
    pub async fn wait_for_log(&self, submission: &NotarizationSubmission) -> Result<NotarizationLog> {
        let invocation = Invocation::new("xcrun").args([
            "notarytool",
            "log",
            "--keychain-profile",
            submission.profile.as_str(),
            submission.id.as_str(),
        ]);

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let output = self.runner.run(&invocation).await?;
            if output.is_success() {
                return parse_json("notarytool log", &output);
            }
            if output.code != Some(NOTARYTOOL_UNAVAILABLE) {
                log::debug!("notarytool log failed: {}", output.stderr.trim());
                return Err(Error::NotarizationStatusUnavailable);
            }

            log::debug!("Notarization log not available yet (attempt {attempt}/{attempts})");
            last_error = output.check(&invocation).err();
            if attempt < attempts && !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Err(last_error.unwrap_or(Error::NotarizationStatusUnavailable))
    }

    /// Attaches the notarization ticket to `artifact`.
    pub async fn staple(&self, artifact: &Path) -> Result<()> {
        log::info!("Stapling notarization onto {}...", file_name(artifact));
        let invocation = Invocation::new("xcrun")
            .args(["stapler", "staple"])
            .arg(artifact);
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            log::debug!("stapler failed: {}", output.stderr.trim());
            return Err(Error::Staple {
                path: artifact.to_path_buf(),
            });
        }
        log::info!("✓ Notarized {}", file_name(artifact));
        Ok(())
    }
}

fn parse_json<T: DeserializeOwned>(tool: &str, output: &ToolOutput) -> Result<T> {
    serde_json::from_str(&output.stdout).map_err(|error| Error::Json {
        tool: tool.to_string(),
        error,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
