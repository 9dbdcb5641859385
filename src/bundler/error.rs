//! Error types for the merge, thin, sign and notarize stages.
//!
//! Every variant names the offending path, identity or submission so the
//! single top-level error message is actionable on its own.

use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Caller input was invalid; nothing was attempted.
    Configuration,
    /// An external tool failed unexpectedly.
    Toolchain,
    /// The filesystem or keychain is not in the state the stage requires.
    ResourceState,
    /// The user interrupted a resumable stage.
    Interrupted,
    /// Plain I/O failure.
    Io,
}

/// Errors produced by bundler operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Catch-all error with a free-form message.
    #[error("{0}")]
    GenericError(String),

    /// I/O error without path context.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// I/O error on a specific path.
    #[error("{context} {}: {error}", path.display())]
    Fs {
        context: String,
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix stripping failed.
    #[error("{0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// A notarytool response was not the JSON we expected.
    #[error("unable to parse {tool} output: {error}")]
    Json {
        tool: String,
        #[source]
        error: serde_json::Error,
    },

    /// Writing a property list failed.
    #[error("unable to write property list: {0}")]
    Plist(#[from] plist::Error),

    /// A required tool is not on PATH.
    #[error("{tool} could not be found. Install the Xcode command line tools (xcode-select --install).")]
    ToolNotFound { tool: String },

    /// A tool exited with an unexpected status.
    #[error("{command} failed (exit code {code:?}): {stderr}")]
    ToolExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    // --- merge / thin ---
    /// The merge destination is, contains or sits inside a source tree.
    #[error(
        "Cannot merge into {}: it overlaps the source tree {}",
        destination.display(),
        source.display()
    )]
    MergeOverlap { destination: PathBuf, r#source: PathBuf },

    /// `lipo -create` failed for a path.
    #[error("Unable to create fat library for {}", path.display())]
    FatMerge { path: PathBuf },

    /// `lipo -info` exited non-zero.
    #[error("Unable to inspect architectures in {}", path.display())]
    ArchitectureInspection { path: PathBuf },

    /// `lipo -info` produced output we could not parse.
    #[error("Unable to determine architectures in {}", path.display())]
    UnparseableArchitectures { path: PathBuf },

    /// `lipo -thin` failed.
    #[error("Unable to create thin binary from {}", path.display())]
    Thin { path: PathBuf },

    /// A fat binary is missing the requested slice.
    #[error("{} does not contain a {arch} slice.", path.display())]
    MissingSlice { path: PathBuf, arch: String },

    // --- identities ---
    /// The keychain could not be queried.
    #[error("Unable to run security find-identity.")]
    IdentityListing,

    /// An identity override matched nothing.
    #[error("Invalid {kind} signing identity {identity}")]
    InvalidIdentity { kind: String, identity: String },

    /// No code signing identity is available and ad-hoc signing is disallowed.
    #[error("No code signing identities could be found.")]
    NoSigningIdentities,

    /// No installer identity shares the application identity's team.
    #[error("No installer signing identities for team {team_id} could be found.")]
    NoInstallerIdentities { team_id: String },

    /// An identity name has no parenthesised team identifier.
    #[error("Couldn't extract Team ID from signing identity {name:?}")]
    MissingTeamId { name: String },

    /// Interactive selection was needed but input is disabled.
    #[error("{0}")]
    InputDisabled(String),

    // --- signing ---
    /// `codesign` failed for a reason other than an unsignable object.
    #[error("Unable to code sign {}.", path.display())]
    Signing { path: PathBuf },

    // --- packaging ---
    /// The project has no license file, which the installer requires.
    #[error(
        "Your project does not contain a LICENSE file.\n\n\
         Create a file named `LICENSE` at {} with your app's licensing terms.",
        path.display()
    )]
    MissingLicense { path: PathBuf },

    /// The requested packaging format cannot be used.
    #[error("{0}")]
    InvalidPackagingFormat(String),

    // --- notarization ---
    /// Notarization was requested with the ad-hoc identity.
    #[error("Can't notarize an app with an ad-hoc signing identity")]
    AdhocNotarization,

    /// The artifact type has no notarization flow.
    #[error("Don't know how to notarize a file of type {extension}")]
    UnsupportedNotarizationArtifact { extension: String },

    /// Keychain has no credentials for the profile and input is disabled.
    #[error(
        "The keychain does not contain credentials for the profile {profile}.\n\
         You can store these credentials by invoking:\n\n    \
         $ xcrun notarytool store-credentials --team-id {team_id} {profile}\n"
    )]
    MissingNotaryCredentials { profile: String, team_id: String },

    /// `notarytool store-credentials` failed.
    #[error("Unable to store credentials for team ID {team_id}.")]
    CredentialStorage { team_id: String },

    /// `notarytool submit` failed.
    #[error(
        "Unable to submit {} for notarization.\n\
         To find the cause of this failure, get the submission ID by running:\n\n    \
         xcrun notarytool history --keychain-profile {profile}\n\n\
         Then run:\n\n    \
         xcrun notarytool log --keychain-profile {profile} <submission-id>\n\n\
         to generate a full log of the error.",
        path.display()
    )]
    NotarizationSubmit { path: PathBuf, profile: String },

    /// The notarization history could not be fetched.
    #[error(
        "Unable to invoke notarytool to determine validity of submission ID.\n\
         Are you sure this is the identity that was used to notarize the app?"
    )]
    NotarizationHistory,

    /// The submission id is not in the notarization history.
    #[error("{submission_id} is not a known submission ID for this identity.")]
    UnknownSubmission { submission_id: String },

    /// The submission id belongs to a different artifact.
    #[error(
        "{submission_id} is not a submission ID for this project. \
         It notarizes a file named {recorded_name}"
    )]
    SubmissionMismatch {
        submission_id: String,
        recorded_name: String,
    },

    /// Resuming requires the artifact to still exist.
    #[error(
        "Notarization cannot be resumed, as the notarization artefact associated with this app ({}) does not exist.",
        path.display()
    )]
    ResumeArtifactMissing { path: PathBuf },

    /// `notarytool log` failed with a non-transient exit code.
    #[error("Unknown problem retrieving notarization status.")]
    NotarizationStatusUnavailable,

    /// The service rejected the submission.
    #[error("Notarization was rejected: {0}")]
    NotarizationRejected(String),

    /// The service returned a status we do not understand.
    #[error("Unexpected notarization status: {0}")]
    UnexpectedNotarizationStatus(String),

    /// `stapler staple` failed.
    #[error("Unable to staple notarization onto {}.", path.display())]
    Staple { path: PathBuf },

    /// The user interrupted polling; the submission can be resumed.
    #[error(
        "Notarization was interrupted. To resume waiting for submission {submission_id}, re-run with:\n\n    \
         --resume {submission_id}\n"
    )]
    NotarizationInterrupted { submission_id: String },
}

impl Error {
    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MergeOverlap { .. }
            | Error::InvalidIdentity { .. }
            | Error::NoSigningIdentities
            | Error::MissingTeamId { .. }
            | Error::InputDisabled(_)
            | Error::MissingLicense { .. }
            | Error::InvalidPackagingFormat(_)
            | Error::AdhocNotarization
            | Error::UnsupportedNotarizationArtifact { .. }
            | Error::MissingNotaryCredentials { .. }
            | Error::UnknownSubmission { .. }
            | Error::SubmissionMismatch { .. }
            | Error::NotarizationHistory => ErrorCategory::Configuration,
            Error::MissingSlice { .. }
            | Error::NoInstallerIdentities { .. }
            | Error::ResumeArtifactMissing { .. } => ErrorCategory::ResourceState,
            Error::NotarizationInterrupted { .. } => ErrorCategory::Interrupted,
            Error::IoError(_) | Error::Fs { .. } | Error::WalkDir(_) | Error::StripPrefix(_) => {
                ErrorCategory::Io
            }
            _ => ErrorCategory::Toolchain,
        }
    }
}

/// Attaches filesystem context to I/O results.
pub trait ErrorExt<T> {
    /// Wraps the error with a description and the path it concerns.
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Converts options and foreign errors into [`Error::GenericError`].
pub trait Context<T> {
    /// Uses `msg` as the error message.
    fn context<C: Display>(self, msg: C) -> Result<T>;

    /// Lazily builds the error message.
    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: Display>(self, msg: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(msg.to_string()))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

impl<T> Context<T> for Result<T> {
    fn context<C: Display>(self, msg: C) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{msg}: {e}")))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{}: {e}", f())))
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}
