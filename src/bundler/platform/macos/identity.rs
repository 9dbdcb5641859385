//! Code signing identities and how one gets chosen.
//!
//! Identities come from `security find-identity`. An application identity
//! may also be the ad-hoc identity; an installer identity must belong to the
//! same team as the application identity it accompanies.

use super::tools::{Invocation, ToolRunner};
use crate::bundler::error::{Error, Result};
use regex::Regex;
use std::{
    io::{BufRead, Write},
    sync::{Arc, LazyLock},
};
use tokio::sync::OnceCell;

/// The identity id `codesign` treats as ad-hoc.
pub const ADHOC_ID: &str = "-";

pub const ADHOC_NAME: &str =
    "Ad-hoc identity. The resulting package will run but cannot be re-distributed.";

/// One `find-identity` line: index, certificate checksum, quoted name.
const IDENTITY_LINE_PATTERN: &str = r#"^\s*\d+\) ([0-9A-F]{40}) "(.*)""#;

/// The last parenthesised group of upper-case letters and digits.
const TEAM_ID_PATTERN: &str = r".*\(([\dA-Z]+)\)";

type CompiledPattern = LazyLock<std::result::Result<Regex, regex::Error>>;

static IDENTITY_LINE: CompiledPattern = LazyLock::new(|| Regex::new(IDENTITY_LINE_PATTERN));

static TEAM_ID: CompiledPattern = LazyLock::new(|| Regex::new(TEAM_ID_PATTERN));

fn compiled(pattern: &'static CompiledPattern) -> Result<&'static Regex> {
    LazyLock::force(pattern)
        .as_ref()
        .map_err(|e| Error::GenericError(format!("invalid identity pattern: {e}")))
}

/// An identity to sign with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningIdentity {
    /// Self-signing without a certificate. Runs locally, cannot be notarized.
    Adhoc,
    /// A certificate in the keychain.
    Keychain {
        /// 40 hex digit certificate checksum.
        id: String,
        name: String,
        team_id: String,
    },
}

impl SigningIdentity {
    /// Builds a keychain identity, extracting the team id from `name`.
    pub fn keychain(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let team_id = team_id_from_name(&name)?.ok_or_else(|| Error::MissingTeamId {
            name: name.clone(),
        })?;
        Ok(Self::Keychain {
            id: id.into(),
            name,
            team_id,
        })
    }

    /// The value passed to `codesign --sign`.
    pub fn id(&self) -> &str {
        match self {
            Self::Adhoc => ADHOC_ID,
            Self::Keychain { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Adhoc => ADHOC_NAME,
            Self::Keychain { name, .. } => name,
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            Self::Adhoc => None,
            Self::Keychain { team_id, .. } => Some(team_id),
        }
    }

    pub fn is_adhoc(&self) -> bool {
        matches!(self, Self::Adhoc)
    }
}

/// Extracts the team id, the last parenthesised group of upper-case letters
/// and digits, from an identity display name.
///
/// `"Developer ID Application: Example Corp Ltd (Z2K4383DLE)"` → `Z2K4383DLE`
pub fn team_id_from_name(name: &str) -> Result<Option<String>> {
    Ok(compiled(&TEAM_ID)?
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string()))
}

/// One line of `security find-identity` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeychainEntry {
    pub id: String,
    pub name: String,
}

/// Parses `security find-identity -v` output, keeping keychain order.
pub fn parse_identities(output: &str) -> Result<Vec<KeychainEntry>> {
    let pattern = compiled(&IDENTITY_LINE)?;
    Ok(output
        .lines()
        .filter_map(|line| pattern.captures(line))
        .map(|captures| KeychainEntry {
            id: captures[1].to_string(),
            name: captures[2].to_string(),
        })
        .collect())
}

/// Queries the keychain through `security`.
pub struct Keychain<R> {
    runner: Arc<R>,
}

impl<R: ToolRunner> Keychain<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Lists valid identities, restricted to `policy` (e.g. `codesigning`)
    /// when given.
    pub async fn identities(&self, policy: Option<&str>) -> Result<Vec<KeychainEntry>> {
        let mut invocation = Invocation::new("security").arg("find-identity").arg("-v");
        if let Some(policy) = policy {
            invocation = invocation.arg("-p").arg(policy);
        }
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            log::debug!("security find-identity failed: {}", output.stderr.trim());
            return Err(Error::IdentityListing);
        }
        parse_identities(&output.stdout)
    }
}

/// Which kind of identity is being chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    Application,
    Installer,
}

impl IdentityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Installer => "installer",
        }
    }

    /// The command line option that selects this kind of identity.
    pub fn option(self) -> &'static str {
        match self {
            Self::Application => "--identity",
            Self::Installer => "--installer-identity",
        }
    }
}

/// Asks the user to pick one of several identities.
pub trait IdentityPrompt: Send + Sync {
    /// Returns the index of the chosen entry in `options`.
    fn choose(&self, kind: IdentityKind, options: &[KeychainEntry]) -> Result<usize>;
}

/// Numbered menu on stdout, answer read from stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinPrompt;

impl IdentityPrompt for StdinPrompt {
    fn choose(&self, kind: IdentityKind, options: &[KeychainEntry]) -> Result<usize> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            writeln!(stdout)?;
            writeln!(stdout, "Select {} signing identity to use:", kind.label())?;
            writeln!(stdout)?;
            for (index, option) in options.iter().enumerate() {
                writeln!(stdout, "  {}) {}", index + 1, option.name)?;
            }
            writeln!(stdout)?;
            write!(stdout, "> ")?;
            stdout.flush()?;

            let mut answer = String::new();
            if stdin.lock().read_line(&mut answer)? == 0 {
                return Err(Error::InputDisabled(format!(
                    "No {} signing identity was selected.",
                    kind.label()
                )));
            }
            match answer.trim().parse::<usize>() {
                Ok(choice) if (1..=options.len()).contains(&choice) => return Ok(choice - 1),
                _ => writeln!(stdout, "Invalid selection; enter a number between 1 and {}.", options.len())?,
            }
        }
    }
}

/// Refuses to choose; used when input is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInputPrompt;

impl IdentityPrompt for NoInputPrompt {
    fn choose(&self, kind: IdentityKind, _options: &[KeychainEntry]) -> Result<usize> {
        Err(Error::InputDisabled(format!(
            "Input is disabled; cannot select an {} signing identity. Specify one with {}.",
            kind.label(),
            kind.option()
        )))
    }
}

impl<T: IdentityPrompt + ?Sized> IdentityPrompt for Box<T> {
    fn choose(&self, kind: IdentityKind, options: &[KeychainEntry]) -> Result<usize> {
        (**self).choose(kind, options)
    }
}

/// The stdin menu, or [`NoInputPrompt`] when input is disabled.
pub fn prompt_for(input_enabled: bool) -> Box<dyn IdentityPrompt> {
    if input_enabled {
        Box::new(StdinPrompt)
    } else {
        Box::new(NoInputPrompt)
    }
}

/// Resolves application and installer identities for one packaging run.
///
/// The code signing identity list is read from the keychain once and reused.
pub struct IdentityResolver<R, P> {
    keychain: Keychain<R>,
    prompt: P,
    codesigning: OnceCell<Vec<KeychainEntry>>,
}

impl<R: ToolRunner, P: IdentityPrompt> IdentityResolver<R, P> {
    pub fn new(runner: Arc<R>, prompt: P) -> Self {
        Self {
            keychain: Keychain::new(runner),
            prompt,
            codesigning: OnceCell::new(),
        }
    }

    async fn codesigning_identities(&self) -> Result<&[KeychainEntry]> {
        self.codesigning
            .get_or_try_init(|| self.keychain.identities(Some("codesigning")))
            .await
            .map(Vec::as_slice)
    }

    /// Selects the application signing identity.
    ///
    /// An `identity_override` is matched against checksums, then full names,
    /// then name substrings, and is returned without prompting. Otherwise
    /// the user chooses, even when there is only one keychain identity and
    /// the ad-hoc identity is the alternative.
    pub async fn select_identity(
        &self,
        identity_override: Option<&str>,
        allow_adhoc: bool,
    ) -> Result<SigningIdentity> {
        let mut options = self.codesigning_identities().await?.to_vec();
        if options.is_empty() && !allow_adhoc {
            return Err(Error::NoSigningIdentities);
        }
        if allow_adhoc {
            options.push(KeychainEntry {
                id: ADHOC_ID.to_string(),
                name: ADHOC_NAME.to_string(),
            });
        }

        self.resolve(IdentityKind::Application, identity_override, &options)
    }

    /// Selects an installer identity from the same team as `app_identity`.
    pub async fn select_installer_identity(
        &self,
        identity_override: Option<&str>,
        app_identity: &SigningIdentity,
    ) -> Result<SigningIdentity> {
        let Some(team_id) = app_identity.team_id() else {
            return Err(Error::InvalidIdentity {
                kind: IdentityKind::Application.label().to_string(),
                identity: app_identity.name().to_string(),
            });
        };

        let app_identities = self.codesigning_identities().await?;
        let mut options = Vec::new();
        for entry in self.keychain.identities(None).await? {
            let same_team = team_id_from_name(&entry.name)?.as_deref() == Some(team_id);
            if same_team && !app_identities.iter().any(|app| app.id == entry.id) {
                options.push(entry);
            }
        }

        if options.is_empty() {
            return Err(Error::NoInstallerIdentities {
                team_id: team_id.to_string(),
            });
        }

        self.resolve(IdentityKind::Installer, identity_override, &options)
    }

    fn resolve(
        &self,
        kind: IdentityKind,
        identity_override: Option<&str>,
        options: &[KeychainEntry],
    ) -> Result<SigningIdentity> {
        if let Some(wanted) = identity_override {
            let found = options
                .iter()
                .find(|entry| entry.id == wanted)
                .or_else(|| options.iter().find(|entry| entry.name == wanted))
                .or_else(|| options.iter().find(|entry| entry.name.contains(wanted)));
            return match found {
                Some(entry) => to_identity(entry),
                None => Err(Error::InvalidIdentity {
                    kind: kind.label().to_string(),
                    identity: wanted.to_string(),
                }),
            };
        }

        let index = self.prompt.choose(kind, options)?;
        let entry = options.get(index).ok_or_else(|| {
            Error::GenericError(format!("Identity selection {index} is out of range"))
        })?;

        if entry.id == ADHOC_ID {
            log::info!(
                "In the future, you could specify this signing identity by passing --adhoc-sign"
            );
        } else {
            log::info!(
                "In the future, you could specify this signing identity by passing {} {} or {} \"{}\"",
                kind.option(),
                entry.id,
                kind.option(),
                entry.name
            );
        }

        to_identity(entry)
    }
}

fn to_identity(entry: &KeychainEntry) -> Result<SigningIdentity> {
    if entry.id == ADHOC_ID {
        Ok(SigningIdentity::Adhoc)
    } else {
        SigningIdentity::keychain(&entry.id, &entry.name)
    }
}


#[cfg(test)]
mod tests {
    use super::super::tools::{ToolOutput, fake::FakeRunner};
    use super::test_support::*;
    use super::*;

    fn runner_with(codesigning: &[(&str, &str)]) -> Arc<FakeRunner> {
        let runner = Arc::new(FakeRunner::new());
        runner.push(ToolOutput::success(find_identity_output(codesigning)));
        runner
    }

    #[test]
    fn team_id_is_last_parenthesised_group() {
        assert_eq!(
            team_id_from_name("Developer ID Application: Example Corp Ltd (Z2K4383DLE)")
                .unwrap()
                .as_deref(),
            Some("Z2K4383DLE")
        );
        assert_eq!(
            team_id_from_name("Developer ID Application: Corp (Europe) Ltd (Z2K4383DLE)")
                .unwrap()
                .as_deref(),
            Some("Z2K4383DLE")
        );
        assert_eq!(team_id_from_name("Developer ID Application: No Team").unwrap(), None);
    }

    #[test]
    fn identity_patterns_compile() {
        assert!(Regex::new(IDENTITY_LINE_PATTERN).is_ok());
        assert!(Regex::new(TEAM_ID_PATTERN).is_ok());
        assert!(compiled(&IDENTITY_LINE).is_ok());
        assert!(compiled(&TEAM_ID).is_ok());
    }

    #[test]
    fn keychain_identity_without_team_fails() {
        let err = SigningIdentity::keychain(APP_ID, "Nameless").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Couldn't extract Team ID from signing identity \"Nameless\""
        );
    }

    #[test]
    fn adhoc_identity_properties() {
        let adhoc = SigningIdentity::Adhoc;
        assert_eq!(adhoc.id(), "-");
        assert_eq!(adhoc.name(), ADHOC_NAME);
        assert_eq!(adhoc.team_id(), None);
        assert!(adhoc.is_adhoc());
        assert!(!app_identity().is_adhoc());
        assert_eq!(app_identity().team_id(), Some("DEADBEEF"));
    }

    #[test]
    fn parses_find_identity_output() {
        let output = find_identity_output(&[(APP_ID, APP_NAME), (OTHER_ID, OTHER_NAME)]);
        let parsed = parse_identities(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, APP_ID);
        assert_eq!(parsed[1].name, OTHER_NAME);
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let runner = Arc::new(FakeRunner::new());
        runner.push(ToolOutput::failure(1, "security: error"));
        let err = Keychain::new(runner).identities(None).await.unwrap_err();
        assert_eq!(err.to_string(), "Unable to run security find-identity.");
    }

    #[tokio::test]
    async fn override_by_id_skips_prompt() {
        let runner = runner_with(&[(APP_ID, APP_NAME), (OTHER_ID, OTHER_NAME)]);
        let prompt = Arc::new(ScriptedPrompt::answering(0));
        let resolver = IdentityResolver::new(runner.clone(), prompt.clone());

        let identity = resolver.select_identity(Some(OTHER_ID), true).await.unwrap();

        assert_eq!(identity.id(), OTHER_ID);
        assert!(prompt.offered.lock().unwrap().is_empty());
        assert_eq!(
            runner.command_lines(),
            vec!["security find-identity -v -p codesigning"]
        );
    }

    #[tokio::test]
    async fn override_by_name_and_substring() {
        let runner = runner_with(&[(APP_ID, APP_NAME), (OTHER_ID, OTHER_NAME)]);
        let resolver = IdentityResolver::new(runner, NoInputPrompt);

        let by_name = resolver.select_identity(Some(APP_NAME), true).await.unwrap();
        assert_eq!(by_name.id(), APP_ID);

        let by_part = resolver.select_identity(Some("Jane Smith"), true).await.unwrap();
        assert_eq!(by_part.id(), OTHER_ID);

        let adhoc = resolver.select_identity(Some("-"), true).await.unwrap();
        assert!(adhoc.is_adhoc());
    }

    #[tokio::test]
    async fn unknown_override_is_configuration_error() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        let resolver = IdentityResolver::new(runner, NoInputPrompt);
        let err = resolver.select_identity(Some("nobody"), true).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid application signing identity nobody");
    }

    #[tokio::test]
    async fn single_identity_still_prompts_when_adhoc_allowed() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        let prompt = Arc::new(ScriptedPrompt::answering(1));
        let resolver = IdentityResolver::new(runner, prompt.clone());

        let identity = resolver.select_identity(None, true).await.unwrap();

        assert!(identity.is_adhoc());
        let offered = prompt.offered.lock().unwrap();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].len(), 2);
        assert_eq!(offered[0][1].id, ADHOC_ID);
    }

    #[tokio::test]
    async fn adhoc_not_offered_when_disallowed() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        let resolver = IdentityResolver::new(runner, NoInputPrompt);

        let err = resolver.select_identity(Some("-"), false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity { .. }));
    }

    #[tokio::test]
    async fn no_identities_without_adhoc_fails() {
        let runner = runner_with(&[]);
        let resolver = IdentityResolver::new(runner, NoInputPrompt);
        let err = resolver.select_identity(None, false).await.unwrap_err();
        assert!(matches!(err, Error::NoSigningIdentities));
    }

    #[tokio::test]
    async fn keychain_is_queried_once_per_run() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        let resolver = IdentityResolver::new(runner.clone(), NoInputPrompt);
        resolver.select_identity(Some(APP_ID), true).await.unwrap();
        resolver.select_identity(Some(APP_ID), true).await.unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn installer_identity_matches_team_and_excludes_app_identities() {
        let runner = runner_with(&[(APP_ID, APP_NAME), (OTHER_ID, OTHER_NAME)]);
        runner.push(ToolOutput::success(find_identity_output(&[
            (APP_ID, APP_NAME),
            (OTHER_ID, OTHER_NAME),
            (INSTALLER_ID, INSTALLER_NAME),
        ])));
        let prompt = Arc::new(ScriptedPrompt::answering(0));
        let resolver = IdentityResolver::new(runner.clone(), prompt.clone());

        let installer = resolver
            .select_installer_identity(None, &app_identity())
            .await
            .unwrap();

        assert_eq!(installer.id(), INSTALLER_ID);
        assert_eq!(prompt.offered.lock().unwrap()[0].len(), 1);
        assert_eq!(
            runner.command_lines(),
            vec![
                "security find-identity -v -p codesigning",
                "security find-identity -v",
            ]
        );
    }

    #[tokio::test]
    async fn installer_identity_missing_for_team() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        runner.push(ToolOutput::success(find_identity_output(&[
            (APP_ID, APP_NAME),
            (OTHER_ID, OTHER_NAME),
        ])));
        let resolver = IdentityResolver::new(runner, NoInputPrompt);

        let err = resolver
            .select_installer_identity(None, &app_identity())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No installer signing identities for team DEADBEEF could be found."
        );
    }

    #[tokio::test]
    async fn no_input_prompt_refuses() {
        let runner = runner_with(&[(APP_ID, APP_NAME)]);
        let resolver = IdentityResolver::new(runner, NoInputPrompt);
        let err = resolver.select_identity(None, true).await.unwrap_err();
        assert!(matches!(err, Error::InputDisabled(_)));
    }
}
