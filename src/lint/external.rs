//! Runs `l10n-lint` on a one-package PO file.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::ddtp::PackageDescription;
use crate::error::LintError;
use crate::po::{self, PoEntry};

pub const L10N_LINT: &str = "l10n-lint";

/// Default l10n-lint timeout.
pub const LINT_TIMEOUT: Duration = Duration::from_secs(30);

/// What l10n-lint said about a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintOutcome {
    /// Exit 0, no output.
    Clean,
    /// Exit 0 with remarks.
    Notes(String),
    /// Non-zero exit.
    Issues(String),
}

impl LintOutcome {
    fn from_exit(success: bool, code: Option<i32>, output: String) -> Self {
        match (success, output.is_empty()) {
            (true, true) => LintOutcome::Clean,
            (true, false) => LintOutcome::Notes(output),
            (false, true) => LintOutcome::Issues(format!(
                "l10n-lint reported errors (exit code {}).",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            )),
            (false, false) => LintOutcome::Issues(output),
        }
    }
}

/// The PO document l10n-lint is run on.
pub fn lint_po(pkg: &PackageDescription, lang: &str, short: &str, long: &str) -> String {
    let mut out = po::header(lang);
    out.push('\n');
    out.push_str(&po::render_entry(&PoEntry {
        msgid: pkg.short.clone(),
        msgstr: short.to_string(),
        ..PoEntry::default()
    }));
    if !pkg.long.is_empty() && !long.is_empty() {
        out.push('\n');
        out.push_str(&po::render_entry(&PoEntry {
            context: Some(po::long_context(&pkg.name)),
            msgid: pkg.long.clone(),
            msgstr: long.to_string(),
            ..PoEntry::default()
        }));
    }
    out
}

/// Command line used to invoke the linter.
#[derive(Debug, Clone)]
pub struct LintRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for LintRunner {
    fn default() -> Self {
        Self {
            program: L10N_LINT.to_string(),
            args: vec!["--format".into(), "text".into()],
            timeout: LINT_TIMEOUT,
        }
    }
}

impl LintRunner {
    /// Run `program args... <file>` instead of l10n-lint.
    pub fn with_command(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout: LINT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the program can be found on `PATH`.
    pub fn is_installed(&self) -> bool {
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file())
    }

    /// Lint `translation` (short line, then long) for `pkg`.
    pub async fn run(
        &self,
        pkg: &PackageDescription,
        lang: &str,
        translation: &str,
    ) -> Result<LintOutcome, LintError> {
        let (short, long) = crate::ddtp::split_translation(translation);
        if short.trim().is_empty() {
            return Err(LintError::EmptyTranslation);
        }

        let mut file = tempfile::Builder::new()
            .prefix("ddtp-lint-")
            .suffix(".po")
            .tempfile()?;
        file.write_all(lint_po(pkg, lang, &short, &long).as_bytes())?;
        file.flush()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(package = %pkg.name, program = %self.program, "Running linter");
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LintError::NotInstalled,
            _ => LintError::Spawn(e.to_string()),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LintError::Timeout(self.timeout))??;

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
        .trim()
        .to_string();
        let outcome = LintOutcome::from_exit(output.status.success(), output.status.code(), text);
        info!(package = %pkg.name, exit = ?output.status.code(), "Lint finished");
        Ok(outcome)
    }
}

/// Run the default `l10n-lint --format text` on a translation.
pub async fn run_l10n_lint(
    pkg: &PackageDescription,
    lang: &str,
    translation: &str,
) -> Result<LintOutcome, LintError> {
    let runner = LintRunner::default();
    if !runner.is_installed() {
        return Err(LintError::NotInstalled);
    }
    runner.run(pkg, lang, translation).await
}
