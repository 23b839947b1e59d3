//! Shared helpers for the short-lived system commands the agent shells out
//! to (`ip`, `iw`, `nmcli`, `systemctl`).
//!
//! Argument lists are not logged here; some carry credentials. Callers log
//! what is safe at their own level.

use std::process::Stdio;

use tokio::process::Command;

/// Run `program` with `args` to completion, treating a non-zero exit as an
/// error. The returned message carries the command line's program name, the
/// exit status, and trimmed stderr, ready for a backend-specific error
/// variant.
pub(crate) async fn run_checked(program: &str, args: &[&str]) -> Result<(), String> {
    run_for_stdout(program, args).await.map(|_| ())
}

/// Like [`run_checked`], but hand back captured stdout on success.
pub(crate) async fn run_for_stdout(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| format!("failed to run {program}: {err}"))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!(
        "{program} failed ({}): {}",
        output.status,
        stderr.trim()
    ))
}
