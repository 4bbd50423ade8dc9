//! Shell command construction.
//!
//! Approved commands are shell source text (`make deploy && echo done`),
//! so they are handed to a shell as a single `-c` argument rather than
//! split into argv.
//!
//! # Example
//!
//! ```ignore
//! use warden_core::shell::build_shell_command;
//!
//! let cmd = build_shell_command("ls -la | head", None)?;
//! ```

use std::process::Command;

/// Directories added to PATH for every command, in order.
pub const BASELINE_PATH: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

/// Shell used when no prefix is configured.
#[cfg(unix)]
pub const DEFAULT_SHELL_PREFIX: &str = "/bin/sh -c";

/// Prepend the baseline directories that `existing` doesn't already contain.
pub fn augment_path(existing: &str) -> String {
    let present: Vec<&str> = existing.split(':').filter(|p| !p.is_empty()).collect();
    let mut parts: Vec<&str> = BASELINE_PATH
        .iter()
        .copied()
        .filter(|dir| !present.contains(dir))
        .collect();
    parts.extend(present);
    parts.join(":")
}

/// Build a command that runs `command` under a shell.
///
/// The final invocation is `<prefix...> <command>`, e.g. `/bin/sh -c 'echo hi'`.
///
/// # Arguments
/// * `command` - Shell source text to run
/// * `shell_prefix` - Optional shell invocation override (e.g., "/bin/bash -c")
#[cfg(unix)]
pub fn build_shell_command(command: &str, shell_prefix: Option<&str>) -> Result<Command, String> {
    let prefix = get_shell_prefix(shell_prefix);

    let prefix_parts: Vec<&str> = prefix.split_whitespace().collect();
    if prefix_parts.is_empty() {
        return Err("Empty shell prefix".to_string());
    }

    let mut cmd = Command::new(prefix_parts[0]);
    cmd.args(&prefix_parts[1..]).arg(command);

    Ok(cmd)
}

/// Get the shell prefix to use for command execution.
///
/// A custom prefix is used as-is unless its program is a non-POSIX shell
/// (fish, nu, etc.), which can't be relied on to interpret the command the
/// way it was proposed.
#[cfg(unix)]
fn get_shell_prefix(custom_prefix: Option<&str>) -> String {
    let Some(prefix) = custom_prefix.map(str::trim).filter(|p| !p.is_empty()) else {
        return DEFAULT_SHELL_PREFIX.to_string();
    };

    let program = prefix.split_whitespace().next().unwrap_or_default();
    let shell_name = std::path::Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let non_posix = ["fish", "nu", "nushell", "elvish", "xonsh", "ion"];
    if non_posix.iter().any(|&s| shell_name == s) {
        log::warn!(
            "Shell prefix '{}' is not POSIX-compatible, using {}",
            prefix,
            DEFAULT_SHELL_PREFIX
        );
        return DEFAULT_SHELL_PREFIX.to_string();
    }

    prefix.to_string()
}

/// Windows version: runs the command through `cmd /C`.
#[cfg(windows)]
pub fn build_shell_command(command: &str, _shell_prefix: Option<&str>) -> Result<Command, String> {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    Ok(cmd)
}

// ============================================================================
// TESTS
// ============================================================================
