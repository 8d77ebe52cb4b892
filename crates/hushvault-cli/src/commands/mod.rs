pub mod add;
pub mod completions;
pub mod destroy;
pub mod edit;
pub mod init;
pub mod list;
pub mod passwd;
pub mod rm;
pub mod show;
pub mod status;

use std::io::{self, IsTerminal, Read, Write};

use anyhow::{Context as _, Result, bail};
use hushvault_core::{EntryId, FileStore, Vault, VaultError};

/// The user declined a confirmation prompt.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Cancelled(pub &'static str);

/// Resolve a full id or a unique id prefix to an entry id.
///
/// Unknown ids resolve to themselves so the vault reports `EntryNotFound`.
pub fn resolve_entry_id(vault: &mut Vault<FileStore>, id_or_prefix: &str) -> Result<EntryId> {
    let summaries = vault.list_entries()?;
    if summaries.iter().any(|s| s.id.as_str() == id_or_prefix) {
        return Ok(EntryId::from(id_or_prefix));
    }

    let matches: Vec<_> = summaries
        .iter()
        .filter(|s| s.id.as_str().starts_with(id_or_prefix))
        .collect();
    match matches.as_slice() {
        [single] => Ok(single.id.clone()),
        [] => Ok(EntryId::from(id_or_prefix)),
        many => bail!(
            "Id prefix '{id_or_prefix}' is ambiguous ({} entries match)",
            many.len()
        ),
    }
}

/// Content from the flag, or the rest of stdin.
pub fn read_content(flag: Option<&str>) -> Result<String> {
    if let Some(content) = flag {
        return Ok(content.to_string());
    }
    if io::stdin().is_terminal() {
        eprintln!("Enter entry content, then Ctrl-D:");
    }
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read content from stdin")?;
    Ok(content)
}

/// Ask for a new password twice on the terminal.
pub fn prompt_new_password(label: &str) -> Result<String> {
    let first = crate::prompt_password(&format!("{label}: "))?;
    let second = crate::prompt_password("Confirm password: ")?;
    if first != second {
        bail!("Passwords do not match");
    }
    Ok(first)
}

/// Ask a yes/no question on the terminal; anything but "y"/"yes" declines.
pub fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        bail!("Refusing to continue without confirmation; pass --yes");
    }
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Map a missing-entry error to a friendlier message, keeping the typed cause.
pub fn entry_context(err: VaultError, id: &EntryId) -> anyhow::Error {
    match err {
        VaultError::EntryNotFound { .. } => {
            anyhow::Error::new(err).context(format!("No entry with id {id}"))
        }
        other => anyhow::Error::new(other),
    }
}
