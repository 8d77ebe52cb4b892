//! Status command - show vault state without unlocking it.
//!
//! # Examples
//!
//! ```bash
//! hushvault status
//! hushvault status --json
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use crate::Context;
use crate::output::{create_table, format_timestamp};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output format for status command
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VaultStatus {
    vault_path: String,
    initialized: bool,
    entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    kdf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    inactivity_timeout_secs: u64,
    title_policy: String,
}

#[instrument(level = "info", name = "cmd::status", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut status = VaultStatus {
        vault_path: ctx.vault_dir.display().to_string(),
        initialized: false,
        entries: 0,
        kdf: None,
        created_at: None,
        inactivity_timeout_secs: ctx.config.vault.inactivity_timeout.as_secs(),
        title_policy: format!("{:?}", ctx.config.vault.title_policy).to_lowercase(),
    };

    let mut created_at = None;
    if ctx.vault_exists() {
        let mut vault = ctx.open_vault()?;
        status.entries = vault.list_entries()?.len();
        if let Some(credential) = vault.credential() {
            status.initialized = true;
            status.kdf = Some(format!(
                "scrypt N=2^{} r={} p={}",
                credential.kdf.log2_n, credential.kdf.r, credential.kdf.p
            ));
            status.created_at = Some(credential.created_at.to_rfc3339());
            created_at = Some(credential.created_at);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Vault Path", &status.vault_path]);
    table.add_row(vec![
        "State",
        if status.initialized {
            "locked"
        } else {
            "no password"
        },
    ]);
    table.add_row(vec!["Entries", &status.entries.to_string()]);
    if let Some(kdf) = &status.kdf {
        table.add_row(vec!["Key Derivation", kdf]);
    }
    if let Some(created_at) = &created_at {
        table.add_row(vec!["Created", &format_timestamp(created_at)]);
    }
    table.add_row(vec!["Titles", &status.title_policy]);
    table.add_row(vec![
        "Auto-lock",
        &format!("{}s", status.inactivity_timeout_secs),
    ]);
    println!("{table}");

    Ok(())
}
