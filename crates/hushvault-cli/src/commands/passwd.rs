use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::prompt_new_password;
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// New password (insecure, prefer the interactive prompt)
    #[arg(long, env = "HUSHVAULT_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: Option<String>,
}

#[instrument(level = "info", name = "cmd::passwd", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.open_existing_vault()?;
    let old_password = crate::get_password(&ctx.password_opts, "Current password: ")?;
    let new_password = match &args.new_password {
        Some(password) => password.clone(),
        None => prompt_new_password("New password")?,
    };

    vault
        .change_password(&old_password, &new_password)
        .context("Failed to change password")?;

    let count = vault.list_entries()?.len();
    ctx.note(format_args!("Password changed; re-encrypted {count} entries"));
    Ok(())
}
