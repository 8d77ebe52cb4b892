use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::{Cancelled, confirm};
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[instrument(level = "info", name = "cmd::destroy", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.open_existing_vault()?;
    let count = vault.list_entries()?.len();

    if !args.yes
        && !confirm(&format!(
            "Permanently delete the password and all {count} entries?"
        ))?
    {
        return Err(Cancelled("Vault left unchanged").into());
    }

    let password = crate::get_password(&ctx.password_opts, "Vault password: ")?;
    vault
        .remove_password(&password)
        .context("Failed to remove vault password")?;

    ctx.note(format_args!("Deleted vault password and {count} entries"));
    Ok(())
}
