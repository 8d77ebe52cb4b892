use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use hushvault_core::{IRRECOVERABLE_LOSS_WARNING, VaultError, VaultState};

use super::prompt_new_password;
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {}

#[instrument(level = "info", name = "cmd::init", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, _args: &Args) -> Result<()> {
    let mut vault = ctx.open_vault()?;
    if vault.state() != VaultState::NoPassword {
        return Err(anyhow::Error::new(VaultError::AlreadyExists).context(format!(
            "A vault already exists at {}",
            ctx.vault_dir.display()
        )));
    }

    eprintln!("WARNING: {IRRECOVERABLE_LOSS_WARNING}");

    let opts = &ctx.password_opts;
    let password = if opts.password_stdin || opts.password.is_some() {
        crate::get_password(opts, "")?
    } else {
        prompt_new_password("New vault password")?
    };

    vault
        .set_password(&password)
        .context("Failed to create vault")?;

    ctx.note(format_args!(
        "Created new vault at: {}",
        ctx.vault_dir.display()
    ));
    Ok(())
}
