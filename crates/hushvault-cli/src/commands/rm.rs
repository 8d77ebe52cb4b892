use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use hushvault_core::VaultError;

use super::{entry_context, resolve_entry_id};
use crate::Context;

#[derive(ClapArgs)]
pub struct Args {
    /// Entry id or unique id prefix
    pub id: String,

    /// Succeed even if the entry does not exist
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(id = %args.id))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.unlock_vault()?;
    let id = resolve_entry_id(&mut vault, &args.id)?;

    match vault.delete_entry(&id) {
        Ok(()) => {
            ctx.note(format_args!("Deleted entry {id}"));
            Ok(())
        }
        Err(VaultError::EntryNotFound { .. }) if args.force => Ok(()),
        Err(e) => Err(entry_context(e, &id)),
    }
}
