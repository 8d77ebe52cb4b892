use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::{entry_context, resolve_entry_id};
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Entry id or unique id prefix
    pub id: String,

    /// New title (kept when omitted)
    #[arg(short, long)]
    pub title: Option<String>,

    /// New content (kept when omitted, unless --stdin)
    #[arg(short, long, conflicts_with = "stdin")]
    pub content: Option<String>,

    /// Read the new content from stdin
    #[arg(long)]
    pub stdin: bool,
}

#[instrument(level = "info", name = "cmd::edit", skip_all, fields(id = %args.id))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    if args.title.is_none() && args.content.is_none() && !args.stdin {
        bail!("Nothing to change; pass --title, --content or --stdin");
    }

    let mut vault = ctx.unlock_vault()?;
    let id = resolve_entry_id(&mut vault, &args.id)?;
    let current = vault.read_entry(&id).map_err(|e| entry_context(e, &id))?;

    let title = args.title.as_deref().unwrap_or(&current.title);
    let content = if args.stdin {
        super::read_content(None)?
    } else {
        args.content
            .clone()
            .unwrap_or_else(|| current.content.as_str().to_string())
    };

    vault
        .update_entry(&id, title, &content)
        .map_err(|e| entry_context(e, &id))?;

    ctx.note(format_args!("Updated entry {id}"));
    Ok(())
}
