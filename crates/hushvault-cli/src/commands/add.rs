use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::read_content;
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Entry title
    #[arg(short, long)]
    pub title: String,

    /// Entry content (read from stdin when omitted)
    #[arg(short, long)]
    pub content: Option<String>,
}

#[instrument(level = "info", name = "cmd::add", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.unlock_vault()?;
    let content = read_content(args.content.as_deref())?;

    let record = vault
        .save_entry(&args.title, &content)
        .context("Failed to save entry")?;

    println!("{}", record.id);
    Ok(())
}
