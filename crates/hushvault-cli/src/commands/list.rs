use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::Context;
use crate::output::{create_table, format_timestamp, short_id};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Show full entry ids
    #[arg(long)]
    pub full_ids: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::list", skip_all, fields(vault = %ctx.vault_dir.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.open_existing_vault()?;
    let summaries = vault.list_entries()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        ctx.note("No entries");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Id", "Title", "Created", "Updated"]);
    for summary in &summaries {
        let id = if args.full_ids {
            summary.id.as_str()
        } else {
            short_id(summary.id.as_str())
        };
        table.add_row(vec![
            id,
            summary.title.as_deref().unwrap_or("(sealed)"),
            &format_timestamp(&summary.created_at),
            &format_timestamp(&summary.updated_at),
        ]);
    }
    println!("{table}");

    Ok(())
}
