use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use super::{entry_context, resolve_entry_id};
use crate::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Entry id or unique id prefix
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryOutput<'a> {
    id: &'a str,
    title: &'a str,
    content: &'a str,
    created_at: String,
    updated_at: String,
}

#[instrument(level = "info", name = "cmd::show", skip_all, fields(id = %args.id))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut vault = ctx.unlock_vault()?;
    let id = resolve_entry_id(&mut vault, &args.id)?;
    let entry = vault.read_entry(&id).map_err(|e| entry_context(e, &id))?;

    if args.json {
        let output = EntryOutput {
            id: entry.id.as_str(),
            title: &entry.title,
            content: &entry.content,
            created_at: entry.created_at.to_rfc3339(),
            updated_at: entry.updated_at.to_rfc3339(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        ctx.note(format_args!("# {}", entry.title));
        print!("{}", entry.content.as_str());
        if !entry.content.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
