//! `gleaner tags` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::commands::CommandContext;
use crate::error::CliError;
use crate::output::Render;

/// Tag -> number of target sets carrying it.
#[derive(Debug, Clone, Serialize)]
pub struct TagList {
    pub tags: BTreeMap<String, usize>,
}

impl Render for TagList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let width = self.tags.keys().map(|t| t.len()).max().unwrap_or(0);
        for (tag, count) in &self.tags {
            writeln!(w, "{}  {}", format!("{tag:<width$}").bold(), count)?;
        }
        Ok(())
    }
}

/// Execute the `tags` command.
pub async fn execute(ctx: &CommandContext) -> Result<(), CliError> {
    let list = TagList {
        tags: ctx.config.tags(),
    };
    ctx.writer.render(&list)
}
