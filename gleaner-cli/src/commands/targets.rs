//! `gleaner targets` command handler

use std::io::Write;

use serde::Serialize;

use gleaner_core::types::{RecordType, Scheme, Target};

use crate::cli::FilterArgs;
use crate::commands::{CommandContext, select_targets};
use crate::error::CliError;
use crate::output::Render;

/// One resolved target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetEntry {
    pub id: u64,
    pub source: String,
    pub scheme: Scheme,
    pub host: String,
    pub path: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub multi_line: bool,
    pub description: String,
    pub tags: Vec<String>,
}

impl From<&Target> for TargetEntry {
    fn from(t: &Target) -> Self {
        Self {
            id: t.id,
            source: t.source.clone(),
            scheme: t.scheme,
            host: t.host.clone(),
            path: t.path.clone(),
            record_type: t.record_type,
            multi_line: t.multi_line,
            description: t.description.clone(),
            tags: t.tags.clone(),
        }
    }
}

/// Target listing.
#[derive(Debug, Clone, Serialize)]
pub struct TargetList {
    pub targets: Vec<TargetEntry>,
}

impl Render for TargetList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for t in &self.targets {
            write!(w, "{}", t.source.bold())?;
            if !t.description.is_empty() {
                write!(w, "  {}", t.description)?;
            }
            writeln!(w)?;
            writeln!(
                w,
                "    type: {}  multi_line: {}  tags: [{}]",
                t.record_type,
                t.multi_line,
                t.tags.join(", ")
            )?;
        }
        writeln!(w, "{} targets", self.targets.len())?;
        Ok(())
    }
}

/// Execute the `targets` command.
pub async fn execute(ctx: &CommandContext, args: FilterArgs) -> Result<(), CliError> {
    let targets = select_targets(&ctx.config, &args)?;
    let list = TargetList {
        targets: targets.iter().map(TargetEntry::from).collect(),
    };
    ctx.writer.render(&list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::config::GleanerConfig;

    fn list() -> TargetList {
        let config = GleanerConfig::parse(
            r#"
[[target_sets]]
sources = ["ssh://deploy@web-1:2222/var/log/nginx/access.log"]
description = "nginx access log"
type = "combinedLog"
tags = ["web", "nginx"]
"#,
        )
        .expect("valid config");
        let targets = config.targets().expect("targets");
        TargetList {
            targets: targets.iter().map(TargetEntry::from).collect(),
        }
    }

    #[test]
    fn test_target_list_render_text() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        list().render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("ssh://deploy@web-1:2222/var/log/nginx/access.log  nginx access log"));
        assert!(output.contains("type: combinedLog"));
        assert!(output.contains("tags: [web, nginx]"));
        assert!(output.ends_with("1 targets\n"));
    }

    #[test]
    fn test_target_list_json() {
        let json = serde_json::to_value(list()).expect("serialize");
        let entry = &json["targets"][0];
        assert_eq!(entry["id"], 0);
        assert_eq!(entry["host"], "web-1");
        assert_eq!(entry["path"], "/var/log/nginx/access.log");
        assert_eq!(entry["type"], "combinedLog");
    }
}
