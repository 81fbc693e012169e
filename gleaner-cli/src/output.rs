//! Output formatting abstraction for text vs JSON rendering
//!
//! Reports (targets, tags, configtest, run summaries) flow through [`OutputWriter`].
//! Collected records flow through [`write_records`], the single stdout writer
//! that consumes the merged record channel.

use std::collections::HashMap;
use std::io::Write;

use chrono::{Local, SecondsFormat};
use colored::{Color, Colorize};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use gleaner_core::types::Record;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI reports in different formats.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to any writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Host colors, picked by first appearance.
const HOST_COLORS: [Color; 4] = [Color::Yellow, Color::Magenta, Color::Green, Color::Cyan];

/// Width of a local RFC 3339 timestamp with seconds precision.
const TIMESTAMP_WIDTH: usize = 25;

/// Formats records one line at a time.
pub struct RecordFormatter {
    format: OutputFormat,
    hosts: HashMap<String, usize>,
}

impl RecordFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            hosts: HashMap::new(),
        }
    }

    /// Append one formatted record (with trailing newline) to `buf`.
    ///
    /// Text: `<local timestamp|-> <*| > <host>:<path> <content>`, where `*` marks a
    /// timestamp carried from the previous record.
    /// JSON: one compact object per line.
    pub fn write(&mut self, record: &Record, buf: &mut Vec<u8>) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *buf, record)?;
                buf.push(b'\n');
            }
            OutputFormat::Text => {
                let next = self.hosts.len();
                let index = *self.hosts.entry(record.host.clone()).or_insert(next);
                let color = HOST_COLORS[index % HOST_COLORS.len()];

                let ts = match record.timestamp {
                    Some(ts) => ts
                        .with_timezone(&Local)
                        .to_rfc3339_opts(SecondsFormat::Secs, false),
                    None => "-".to_owned(),
                };
                let mark = if record.filled_by_previous_timestamp { "*" } else { " " };
                let origin = format!("{}:{}", record.host, record.path);
                writeln!(
                    buf,
                    "{} {} {} {}",
                    format!("{ts:<TIMESTAMP_WIDTH$}").color(color),
                    mark.bold(),
                    origin.bright_black(),
                    record.content
                )?;
            }
        }
        Ok(())
    }
}

/// Drain the merged record channel into `writer`.
///
/// Flushes whenever the channel is momentarily empty so that `stream` output
/// appears promptly. A write failure returns early; dropping the receiver makes
/// every sender see a closed sink, which cancels the run.
pub async fn write_records<W>(
    mut rx: mpsc::Receiver<Record>,
    mut writer: W,
    format: OutputFormat,
) -> Result<u64, CliError>
where
    W: AsyncWrite + Unpin,
{
    let mut formatter = RecordFormatter::new(format);
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut written = 0u64;

    while let Some(record) = rx.recv().await {
        formatter.write(&record, &mut buf)?;
        written += 1;
        while let Ok(record) = rx.try_recv() {
            formatter.write(&record, &mut buf)?;
            written += 1;
            if buf.len() >= 64 * 1024 {
                break;
            }
        }
        writer.write_all(&buf).await?;
        writer.flush().await?;
        buf.clear();
    }

    Ok(written)
}
