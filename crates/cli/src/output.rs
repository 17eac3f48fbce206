// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a list as a text table or JSON. Handles the empty case.
pub fn handle_list<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    empty_msg: &str,
    render_text: impl FnOnce(&[T], &mut dyn Write) -> std::io::Result<()>,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Text if items.is_empty() => println!("{empty_msg}"),
        OutputFormat::Text => render_text(items, &mut std::io::stdout().lock())?,
    }
    Ok(())
}

/// Format branch for single-object commands: JSON, or `text_fn`.
pub fn format_or_json<T: Serialize>(
    format: OutputFormat,
    data: &T,
    text_fn: impl FnOnce() -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
            Ok(())
        }
        OutputFormat::Text => text_fn(),
    }
}

/// Left-aligned columns sized to the widest cell. The header row is
/// painted; the last column is not padded.
pub fn write_table(
    out: &mut dyn Write,
    headers: &[&str],
    rows: &[Vec<String>],
) -> std::io::Result<()> {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter().filter_map(|r| r.get(i)).map(String::len).fold(h.len(), usize::max)
        })
        .collect();
    let last = headers.len().saturating_sub(1);

    let mut line = String::new();
    for (i, h) in headers.iter().enumerate() {
        let pad = if i == last { 0 } else { widths[i] - h.len() + 1 };
        line.push_str(&crate::color::header(h));
        line.push_str(&" ".repeat(pad));
    }
    writeln!(out, "{}", line.trim_end())?;

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == last {
                    c.clone()
                } else {
                    format!("{c:<width$}", width = widths[i])
                }
            })
            .collect();
        writeln!(out, "{}", cells.join(" ").trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
