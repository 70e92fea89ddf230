//! Browse command - Line-driven viewer session
//!
//! Reads one event per line from stdin and answers each with a JSON frame on
//! stdout, so any plotting front end can drive the session over a pipe.
//!
//! ```text
//! click 42
//! select 3,17,42
//! next | prev | reset
//! reload other.csv
//! quit
//! ```

use anyhow::{bail, Context, Result};
use atlas::config::AtlasConfig;
use atlas::viewer::{RowRef, SelectionEvent, ViewerSession};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, PartialEq)]
enum Command {
    Event(SelectionEvent),
    Reload(PathBuf),
    Quit,
}

fn parse_line(line: &str) -> Result<Command> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "click" => {
            let row: RowRef = rest
                .parse()
                .with_context(|| format!("click needs a row number, got '{}'", rest))?;
            Command::Event(SelectionEvent::PointClicked(row))
        }
        "select" => {
            let rows = rest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<RowRef>()
                        .with_context(|| format!("invalid row '{}'", s))
                })
                .collect::<Result<Vec<_>>>()?;
            Command::Event(SelectionEvent::RegionSelected(rows))
        }
        "reset" => Command::Event(SelectionEvent::ViewReset),
        "next" => Command::Event(SelectionEvent::PageNext),
        "prev" => Command::Event(SelectionEvent::PagePrev),
        "reload" => {
            if rest.is_empty() {
                bail!("reload needs a table path");
            }
            Command::Reload(PathBuf::from(rest))
        }
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}'", other),
    };
    Ok(command)
}

pub fn execute(
    config_path: Option<&Path>,
    table: Option<PathBuf>,
    page_size: Option<usize>,
) -> Result<()> {
    let mut config = AtlasConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(page_size) = page_size {
        config.viewer.page_size = page_size;
    }
    config.validate()?;

    let path = table.unwrap_or_else(|| config.table_path());
    let mut session = ViewerSession::open(&path, config.viewer.page_size)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let legend: Vec<_> = session.table().labels();
    writeln!(
        out,
        "{}",
        json!({
            "rows": session.table().len(),
            "dimensions": session.table().dims(),
            "labels": legend,
            "frame": session.frame(),
        })
    )?;

    run_session(&mut session, io::stdin().lock(), &mut out)
}

/// Answer every non-blank input line with exactly one JSON line.
fn run_session<R: BufRead, W: Write>(
    session: &mut ViewerSession,
    input: R,
    mut out: W,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{:#}", e);
                writeln!(out, "{}", json!({ "error": format!("{:#}", e) }))?;
                out.flush()?;
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Event(event) => {
                let frame = session.dispatch(event);
                writeln!(out, "{}", serde_json::to_string(&frame)?)?;
            }
            Command::Reload(path) => match session.reload(&path) {
                Ok(()) => writeln!(
                    out,
                    "{}",
                    json!({ "rows": session.table().len(), "frame": session.frame() })
                )?,
                Err(e) => {
                    warn!("Keeping current table: {}", e);
                    writeln!(out, "{}", json!({ "error": e.to_string() }))?;
                }
            },
        }
        out.flush()?;
    }

    Ok(())
}
