//! Remote object naming.
//!
//! A naming format mixes strftime tokens with two placeholders: `%{name}`
//! (base name without extension) and `%{ext}` (extension including the dot).
//! `%Y/%m/%d/%{name}%{ext}` files `report.pdf` under today's date.

use crate::error::{Result, TransferError};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use std::fmt::{Display, Write};
use std::path::Path;

const NAME_TOKEN: &str = "%{name}";
const EXT_TOKEN: &str = "%{ext}";

/// Split a file name into stem and extension; the extension starts at the
/// last dot and keeps it (`a.tar.gz` -> `a.tar`, `.gz`).
pub fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(i) => (&file_name[..i], &file_name[i..]),
        None => (file_name, ""),
    }
}

/// Last path component, or the input itself when there is none.
pub fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Render the remote name for `local_path` at time `now`.
///
/// An empty format, or one that renders to nothing, keeps the base name.
pub fn format_name<Tz>(format: &str, local_path: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let file_name = base_name(local_path);
    let (stem, ext) = split_name(&file_name);

    let mut out = String::new();
    let mut rest = format;
    while !rest.is_empty() {
        let next = [NAME_TOKEN, EXT_TOKEN]
            .iter()
            .filter_map(|token| rest.find(token).map(|at| (at, *token)))
            .min_by_key(|(at, _)| *at);

        match next {
            Some((at, token)) => {
                render_time(&mut out, &rest[..at], now)?;
                out.push_str(if token == NAME_TOKEN { stem } else { ext });
                rest = &rest[at + token.len()..];
            }
            None => {
                render_time(&mut out, rest, now)?;
                rest = "";
            }
        }
    }

    if out.is_empty() {
        return Ok(file_name);
    }
    Ok(out)
}

fn render_time<Tz>(out: &mut String, segment: &str, now: &DateTime<Tz>) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if segment.is_empty() {
        return Ok(());
    }
    let items: Vec<Item<'_>> = StrftimeItems::new(segment).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TransferError::Config(format!(
            "Invalid time pattern in file name format: {:?}",
            segment
        )));
    }
    write!(out, "{}", now.format_with_items(items.iter()))
        .map_err(|_| TransferError::Config(format!("Cannot render {:?}", segment)))
}

/// Join the remote directory and a rendered name into an object key.
///
/// Empty and `.` segments are dropped and `..` pops, like a URL path join;
/// the result never starts with `/`.
pub fn remote_path(dir: &str, name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
