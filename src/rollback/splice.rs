// ABOUTME: Text-level replacement of one service block in a compose file.
// ABOUTME: Bytes outside the replaced block are kept exactly as they were.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("no top-level services block")]
    NoServicesSection,

    #[error("service {0} not found")]
    ServiceNotFound(String),
}

/// Line ranges of the services section.
struct Section {
    /// Index of the first line after `services:`.
    body_start: usize,
    /// One past the last line belonging to the section.
    body_end: usize,
    indent: Option<usize>,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn is_top_level_key(line: &str) -> bool {
    is_content(line) && indent_of(line) == 0 && !line.starts_with('-') && !line.starts_with("---")
}

fn key_name(line: &str) -> Option<&str> {
    let text = line.trim_start();
    for quote in ['"', '\''] {
        if let Some(rest) = text.strip_prefix(quote) {
            let end = rest.find(quote)?;
            return rest[end + 1..].trim_start().starts_with(':').then(|| &rest[..end]);
        }
    }
    text.split_once(':').map(|(key, _)| key.trim_end())
}

fn find_section(lines: &[&str]) -> Result<Section, SpliceError> {
    let header = lines
        .iter()
        .position(|line| {
            is_top_level_key(line) && {
                let rest = line.trim_end().strip_prefix("services:");
                matches!(rest, Some(r) if r.trim().is_empty() || r.trim_start().starts_with('#'))
            }
        })
        .ok_or(SpliceError::NoServicesSection)?;

    let body_start = header + 1;
    let body_end = lines[body_start..]
        .iter()
        .position(|line| is_top_level_key(line))
        .map_or(lines.len(), |offset| body_start + offset);
    let indent = lines[body_start..body_end]
        .iter()
        .find(|line| is_content(line))
        .map(|line| indent_of(line));

    Ok(Section {
        body_start,
        body_end,
        indent,
    })
}

/// Line range `[start, end)` of service `name`, trailing blanks and comments excluded.
fn find_block(lines: &[&str], section: &Section, name: &str) -> Option<(usize, usize)> {
    let indent = section.indent?;
    let start = (section.body_start..section.body_end).find(|&i| {
        is_content(lines[i]) && indent_of(lines[i]) == indent && key_name(lines[i]) == Some(name)
    })?;

    let mut end = start + 1;
    for (i, line) in lines.iter().enumerate().take(section.body_end).skip(start + 1) {
        if !is_content(line) {
            continue;
        }
        if indent_of(line) <= indent {
            break;
        }
        end = i + 1;
    }
    Some((start, end))
}

/// The block of service `name` in `text`, re-indented from its own indent to `indent`.
fn extract_block(text: &str, name: &str, indent: usize) -> Result<String, SpliceError> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let section = find_section(&lines)?;
    let (start, end) =
        find_block(&lines, &section, name).ok_or_else(|| SpliceError::ServiceNotFound(name.to_string()))?;
    let own = section.indent.unwrap_or(indent);

    let mut block = String::new();
    for line in &lines[start..end] {
        if line.trim().is_empty() {
            block.push_str(line);
            continue;
        }
        let strip = indent_of(line).min(own);
        block.push_str(&" ".repeat(indent));
        block.push_str(&line[strip..]);
    }
    if !block.ends_with('\n') {
        block.push('\n');
    }
    Ok(block)
}

/// Whether service `name` appears in the services block of `text`.
pub fn has_service(text: &str, name: &str) -> bool {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    find_section(&lines)
        .map(|section| find_block(&lines, &section, name).is_some())
        .unwrap_or(false)
}

/// Replace (or append) service `name` in `current` with its block from `snapshot`.
pub fn splice_service(current: &str, snapshot: &str, name: &str) -> Result<String, SpliceError> {
    let lines: Vec<&str> = current.split_inclusive('\n').collect();
    let section = find_section(&lines)?;
    let indent = section.indent.unwrap_or(2);
    let block = extract_block(snapshot, name, indent)?;

    let (start, end) = match find_block(&lines, &section, name) {
        Some(range) => range,
        None => {
            // Append after the last content line of the section.
            let insert_at = (section.body_start..section.body_end)
                .rev()
                .find(|&i| is_content(lines[i]))
                .map_or(section.body_start, |i| i + 1);
            (insert_at, insert_at)
        }
    };

    let mut out = String::with_capacity(current.len() + block.len());
    for line in &lines[..start] {
        out.push_str(line);
    }
    if start > 0 && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    for line in &lines[end..] {
        out.push_str(line);
    }
    Ok(out)
}
