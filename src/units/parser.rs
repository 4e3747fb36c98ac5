//! INI-style unit file parser
//!
//! Tokenizes systemd unit files into sections of key/value entries.
//! Interpretation of the entries happens in [`super::ServiceDescriptor`].

use std::collections::HashMap;

/// A section maps an upper-cased key to its values
/// The u32 is the order the value appeared (for stable ordering)
pub type ParsedSection = HashMap<String, Vec<(u32, String)>>;

/// A parsed unit file is a map of section names (`[Unit]`) to their contents
pub type ParsedFile = HashMap<String, ParsedSection>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: expected section name")]
    EmptySectionName { line: usize },

    #[error("line {line}: expected ']' at end of section header")]
    UnterminatedSection { line: usize },

    #[error("line {line}: invalid character in section name")]
    InvalidSectionName { line: usize },

    #[error("line {line}: key-value pair before first section")]
    OrphanEntry { line: usize },

    #[error("line {line}: expected key")]
    MissingKey { line: usize },

    #[error("line {line}: invalid key '{key}'")]
    InvalidKey { line: usize, key: String },

    #[error("line {line}: expected '='")]
    MissingSeparator { line: usize },

    #[error("line {line}: unexpected end of file after line continuation")]
    DanglingContinuation { line: usize },

    #[error("invalid shell quoting in: {0}")]
    Quoting(String),
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

/// Parse a unit file from a string
pub fn parse_file(content: &str) -> Result<ParsedFile, ParseError> {
    let mut sections: ParsedFile = HashMap::new();
    let mut current: Option<String> = None;
    let mut entry_number = 0u32;

    let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l));

    while let Some((lno, raw)) = lines.next() {
        let line = raw.trim();

        if line.is_empty() || is_comment(line) {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let Some(name) = rest.strip_suffix(']') else {
                return Err(ParseError::UnterminatedSection { line: lno });
            };
            if name.is_empty() {
                return Err(ParseError::EmptySectionName { line: lno });
            }
            if name.chars().any(|c| c == '[' || c == ']' || c.is_control()) {
                return Err(ParseError::InvalidSectionName { line: lno });
            }
            let header = format!("[{}]", name);
            // Repeated headers merge, as systemd does
            sections.entry(header.clone()).or_default();
            current = Some(header);
            continue;
        }

        let Some(section) = current.as_ref() else {
            return Err(ParseError::OrphanEntry { line: lno });
        };

        let Some(pos) = line.find('=') else {
            return Err(ParseError::MissingSeparator { line: lno });
        };
        let (key, value) = line.split_at(pos);
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::MissingKey { line: lno });
        }
        if !key.chars().all(is_key_char) {
            return Err(ParseError::InvalidKey {
                line: lno,
                key: key.to_string(),
            });
        }

        let mut value = value[1..].trim().to_string();
        // Trailing backslash joins the next non-comment line
        while value.ends_with('\\') {
            value.pop();
            let next = loop {
                match lines.next() {
                    Some((_, l)) if is_comment(l.trim_start()) => continue,
                    Some((_, l)) => break l.trim(),
                    None => return Err(ParseError::DanglingContinuation { line: lno }),
                }
            };
            let joined = value.trim_end();
            value = format!("{} {}", joined, next).trim().to_string();
        }

        let entries = sections
            .get_mut(section)
            .map(|s| s.entry(key.to_uppercase()).or_default());
        if let Some(entries) = entries {
            if value.is_empty() {
                // An empty assignment resets everything set so far
                entries.clear();
            } else {
                entries.push((entry_number, value));
                entry_number += 1;
            }
        }
    }

    Ok(sections)
}

/// Last value for a key, if any
pub fn last_value<'a>(section: &'a ParsedSection, key: &str) -> Option<&'a str> {
    section
        .get(key)
        .and_then(|vals| vals.iter().max_by_key(|(order, _)| *order))
        .map(|(_, v)| v.as_str())
}

/// All values for a key in file order
pub fn all_values<'a>(section: &'a ParsedSection, key: &str) -> Vec<&'a str> {
    let mut vals: Vec<&(u32, String)> = section.get(key).map(|v| v.iter().collect()).unwrap_or_default();
    vals.sort_by_key(|(order, _)| *order);
    vals.into_iter().map(|(_, v)| v.as_str()).collect()
}

/// Split a command line into argv using shell-like quoting
pub fn split_command(raw: &str) -> Result<Vec<String>, ParseError> {
    shlex::split(raw).ok_or_else(|| ParseError::Quoting(raw.to_string()))
}

/// Parse Environment= values using shell-like quoting
pub fn parse_environment(raw: &str) -> Result<Vec<(String, String)>, ParseError> {
    let parts = split_command(raw)?;

    let mut vars = Vec::new();
    for pair in parts {
        match pair.split_once('=') {
            Some((key, value)) => vars.push((key.to_string(), value.to_string())),
            None => return Err(ParseError::Quoting(raw.to_string())),
        }
    }
    Ok(vars)
}
