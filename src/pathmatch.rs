//! Verification-path expansion.
//!
//! Catalog verification paths look like
//! `%ProgramFiles%\PowerShell\*\pwsh.exe`: environment variables in `%NAME%`
//! form, plus path segments containing `*` or `?` wildcards (typically a
//! versioned install directory). [`candidates`] expands the variables, walks
//! the path one segment at a time and returns every existing path the pattern
//! resolves to. Wildcard segments match case-insensitively, like the Windows
//! filesystem does.

use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};

const SEGMENT_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Expand `%NAME%` references from the process environment.
///
/// Unknown variables are left untouched.
pub fn expand_env(input: &str) -> String {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Expand `%NAME%` references with a custom lookup.
pub fn expand_env_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = &after[..end];
        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                // Keep the '%' and rescan from the next character, so the
                // closing '%' can still open a following variable.
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// Expand variables in `pattern` and return the existing paths it matches.
pub fn candidates(pattern: &str) -> Vec<PathBuf> {
    resolve_candidates(Path::new(&expand_env(pattern)))
}

/// Walk `pattern` segment by segment, fanning out on wildcard segments.
///
/// Directories that cannot be read count as "no match" for that branch.
pub fn resolve_candidates(pattern: &Path) -> Vec<PathBuf> {
    let mut frontier = vec![PathBuf::new()];

    for component in pattern.components() {
        match component {
            Component::Normal(segment) => {
                let segment_text = segment.to_string_lossy();
                if has_wildcard(&segment_text) {
                    let Ok(matcher) = Pattern::new(&segment_text) else {
                        tracing::debug!(segment = %segment_text, "invalid wildcard segment");
                        return Vec::new();
                    };
                    frontier = frontier
                        .iter()
                        .flat_map(|base| matching_children(base, &matcher))
                        .collect();
                } else {
                    for base in &mut frontier {
                        base.push(segment);
                    }
                }
            }
            other => {
                for base in &mut frontier {
                    base.push(other.as_os_str());
                }
            }
        }

        if frontier.is_empty() {
            break;
        }
    }

    frontier.retain(|path| !path.as_os_str().is_empty() && path.exists());
    frontier.sort();
    frontier.dedup();
    frontier
}

fn matching_children(base: &Path, matcher: &Pattern) -> Vec<PathBuf> {
    let dir = if base.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::trace!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            matcher
                .matches_with(name, SEGMENT_MATCH)
                .then(|| base.join(name))
        })
        .collect()
}
