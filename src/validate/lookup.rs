//! Data-source lookup over installed `share/` trees.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::model::{DataSourceHandle, DataSourceQuery};
use crate::traits::{DataSourceLookup, LookupError};

const CONFIG_FILE: &str = "config.ini";

/// Resolves `<search path>/<category>/<organization>/<module>/<package>` and
/// reads the package version from its `config.ini`.
///
/// Search paths are tried in order; the first existing package directory wins
/// even if its configuration turns out to be unusable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShareTreeLookup;

#[async_trait]
impl DataSourceLookup for ShareTreeLookup {
    async fn lookup(&self, query: &DataSourceQuery) -> Result<DataSourceHandle, LookupError> {
        let relative: PathBuf = query.components().iter().collect();

        for search_path in &query.search_paths {
            let root = search_path.join(&relative);
            let is_dir = tokio::fs::metadata(&root)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                debug!(candidate = %root.display(), "Data package not here");
                continue;
            }

            let version = read_version(&root).await?;
            debug!(root = %root.display(), %version, "Resolved data package");
            return Ok(DataSourceHandle { root, version });
        }

        Err(LookupError::NotFound {
            name: relative.display().to_string(),
            searched: query
                .search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

async fn read_version(root: &Path) -> Result<String, LookupError> {
    let config = root.join(CONFIG_FILE);
    let content = match tokio::fs::read_to_string(&config).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LookupError::MissingConfig {
                root: root.to_path_buf(),
                config: config.clone(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    default_section_value(&content, "version").ok_or(LookupError::MissingVersion { config })
}

/// Value of `key` in the `[DEFAULT]` section of an INI document.
///
/// Handles the subset of Python `configparser` syntax that data package
/// configs use: `=` or `:` separators, case-insensitive keys, full-line `#`
/// and `;` comments, and indented continuation lines, which are joined to the
/// value with `\n`. A blank line ends a continuation. Interpolation and
/// inline comments are not supported. The first non-empty value wins.
fn default_section_value(content: &str, key: &str) -> Option<String> {
    let mut in_default = false;
    let mut value: Option<String> = None;

    for raw in content.lines() {
        let line = raw.trim();
        let is_comment = line.starts_with('#') || line.starts_with(';');

        if let Some(current) = value.as_mut() {
            if is_comment {
                continue;
            }
            if !line.is_empty() && raw.starts_with(char::is_whitespace) {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
                continue;
            }
            if !current.is_empty() {
                break;
            }
            value = None;
        }

        if line.is_empty() || is_comment {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_default = section.trim() == "DEFAULT";
            continue;
        }
        if !in_default {
            continue;
        }
        let Some(split) = line.find(['=', ':']) else {
            continue;
        };
        let (name, rest) = line.split_at(split);
        if name.trim().eq_ignore_ascii_case(key) {
            value = Some(rest[1..].trim().to_string());
        }
    }

    value.filter(|v| !v.is_empty())
}
