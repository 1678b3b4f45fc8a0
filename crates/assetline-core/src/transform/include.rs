//! Include-directive expansion.
//!
//! A line containing `//= path` is replaced by the contents of `path`,
//! resolved relative to the including file. Included files are expanded
//! recursively. Text before the directive on the same line is kept; when it
//! is pure indentation it is repeated in front of every included line.

use assetline_util::fs::read_to_string_lossy;
use std::path::{Path, PathBuf};

/// Marker that starts an include directive.
pub const DIRECTIVE: &str = "//=";

/// Expand every include directive in `path`.
pub fn expand_includes(path: &Path) -> Result<String, IncludeError> {
    let mut stack = Vec::new();
    expand_file(path, &mut stack)
}

fn expand_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<String, IncludeError> {
    let canonical = dunce::canonicalize(path).map_err(|e| IncludeError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if stack.contains(&canonical) {
        return Err(IncludeError::Cycle { path: canonical });
    }

    let source = read_to_string_lossy(&canonical).map_err(|e| IncludeError::Read {
        path: canonical.clone(),
        message: e.to_string(),
    })?;
    let dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    stack.push(canonical.clone());
    let expanded = expand_source(&source, &canonical, &dir, stack);
    stack.pop();
    expanded
}

fn expand_source(
    source: &str,
    file: &Path,
    dir: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<String, IncludeError> {
    let mut out = String::with_capacity(source.len());

    for (idx, line) in source.split_inclusive('\n').enumerate() {
        let body = line.trim_end_matches(['\r', '\n']);
        let newline = &line[body.len()..];

        let Some(pos) = body.find(DIRECTIVE) else {
            out.push_str(line);
            continue;
        };

        let prefix = &body[..pos];
        let target = body[pos + DIRECTIVE.len()..]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        if target.is_empty() {
            return Err(IncludeError::EmptyDirective {
                file: file.to_path_buf(),
                line: idx + 1,
            });
        }

        let included = expand_file(&dir.join(target), stack)?;
        let included = included.trim_end_matches(['\r', '\n']);

        if prefix.trim().is_empty() {
            for (i, inc_line) in included.lines().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(prefix);
                out.push_str(inc_line);
            }
        } else {
            out.push_str(prefix);
            out.push_str(included);
        }
        out.push_str(newline);
    }

    Ok(out)
}

/// Include expansion error.
#[derive(Debug)]
pub enum IncludeError {
    /// An included file could not be read.
    Read { path: PathBuf, message: String },
    /// A file includes itself, directly or through others.
    Cycle { path: PathBuf },
    /// A directive without a path.
    EmptyDirective { file: PathBuf, line: usize },
}

impl std::fmt::Display for IncludeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeError::Read { path, message } => {
                write!(f, "include error: cannot read {}: {message}", path.display())
            }
            IncludeError::Cycle { path } => {
                write!(f, "include error: {} includes itself", path.display())
            }
            IncludeError::EmptyDirective { file, line } => {
                write!(
                    f,
                    "include error: empty directive at {}:{line}",
                    file.display()
                )
            }
        }
    }
}

impl std::error::Error for IncludeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_expand_single_include() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(
            dir.path().join("partials/header.html"),
            "<header>\n  <h1>Site</h1>\n</header>\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("index.html"),
            "<body>\n    //= partials/header.html\n</body>\n",
        )
        .unwrap();

        let out = expand_includes(&dir.path().join("index.html")).unwrap();
        assert_eq!(
            out,
            "<body>\n    <header>\n      <h1>Site</h1>\n    </header>\n</body>\n"
        );
        assert!(!out.contains(DIRECTIVE));
    }

    #[test]
    fn test_nested_includes_resolve_relative_to_includer() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("parts/inner")).unwrap();
        fs::write(dir.path().join("parts/inner/nav.html"), "<nav></nav>").unwrap();
        fs::write(dir.path().join("parts/header.html"), "//= inner/nav.html").unwrap();
        fs::write(dir.path().join("index.html"), "//= 'parts/header.html'\n").unwrap();

        let out = expand_includes(&dir.path().join("index.html")).unwrap();
        assert_eq!(out, "<nav></nav>\n");
    }

    #[test]
    fn test_inline_prefix_is_kept() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("year.txt"), "2024\n").unwrap();
        fs::write(dir.path().join("index.html"), "<p>(c) //= year.txt\n").unwrap();

        let out = expand_includes(&dir.path().join("index.html")).unwrap();
        assert_eq!(out, "<p>(c) 2024\n");
    }

    #[test]
    fn test_cycle_detected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "//= b.html\n").unwrap();
        fs::write(dir.path().join("b.html"), "//= a.html\n").unwrap();

        let err = expand_includes(&dir.path().join("a.html")).unwrap_err();
        assert!(matches!(err, IncludeError::Cycle { .. }));
    }

    #[test]
    fn test_missing_include_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "//= missing.html\n").unwrap();

        let err = expand_includes(&dir.path().join("index.html")).unwrap_err();
        assert!(matches!(err, IncludeError::Read { .. }));
        assert!(err.to_string().contains("missing.html"));
    }

    #[test]
    fn test_empty_directive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "a\n//=\n").unwrap();

        let err = expand_includes(&dir.path().join("index.html")).unwrap_err();
        assert!(matches!(err, IncludeError::EmptyDirective { line: 2, .. }));
    }
}
