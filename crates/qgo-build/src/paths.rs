//! Lexical path helpers shared by the synthesizer and the runner

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `base` and drop `.`/`..` components lexically.
///
/// The filesystem is not consulted, so the path need not exist.
pub fn normalize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Render `path` relative to `base` with `/` separators.
///
/// Paths outside `base` are rendered in full. With `dot_prefix` the
/// relative form starts with `./`; `base` itself renders as `.`.
pub fn relative_display(path: &Path, base: &Path, dot_prefix: bool) -> String {
    match path.strip_prefix(base) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => {
            let joined = to_slash(rel);
            if dot_prefix {
                format!("./{}", joined)
            } else {
                joined
            }
        }
        Err(_) => to_slash(path),
    }
}

/// Join path components with `/`
pub fn to_slash(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if cfg!(windows) {
        rendered.replace('\\', "/")
    } else {
        rendered.into_owned()
    }
}

/// Escape spaces so a path survives whitespace splitting
pub fn escape_spaces(path: &str) -> String {
    path.trim().replace(' ', "\\ ")
}

/// Remove exactly one layer of surrounding double quotes
pub fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        let base = Path::new("/work/project");
        assert_eq!(
            normalize(Path::new("./sub/../bin"), base),
            PathBuf::from("/work/project/bin")
        );
    }

    #[test]
    fn test_relative_display() {
        let base = Path::new("/work/project");
        assert_eq!(
            relative_display(Path::new("/work/project/bin/app"), base, true),
            "./bin/app"
        );
        assert_eq!(
            relative_display(Path::new("/work/project/main.go"), base, false),
            "main.go"
        );
        assert_eq!(relative_display(base, base, true), ".");
        assert_eq!(
            relative_display(Path::new("/elsewhere/app"), base, true),
            "/elsewhere/app"
        );
    }

    #[test]
    fn test_strip_quotes_removes_one_layer() {
        assert_eq!(strip_quotes("\"-s -w\""), "-s -w");
        assert_eq!(strip_quotes("\"\"-s\"\""), "\"-s\"");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes("-s"), "-s");
    }

    #[test]
    fn test_escape_spaces() {
        assert_eq!(escape_spaces("my app/main.go "), "my\\ app/main.go");
    }
}
