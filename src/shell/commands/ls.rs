use anyhow::{Result, anyhow};
use async_trait::async_trait;
use colored::*;

use super::output::print_line;
use super::{Command, ShellState};
use crate::error::VfsError;
use crate::vfs::{ArchivePath, DirectoryEntry};

pub struct LsCommand;

#[async_trait]
impl Command for LsCommand {
    fn name(&self) -> &str {
        "ls"
    }

    fn usage(&self) -> &str {
        "ls [-l] [PATH|PATTERN] - List directory contents"
    }

    async fn execute(&self, state: &mut ShellState, args: &[String]) -> Result<()> {
        let mut long_format = false;
        let mut path_arg: Option<&str> = None;

        for arg in args {
            if arg == "-l" {
                long_format = true;
            } else if !arg.starts_with('-') {
                path_arg = Some(arg.as_str());
                break; // Only take the first non-flag argument
            }
        }

        // A wildcard in the last segment filters the parent's listing
        let (target, filter_pattern) = match path_arg {
            Some(path) if path.contains('*') || path.contains('?') => match path.rfind('/') {
                Some(pos) => (state.resolve(&path[..pos.max(1)]), Some(&path[pos + 1..])),
                None => (state.cwd().clone(), Some(path)),
            },
            Some(path) => (state.resolve(path), None),
            None => (state.cwd().clone(), None),
        };

        let entries = list(state, &target).await?;

        if long_format {
            print_line!("{:<5} {:<40} URL", "KIND", "NAME");
            print_line!("{}", "-".repeat(80));
        }
        for entry in entries
            .iter()
            .filter(|e| Self::should_display(&e.name, filter_pattern))
        {
            let name = if entry.is_dir() {
                format!("{}/", entry.name).blue().bold()
            } else {
                entry.name.normal()
            };
            if long_format {
                let kind = if entry.is_dir() { "dir" } else { "file" };
                print_line!("{:<5} {:<40} {}", kind, name, entry.url.as_str().dimmed());
            } else {
                print_line!("{name}");
            }
        }

        Ok(())
    }
}

/// List `target`, turning a missing directory into a shell-style message
pub(super) async fn list(state: &ShellState, target: &ArchivePath) -> Result<Vec<DirectoryEntry>> {
    let url = state.url_for(target).await?;
    state
        .cache()
        .list_directory(&url, None)
        .await
        .map_err(|err| match err {
            VfsError::NotFound { .. } => anyhow!("No such directory: {target}"),
            other => other.into(),
        })
}

impl LsCommand {
    /// Check if a filename should be displayed given an optional filter pattern
    fn should_display(filename: &str, filter_pattern: Option<&str>) -> bool {
        match filter_pattern {
            Some(pattern) => Self::matches_pattern(filename, pattern),
            None => true,
        }
    }

    /// Match a filename against a simple wildcard pattern (* and ?)
    fn matches_pattern(filename: &str, pattern: &str) -> bool {
        let mut name_chars = filename.chars().peekable();
        let mut pattern_chars = pattern.chars().peekable();

        loop {
            match (name_chars.peek(), pattern_chars.peek()) {
                (_, Some('*')) => {
                    pattern_chars.next();
                    // A trailing * matches everything left
                    if pattern_chars.peek().is_none() {
                        return true;
                    }
                    let rest: String = pattern_chars.collect();
                    loop {
                        if Self::matches_pattern(&name_chars.clone().collect::<String>(), &rest) {
                            return true;
                        }
                        if name_chars.next().is_none() {
                            return false;
                        }
                    }
                }
                (Some(_), Some('?')) => {
                    name_chars.next();
                    pattern_chars.next();
                }
                (Some(n), Some(p)) if n == p => {
                    name_chars.next();
                    pattern_chars.next();
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::tests::shell_over;

    #[test]
    fn test_matches_pattern() {
        assert!(LsCommand::matches_pattern("file.txt", "*.txt"));
        assert!(LsCommand::matches_pattern("file.txt", "file.*"));
        assert!(LsCommand::matches_pattern("file.txt", "f?le.txt"));
        assert!(LsCommand::matches_pattern("file.txt", "*"));
        assert!(LsCommand::matches_pattern("a.json", "*a*.json"));
        assert!(!LsCommand::matches_pattern("file.txt", "*.json"));
        assert!(!LsCommand::matches_pattern("file.txt", "f?.txt"));
    }

    #[tokio::test]
    async fn test_ls_variants() {
        let mut state = shell_over(&[("dir/a.txt", b"a"), ("b.json", b"{}")]).await;

        state.execute("ls").await.unwrap();
        state.execute("ls -l dir").await.unwrap();
        state.execute("ls *.json").await.unwrap();
        state.execute("ls /dir/*.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_ls_missing_directory() {
        let mut state = shell_over(&[("a.txt", b"a")]).await;

        let err = state.execute("ls nope").await.unwrap_err();
        assert_eq!(err.to_string(), "No such directory: /nope");

        let err = state.execute("ls a.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "No such directory: /a.txt");
    }

    #[tokio::test]
    async fn test_list_helper_returns_entries() {
        let state = shell_over(&[("dir/a.txt", b"a"), ("b.json", b"{}")]).await;
        let names: Vec<_> = list(&state, &ArchivePath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["dir", "b.json"]);
    }
}
