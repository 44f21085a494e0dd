pub mod commands;

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::cache::ArchiveCache;
use crate::vfs::{self, ArchivePath};
use commands::Command;

/// Shell state - the open archive, the working directory inside it and the
/// registered commands
pub struct ShellState {
    /// Archive cache every command goes through
    cache: ArchiveCache,
    /// Source location of the open archive
    location: Url,
    /// Working directory inside the archive
    cwd: ArchivePath,
    /// Registered commands
    commands: HashMap<String, Arc<dyn Command>>,
}

impl ShellState {
    /// Open `location` through `cache` and start at the archive root
    pub async fn new(cache: ArchiveCache, location: Url) -> Result<Self> {
        cache
            .open(&location, None)
            .await
            .with_context(|| format!("Failed to open archive {location}"))?;

        let mut state = ShellState {
            cache,
            location,
            cwd: ArchivePath::root(),
            commands: HashMap::new(),
        };

        state.register_command(Arc::new(commands::ls::LsCommand));
        state.register_command(Arc::new(commands::cd::CdCommand));
        state.register_command(Arc::new(commands::cat::CatCommand));

        Ok(state)
    }

    fn register_command(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    /// Execute a command line
    pub async fn execute(&mut self, line: &str) -> Result<()> {
        let parts = Self::parse_command_line(line.trim())?;

        if parts.is_empty() {
            return Ok(());
        }

        let cmd_name = &parts[0];
        let args = &parts[1..];

        match cmd_name.as_str() {
            "exit" | "quit" => {
                return Err(anyhow!("exit"));
            }
            "help" => {
                self.print_help();
                return Ok(());
            }
            "pwd" => {
                println!("{}", self.cwd);
                return Ok(());
            }
            "stats" => {
                println!("{}", self.cache.stats());
                return Ok(());
            }
            "clear" => {
                self.cache.clear();
                println!("Cache cleared; the archive will be reloaded on next access");
                return Ok(());
            }
            _ => {}
        }

        if let Some(command) = self.commands.get(cmd_name) {
            let cmd = Arc::clone(command);
            cmd.execute(self, args).await
        } else {
            Err(anyhow!("Unknown command: {cmd_name}"))
        }
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn cwd(&self) -> &ArchivePath {
        &self.cwd
    }

    pub fn set_cwd(&mut self, path: ArchivePath) {
        self.cwd = path;
    }

    /// Resolve a user-supplied path against the working directory
    pub fn resolve(&self, path: &str) -> ArchivePath {
        self.cwd.join(path)
    }

    /// Virtual URL for `path` in the open archive.
    ///
    /// Goes through `open` each time, so an archive that was evicted or
    /// cleared is loaded again and the URL carries its current id.
    pub async fn url_for(&self, path: &ArchivePath) -> Result<Url> {
        let root = self.cache.open(&self.location, None).await?;
        let id = vfs::archive_id(&root).ok_or_else(|| anyhow!("Invalid archive root {root}"))?;
        let relative = path.to_string();
        Ok(vfs::virtual_url(&id, relative.trim_start_matches('/'))?)
    }

    fn print_help(&self) {
        println!("Available commands:");
        for name in ["ls", "cd", "cat"] {
            if let Some(command) = self.commands.get(name) {
                println!("  {}", command.usage());
            }
        }
        println!("  pwd - Print working directory");
        println!("  stats - Show cache statistics");
        println!("  clear - Drop every cached archive");
        println!("  help - Show this help");
        println!("  exit/quit - Exit the shell");
    }

    /// Get the prompt string
    pub fn prompt(&self) -> String {
        let name = self
            .location
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("archive");
        format!("{}:{}:{} $ ", self.cache.name(), name, self.cwd)
    }

    /// Parse command line respecting quotes (both single and double)
    fn parse_command_line(line: &str) -> Result<Vec<String>> {
        let mut args = Vec::new();
        let mut current_arg = String::new();
        let mut in_single_quote = false;
        let mut in_double_quote = false;
        let mut escape_next = false;

        for ch in line.chars() {
            if escape_next {
                current_arg.push(ch);
                escape_next = false;
                continue;
            }

            match ch {
                '\\' if !in_single_quote => {
                    escape_next = true;
                }
                '\'' if !in_double_quote => {
                    in_single_quote = !in_single_quote;
                }
                '"' if !in_single_quote => {
                    in_double_quote = !in_double_quote;
                }
                ' ' | '\t' if !in_single_quote && !in_double_quote => {
                    if !current_arg.is_empty() {
                        args.push(std::mem::take(&mut current_arg));
                    }
                }
                _ => {
                    current_arg.push(ch);
                }
            }
        }

        if !current_arg.is_empty() {
            args.push(current_arg);
        }

        if in_single_quote {
            return Err(anyhow!("Unclosed single quote"));
        }
        if in_double_quote {
            return Err(anyhow!("Unclosed double quote"));
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::source::MemorySource;
    use crate::archive::FormatCodec;
    use bytes::Bytes;
    use std::io::{Cursor, Write};

    pub(crate) async fn shell_over(files: &[(&str, &[u8])]) -> ShellState {
        let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = ::zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        let data = Bytes::from(writer.finish().unwrap().into_inner());

        let location = Url::parse("mem://fixtures/shell.zip").unwrap();
        let source = MemorySource::new();
        source.insert(location.clone(), data);
        let cache = ArchiveCache::with_collaborators(
            CacheConfig::default(),
            Arc::new(source),
            Arc::new(FormatCodec::new()),
        );
        ShellState::new(cache, location).await.unwrap()
    }

    #[test]
    fn test_parse_command_line() {
        assert_eq!(
            ShellState::parse_command_line("cat 'my file.txt'").unwrap(),
            ["cat", "my file.txt"]
        );
        assert_eq!(
            ShellState::parse_command_line("cd \"a b\"/c\\ d").unwrap(),
            ["cd", "a b/c d"]
        );
        assert_eq!(
            ShellState::parse_command_line("  ls   -l  ").unwrap(),
            ["ls", "-l"]
        );
        assert!(ShellState::parse_command_line("cat 'oops").is_err());
        assert!(ShellState::parse_command_line("cat \"oops").is_err());
    }

    #[tokio::test]
    async fn test_builtins() {
        let mut state = shell_over(&[("a.txt", b"a")]).await;

        state.execute("").await.unwrap();
        state.execute("pwd").await.unwrap();
        state.execute("stats").await.unwrap();
        assert_eq!(state.execute("exit").await.unwrap_err().to_string(), "exit");
        assert!(state.execute("frobnicate").await.is_err());
    }

    #[tokio::test]
    async fn test_url_for_survives_clear() {
        let state = shell_over(&[("dir/a.txt", b"a")]).await;
        let before = state.url_for(&ArchivePath::parse("/dir/a.txt")).await.unwrap();

        state.cache().clear();
        let after = state.url_for(&ArchivePath::parse("/dir/a.txt")).await.unwrap();

        assert_ne!(before, after);
        assert_eq!(state.cache().read_text(&after, None).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_prompt() {
        let mut state = shell_over(&[("dir/a.txt", b"a")]).await;
        assert_eq!(state.prompt(), "zipvfs:shell.zip:/ $ ");

        state.set_cwd(ArchivePath::parse("/dir"));
        assert_eq!(state.prompt(), "zipvfs:shell.zip:/dir $ ");
    }
}
