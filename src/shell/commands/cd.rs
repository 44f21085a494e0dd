use anyhow::Result;
use async_trait::async_trait;

use super::ls::list;
use super::{Command, ShellState};
use crate::vfs::ArchivePath;

pub struct CdCommand;

#[async_trait]
impl Command for CdCommand {
    fn name(&self) -> &str {
        "cd"
    }

    fn usage(&self) -> &str {
        "cd [PATH] - Change directory (no PATH returns to the archive root)"
    }

    async fn execute(&self, state: &mut ShellState, args: &[String]) -> Result<()> {
        let target = match args.first() {
            Some(path) => state.resolve(path),
            None => ArchivePath::root(),
        };

        // Listing fails for files and missing paths
        list(state, &target).await?;
        state.set_cwd(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::tests::shell_over;

    #[tokio::test]
    async fn test_cd_navigation() {
        let mut state = shell_over(&[("a/b/c.txt", b"c"), ("top.txt", b"t")]).await;

        state.execute("cd a/b").await.unwrap();
        assert_eq!(state.cwd().to_string(), "/a/b");

        state.execute("cd ..").await.unwrap();
        assert_eq!(state.cwd().to_string(), "/a");

        state.execute("cd /a/./b/../b").await.unwrap();
        assert_eq!(state.cwd().to_string(), "/a/b");

        state.execute("cd").await.unwrap();
        assert!(state.cwd().is_root());
    }

    #[tokio::test]
    async fn test_cd_rejects_files_and_missing_paths() {
        let mut state = shell_over(&[("a/b/c.txt", b"c"), ("top.txt", b"t")]).await;

        let err = state.execute("cd top.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "No such directory: /top.txt");
        assert!(state.cwd().is_root());

        assert!(state.execute("cd missing").await.is_err());
        assert!(state.cwd().is_root());
    }
}
