use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::output::{print_line, print_str};
use super::{Command, ShellState};
use crate::error::VfsError;
use crate::ui::create_spinner;

/// Bytes of binary content shown as hex
const HEX_DUMP_LIMIT: usize = 1024;

pub struct CatCommand;

#[async_trait]
impl Command for CatCommand {
    fn name(&self) -> &str {
        "cat"
    }

    fn usage(&self) -> &str {
        "cat FILE... - Display file contents"
    }

    async fn execute(&self, state: &mut ShellState, args: &[String]) -> Result<()> {
        if args.is_empty() {
            return Err(anyhow!("Usage: cat FILE"));
        }

        for arg in args {
            let path = state.resolve(arg);
            let url = state.url_for(&path).await?;

            let filename = path.file_name().unwrap_or("/");
            let spinner = create_spinner(&format!("Extracting {filename}..."));
            let result = state.cache().read_binary(&url, None).await;
            spinner.finish_and_clear();

            let bytes = result.map_err(|err| match err {
                VfsError::NotFound { .. } => anyhow!("No such file: {path}"),
                VfsError::InternalConsistency { .. } => anyhow!("Is a directory: {path}"),
                other => other.into(),
            })?;

            match std::str::from_utf8(&bytes) {
                Ok(text) => print_str!("{text}"),
                Err(_) => {
                    eprintln!("Warning: File contains binary data");
                    print_line!("{}", hex_dump(&bytes, HEX_DUMP_LIMIT));
                    if bytes.len() > HEX_DUMP_LIMIT {
                        eprintln!("... ({} more bytes)", bytes.len() - HEX_DUMP_LIMIT);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Offset-prefixed hex rows of 16 bytes, covering at most `limit` bytes
fn hex_dump(bytes: &[u8], limit: usize) -> String {
    bytes[..bytes.len().min(limit)]
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            format!("{:08x}: {}", row * 16, hex.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::tests::shell_over;

    #[test]
    fn test_hex_dump() {
        let bytes: Vec<u8> = (0u8..20).collect();
        assert_eq!(
            hex_dump(&bytes, 1024),
            "00000000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n00000010: 10 11 12 13"
        );
        assert_eq!(hex_dump(&bytes, 2), "00000000: 00 01");
    }

    #[tokio::test]
    async fn test_cat_files() {
        let mut state = shell_over(&[
            ("dir/a.txt", b"hello\n"),
            ("blob.bin", &[0xff, 0x00, 0xfe]),
        ])
        .await;

        state.execute("cat dir/a.txt").await.unwrap();
        state.execute("cat blob.bin /dir/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_cat_errors() {
        let mut state = shell_over(&[("dir/a.txt", b"hello\n")]).await;

        assert_eq!(
            state.execute("cat").await.unwrap_err().to_string(),
            "Usage: cat FILE"
        );
        assert_eq!(
            state.execute("cat dir").await.unwrap_err().to_string(),
            "Is a directory: /dir"
        );
        assert_eq!(
            state.execute("cat nope.txt").await.unwrap_err().to_string(),
            "No such file: /nope.txt"
        );
    }
}
