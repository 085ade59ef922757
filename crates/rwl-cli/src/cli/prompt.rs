//! Line prompts on stdin.

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Print `question` and read one trimmed line from stdin.
pub async fn ask(question: &str) -> Result<String> {
    print!("{}", question);
    let _ = std::io::stdout().flush();
    let mut stdin = BufReader::new(tokio::io::stdin());
    read_answer(&mut stdin).await
}

/// `[y/N]` question; anything but yes is no.
pub async fn confirm(question: &str) -> Result<bool> {
    let answer = ask(&format!("{} [y/N] ", question)).await?;
    Ok(is_yes(&answer))
}

pub async fn read_answer<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.context("read answer")?;
    if n == 0 {
        bail!("no answer: stdin closed");
    }
    Ok(line.trim().to_string())
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}
