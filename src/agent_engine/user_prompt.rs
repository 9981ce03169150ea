use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;

use crate::errors::{PilotError, PilotResult};

/// Answers `ask_user` questions on behalf of the person running the task.
#[async_trait]
pub trait UserPrompter: Send + Sync {
    async fn ask(&self, question: &str) -> PilotResult<String>;
}

/// Writes the question and reads one line as the answer. The reader lives as
/// long as the prompter, so input typed ahead is kept for later questions.
pub struct LinePrompter<R, W> {
    input: Mutex<Lines<BufReader<R>>>,
    output: Mutex<W>,
}

impl LinePrompter<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LinePrompter<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(BufReader::new(input).lines()),
            output: Mutex::new(output),
        }
    }
}

#[async_trait]
impl<R, W> UserPrompter for LinePrompter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(&self, question: &str) -> PilotResult<String> {
        {
            let mut out = self.output.lock().await;
            out.write_all(format!("\n[agent asks] {question}\n> ").as_bytes())
                .await?;
            out.flush().await?;
        }

        match self.input.lock().await.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(PilotError::UserPrompt("input closed".into())),
        }
    }
}

/// For unattended runs: every question goes unanswered.
pub struct NoPrompter;

#[async_trait]
impl UserPrompter for NoPrompter {
    async fn ask(&self, _question: &str) -> PilotResult<String> {
        Err(PilotError::UserPrompt("no interactive user".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_typed_ahead_answers_survive_between_questions() {
        let prompter = LinePrompter::new(&b"Alice\n  the blue one  \n"[..], Vec::new());

        assert_eq!(prompter.ask("Which contact?").await.unwrap(), "Alice");
        assert_eq!(prompter.ask("Which color?").await.unwrap(), "the blue one");
        assert!(matches!(
            prompter.ask("Anything else?").await,
            Err(PilotError::UserPrompt(_))
        ));

        let shown = String::from_utf8(prompter.output.into_inner()).unwrap();
        assert!(shown.contains("[agent asks] Which contact?"));
        assert!(shown.contains("[agent asks] Which color?"));
    }

    #[tokio::test]
    async fn test_unattended_never_answers() {
        assert!(matches!(
            NoPrompter.ask("Which contact?").await,
            Err(PilotError::UserPrompt(_))
        ));
    }
}
