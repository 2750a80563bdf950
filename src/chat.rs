//! Interactive multi-turn conversation over the index.

use codechat_core::CodeChat;
use codechat_llm::{AnyProvider, Message};
use dialoguer::Input;

use crate::render_answer;

const EXIT_COMMANDS: &[&str] = &["/exit", "/quit"];

/// Read questions until `/exit`, keeping the conversation as history.
///
/// # Errors
///
/// Returns an error if the terminal cannot be read. Query failures are
/// printed and the loop continues.
pub async fn run(codechat: &CodeChat<AnyProvider>, k: Option<usize>) -> anyhow::Result<()> {
    println!("codechat: ask about the indexed repository, /exit to quit\n");
    let mut history: Vec<Message> = Vec::new();

    loop {
        let line = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("you")
                .allow_empty(true)
                .interact_text()
        })
        .await??;

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question) {
            break;
        }

        match codechat.query(question, k, &history).await {
            Ok(answer) => {
                println!("\n{}\n", render_answer(&answer));
                record_turn(&mut history, question, &answer.answer);
            }
            Err(e) => {
                tracing::warn!("query failed: {e}");
                eprintln!("error: {e}\n");
            }
        }
    }
    Ok(())
}

fn record_turn(history: &mut Vec<Message>, question: &str, answer: &str) {
    history.push(Message::user(question));
    history.push(Message::assistant(answer));
}
