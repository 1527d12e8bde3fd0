//! Stream a completion from an OpenAI-compatible endpoint
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! # optional, for LM Studio / vLLM / Ollama
//! export OPENAI_API_BASE="http://localhost:1234/v1"
//! export OPENAI_MODEL="gpt-4o-mini"
//! cargo run --example stream_completion -p promptcall-llm
//! ```

use futures::StreamExt;
use promptcall_llm::providers::OpenAIProvider;
use promptcall_llm::{CompletionRequest, LLMProvider, Message, TokenUsage};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider = OpenAIProvider::from_env()?;
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    println!("Provider: {}", provider.name());
    println!("API Base: {}", provider.config().api_base);
    println!("Model: {model}\n");

    let request = CompletionRequest::builder(&model)
        .add_message(Message::system("You are a librarian. Answer in one sentence."))
        .add_message(Message::user("Recommend a fantasy book"))
        .max_tokens(128)
        .build();

    let mut stream = provider.stream(request).await?;
    let mut usage = TokenUsage::default();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk.content)?;
        stdout.flush()?;
        if let Some(u) = chunk.usage {
            usage.accumulate(u);
        }
    }

    println!(
        "\n\nTokens: {} in / {} out",
        usage.input_tokens, usage.output_tokens
    );
    Ok(())
}
