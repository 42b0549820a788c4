use portfolio_agent::{AgentConfig, AgentSession};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One-shot chat from the command line:
/// `agent [--conversation <id>] <message...>`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let mut args = std::env::args().skip(1).peekable();
    let mut conversation_id = None;
    if args.peek().map(String::as_str) == Some("--conversation") {
        args.next();
        conversation_id = args.next();
    }

    let message = args.collect::<Vec<_>>().join(" ");
    if message.trim().is_empty() {
        eprintln!("usage: agent [--conversation <id>] <message>");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    let session = AgentSession::from_config(&config)?;

    info!(model = %config.model, "Running one-shot chat");

    match session.chat(&message, conversation_id.as_deref()).await {
        Ok(response) => {
            println!("{}", response.response);
            println!("\n=== VERIFICATION ===");
            for result in &response.verification {
                let mark = if result.passed { "✓" } else { "✗" };
                println!("  {} {}: {}", mark, result.check_type, result.details);
            }
            println!(
                "\nConversation: {} | Confidence: {} | Tokens: {} | {}ms",
                response.conversation_id,
                response
                    .metadata
                    .confidence_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                response.metadata.tokens_used,
                response.metadata.latency_ms
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Chat failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
