//! Concierge CLI Entry Point
//!
//! Reads one request per line from stdin and prints each outcome as a JSON
//! line. `accept <id>` and `reject <id>` answer a pending proposal.

use std::sync::Arc;

use concierge_core::{
    AuthToken, BreakerConfig, ConciergeConfig, ConciergeResult, ConversationMessage, LlmError,
};
use concierge_engine::constants::{
    ACCEPT_COMMAND, DEFAULT_SESSION_ID, ENV_ANTHROPIC_API_KEY, ENV_CONFIG_PATH, ENV_MODEL,
    ENV_USER_TOKEN, REJECT_COMMAND,
};
use concierge_engine::{init_tracer, Orchestrator, RequestOutcome, SessionHistory, TelemetryConfig};
use concierge_llm::{AnthropicBackend, AvailabilityBreaker, GenerativeBackend, ProtectedBackend};
use concierge_registry::{CapabilityRegistry, HttpCapability};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

#[tokio::main]
async fn main() -> ConciergeResult<()> {
    init_tracer(&TelemetryConfig::default())?;

    let config = load_config()?;
    let registry = Arc::new(build_registry(&config)?);
    let backend = Arc::new(build_backend(&config.breaker)?);
    let history = Arc::new(SessionHistory::new());
    let orchestrator = Orchestrator::new(registry, backend, history.clone(), config);
    let auth = std::env::var(ENV_USER_TOKEN).ok().map(AuthToken::new);

    tracing::info!(health = ?orchestrator.health().status, "Concierge ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let outcome = handle_line(&orchestrator, &history, text, auth.as_ref()).await;
        let rendered = serde_json::to_string(&outcome)
            .unwrap_or_else(|e| format!("{{\"message\":\"unrenderable outcome: {}\"}}", e));
        if let Err(e) = stdout.write_all(format!("{}\n", rendered).as_bytes()).await {
            tracing::error!(error = %e, "stdout write failed");
            break;
        }
        let _ = stdout.flush().await;
    }

    Ok(())
}

enum Command {
    Accept(Uuid),
    Reject(Uuid),
}

async fn handle_line(
    orchestrator: &Orchestrator,
    history: &SessionHistory,
    text: &str,
    auth: Option<&AuthToken>,
) -> RequestOutcome {
    let result = match parse_command(text) {
        Some(Command::Accept(id)) => orchestrator.accept_proposal(id, auth).await,
        Some(Command::Reject(id)) => orchestrator
            .reject_proposal(id)
            .map(|()| RequestOutcome::message_only("Okay, I won't do that.")),
        None => {
            let result = orchestrator
                .process_request(text, DEFAULT_SESSION_ID, auth)
                .await;
            // Recorded after analysis so the request is not its own context.
            history.record(DEFAULT_SESSION_ID, ConversationMessage::new("user", text));
            result
        }
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "request failed");
            RequestOutcome::from_error(&e)
        }
    };
    history.record(
        DEFAULT_SESSION_ID,
        ConversationMessage::new("assistant", outcome.message.clone()),
    );
    outcome
}

/// `accept <id>` or `reject <id>` with a well-formed id; anything else,
/// "accept invitations" included, is a request.
fn parse_command(text: &str) -> Option<Command> {
    let (verb, rest) = text.split_once(char::is_whitespace)?;
    let id = Uuid::parse_str(rest.trim()).ok()?;
    match verb.to_lowercase().as_str() {
        ACCEPT_COMMAND => Some(Command::Accept(id)),
        REJECT_COMMAND => Some(Command::Reject(id)),
        _ => None,
    }
}

fn load_config() -> ConciergeResult<ConciergeConfig> {
    match std::env::var(ENV_CONFIG_PATH) {
        Ok(path) => ConciergeConfig::from_file(path),
        Err(_) => ConciergeConfig::from_env(),
    }
}

fn build_registry(config: &ConciergeConfig) -> ConciergeResult<CapabilityRegistry> {
    let mut builder = CapabilityRegistry::builder();
    for remote in &config.capabilities {
        tracing::info!(capability = %remote.name, endpoint = %remote.endpoint, "registering remote capability");
        builder = builder.register(Arc::new(HttpCapability::from_config(remote)));
    }
    if let Some(default) = config.planner.default_capability {
        builder = builder.with_default(default);
    }
    Ok(builder.build()?)
}

fn build_backend(breaker: &BreakerConfig) -> ConciergeResult<ProtectedBackend> {
    let api_key = std::env::var(ENV_ANTHROPIC_API_KEY).map_err(|_| LlmError::ProviderNotConfigured)?;
    let provider = match std::env::var(ENV_MODEL) {
        Ok(model) => AnthropicBackend::new(api_key, model),
        Err(_) => AnthropicBackend::with_default_model(api_key),
    };
    let provider: Arc<dyn GenerativeBackend> = Arc::new(provider);
    Ok(ProtectedBackend::new(
        provider,
        Arc::new(AvailabilityBreaker::new(breaker)),
    ))
}
