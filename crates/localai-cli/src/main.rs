use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use localai_chat::{ChatController, ChatError, ChatOptions, TurnOutcome};
use localai_core::budget::{CharRatioEstimator, ContextLevel};
use localai_core::paths::store_dir;
use localai_core::{Config, FileStore, SessionTokens, SettingsStore, TokenEstimator, TokenUsage};
use localai_llm::{ChatTransport, FailureKind, GatewayTransport};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "localai")]
#[command(about = "Chat with a LocalAI+ gateway from the terminal")]
#[command(version)]
struct Cli {
    /// Gateway base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Model id for this run (overrides config; a stored selection still wins)
    #[arg(long)]
    model: Option<String>,

    /// Persona preset: general, coder, researcher, creative
    #[arg(long)]
    persona: Option<String>,

    /// Directory for settings and transcript
    #[arg(long, env = "LOCALAI_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start interactive chat
    Chat,
    /// Send a single message
    Send {
        /// Message content
        message: String,
    },
    /// List models served by the gateway
    Models,
    /// Store the API key; omit to remove it
    SetKey { key: Option<String> },
    /// Store the selected model
    SetModel { model: String },
    /// Start a new chat
    Clear,
    /// Print the transcript
    History,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(api_url) = &self.api_url {
            config.api_base = api_url.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(persona) = &self.persona {
            config.persona = Some(persona.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let mut config = Config::load();
    cli.apply_overrides(&mut config);
    log::debug!("Using gateway {} (model {})", config.api_base, config.model);

    let store_path = cli.store_dir.clone().unwrap_or_else(store_dir);
    let store = Arc::new(FileStore::new(&store_path));
    store
        .init()
        .await
        .with_context(|| format!("Failed to create store at {}", store_path.display()))?;

    let transport = Arc::new(GatewayTransport::with_max_retries(
        config.api_base.clone(),
        config.max_retries,
    ));

    match cli.command {
        Commands::Chat => {
            let chat = build_controller(&config, transport, store).await?;
            run_interactive_chat(&chat, &config).await
        }
        Commands::Send { message } => {
            let chat = build_controller(&config, transport, store).await?;
            attach_stdout(&chat);
            run_turn(&chat, message).await?;
            Ok(())
        }
        Commands::Models => list_models(transport.as_ref(), store.as_ref(), &config).await,
        Commands::SetKey { key } => {
            let key = key.filter(|k| !k.trim().is_empty());
            let removed = key.is_none();
            store.set_api_key(key).await?;
            if removed {
                println!("{}", "API key removed".green());
            } else {
                println!("{}", "API key saved".green());
            }
            Ok(())
        }
        Commands::SetModel { model } => {
            store.set_selected_model(model.clone()).await?;
            println!("{}", format!("Selected model: {}", model).green());
            Ok(())
        }
        Commands::Clear => {
            let chat = build_controller(&config, transport, store).await?;
            chat.clear().await?;
            println!("{}", "Started a new chat".green());
            Ok(())
        }
        Commands::History => {
            let chat = build_controller(&config, transport, store).await?;
            print_history(&chat).await
        }
    }
}

async fn build_controller(
    config: &Config,
    transport: Arc<GatewayTransport>,
    store: Arc<FileStore>,
) -> anyhow::Result<ChatController> {
    // A resumed transcript already occupies part of the context window.
    let history = localai_core::TranscriptStore::messages(store.as_ref()).await?;
    let used = CharRatioEstimator::default().estimate_messages(&history);

    Ok(ChatController::new(
        transport,
        store.clone(),
        store,
        SessionTokens::starting_at(u64::from(used)),
        ChatOptions::from(config),
    ))
}

fn attach_stdout(chat: &ChatController) {
    chat.on_chunk(|text| {
        print!("{}", text);
        let _ = io::stdout().flush();
    });
}

/// Run one turn; Ctrl-C cancels it.
async fn run_turn(chat: &ChatController, prompt: String) -> anyhow::Result<()> {
    let mut handle = chat.submit(prompt);

    let result = loop {
        tokio::select! {
            joined = &mut handle => break joined?,
            _ = tokio::signal::ctrl_c() => chat.cancel(),
        }
    };

    match result {
        Ok(TurnOutcome::Completed { usage, .. }) => {
            println!();
            print_usage(chat, &usage);
        }
        Ok(TurnOutcome::Aborted) => println!("\n{}", "(cancelled)".yellow()),
        Err(e) => print_failure(&e),
    }
    Ok(())
}

enum PromptInput {
    Line(String),
    Interrupted,
    Closed,
}

/// Wait for the next input line. `interrupt` firing first wins.
async fn read_prompt<R, I>(lines: &mut Lines<R>, interrupt: I) -> io::Result<PromptInput>
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::select! {
        biased;
        _ = interrupt => Ok(PromptInput::Interrupted),
        line = lines.next_line() => Ok(match line? {
            Some(line) => PromptInput::Line(line),
            None => PromptInput::Closed,
        }),
    }
}

async fn run_interactive_chat(chat: &ChatController, config: &Config) -> anyhow::Result<()> {
    println!("{}", "LocalAI+ Chat".cyan().bold());
    println!(
        "{}",
        format!(
            "Gateway: {}  Persona: {}",
            config.api_base,
            config.persona.as_deref().unwrap_or("none")
        )
        .dimmed()
    );
    println!(
        "{}",
        "Type 'exit' or 'quit' to leave, '/clear' for a new chat. Ctrl-C cancels a reply, or exits at the prompt."
            .dimmed()
    );
    println!();

    attach_stdout(chat);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        // The first turn replaces the default SIGINT handler, so the prompt
        // listens for Ctrl-C itself.
        let input = match read_prompt(&mut lines, tokio::signal::ctrl_c()).await? {
            PromptInput::Line(input) => input,
            PromptInput::Interrupted => {
                println!("\n{}", "Goodbye!".cyan());
                break;
            }
            PromptInput::Closed => break,
        };
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "Goodbye!".cyan());
            break;
        }

        if input.is_empty() {
            continue;
        }

        if input == "/clear" {
            chat.clear().await?;
            println!("{}", "Started a new chat".green());
            continue;
        }

        println!("{}", "Assistant:".green().bold());
        run_turn(chat, input.to_string()).await?;
        println!();
    }

    Ok(())
}

fn print_usage(chat: &ChatController, usage: &TokenUsage) {
    let window = chat.context_window();
    let used = chat.session_tokens().total();
    let level = chat.context_level();

    let context = format!(
        "context {}/{} ({:.1}%) {}",
        used,
        window.limit,
        window.percentage(used),
        level
    );
    let context = match level {
        ContextLevel::Normal => context.green(),
        ContextLevel::Warning => context.yellow(),
        ContextLevel::Critical => context.red().bold(),
    };

    println!(
        "{}  {}",
        format!(
            "tokens: prompt {} + completion {} = {}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        )
        .dimmed(),
        context
    );
}

fn print_failure(error: &ChatError) {
    match error {
        ChatError::IncompleteStream { .. } => {
            println!("\n{}", format!("Reply was cut off: {}", error).yellow());
        }
        ChatError::Transport(_) => {
            let hint = match error.failure_kind() {
                Some(FailureKind::Connectivity) => "could not reach the gateway",
                _ => "the gateway reported an error",
            };
            println!("\n{}", format!("Error ({}): {}", hint, error).red());
            if error.is_retryable() {
                println!("{}", "This may succeed if you try again.".dimmed());
            }
        }
        other => log::warn!("Turn not sent: {}", other),
    }
}

async fn list_models(
    transport: &GatewayTransport,
    store: &FileStore,
    config: &Config,
) -> anyhow::Result<()> {
    let api_key = store.api_key().await?.or_else(|| config.api_key.clone());
    let selected = store
        .selected_model()
        .await?
        .unwrap_or_else(|| config.model.clone());

    let models = transport
        .list_models(api_key.as_deref())
        .await
        .context("Failed to list models")?;

    if models.is_empty() {
        println!("{}", "No models reported by the gateway".yellow());
    }
    for model in models {
        if model == selected {
            println!("{} {}", "*".green().bold(), model.green());
        } else {
            println!("  {}", model);
        }
    }
    Ok(())
}

async fn print_history(chat: &ChatController) -> anyhow::Result<()> {
    let messages = chat.messages().await?;
    if messages.is_empty() {
        println!("{}", "No messages yet".dimmed());
        return Ok(());
    }

    for message in messages {
        let label = format!("{}:", message.role);
        let label = match message.role {
            localai_core::Role::System => label.dimmed(),
            localai_core::Role::User => label.cyan().bold(),
            localai_core::Role::Assistant => label.green().bold(),
        };
        println!("{} {}", label, message.content);
        for call in &message.tool_calls {
            println!(
                "{}",
                format!("  -> {}({})", call.function.name, call.function.arguments).dimmed()
            );
        }
    }
    Ok(())
}
