//! Pocket CLI - chat with a tool-using agent from the terminal
//!
//! Runs an interactive prompt loop by default. Each line is one agent
//! invocation; the result is printed as `@ <output>`.

mod toolbox;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::Value;

use pocket_core::config::{ConfigManager, ToolErrorPolicy};
use pocket_core::model::{GenAIModel, ProviderType};
use pocket_core::{Agent, Config};

use toolbox::Toolbox;

/// Words that end the interactive session
const EXIT_WORDS: [&str; 3] = ["exit", "thanks", "tq"];

#[derive(Parser)]
#[command(name = "pocket")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A small tool-using conversational agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to <config dir>/pocket-agent/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// LLM provider (gemini, openai, anthropic, cohere, groq, deepseek, ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (defaults to the provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Background text for the system instruction
    #[arg(long)]
    context: Option<String>,

    /// Maximum model rounds per request (0 for unlimited)
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Report tool failures to the model instead of aborting
    #[arg(long)]
    observe_tool_errors: bool,

    /// Attach a tool server script (.py or .js); repeatable
    #[arg(long = "mcp", value_name = "SCRIPT")]
    mcp: Vec<PathBuf>,

    /// Execute a single prompt and exit (non-interactive mode)
    #[arg(long)]
    one_shot: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat mode
    Chat,

    /// Show available tools
    Tools,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Quiet by default so logs don't interleave with the prompt
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "info,pocket_core=debug,pocket_mcp=debug"
        } else {
            "warn"
        })
        .init();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    let mut config = manager.config().clone();
    apply_overrides(&mut config, &cli)?;

    if matches!(cli.command, Some(Commands::Config)) {
        show_config(&config, manager.path())?;
        return Ok(());
    }

    let mut toolbox = Toolbox::builtin();
    let outcome = match toolbox.attach(&config.mcp_servers, &cli.mcp).await {
        Ok(()) => run(&cli, &config, &toolbox).await,
        Err(e) => Err(e),
    };
    toolbox.close().await;
    outcome
}

async fn run(cli: &Cli, config: &Config, toolbox: &Toolbox) -> anyhow::Result<()> {
    if matches!(cli.command, Some(Commands::Tools)) {
        show_tools(toolbox);
        return Ok(());
    }

    let model = GenAIModel::from_config(&config.provider)?;
    let agent = Agent::with_config(Arc::new(model), config.agent.clone())
        .with_tools(toolbox.registry.clone());

    match &cli.one_shot {
        Some(prompt) => {
            let output = agent.invoke(prompt).await?;
            println!("@ {}", render_output(&output));
            Ok(())
        }
        None => run_chat(&agent, config).await,
    }
}

/// Fold command-line flags into the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(provider) = &cli.provider {
        let provider_type: ProviderType = provider.parse().map_err(anyhow::Error::msg)?;
        if provider_type != config.provider.provider_type {
            // Model and key env belong to the previous provider
            config.provider.model = None;
            config.provider.api_key = None;
            config.provider.api_key_env = None;
        }
        config.provider.provider_type = provider_type;
    }
    if let Some(model) = &cli.model {
        config.provider.model = Some(model.clone());
    }
    if let Some(context) = &cli.context {
        config.agent.context = context.clone();
    }
    if let Some(max_rounds) = cli.max_rounds {
        config.agent.max_rounds = max_rounds;
    }
    if cli.observe_tool_errors {
        config.agent.on_tool_error = ToolErrorPolicy::Observe;
    }
    Ok(())
}

async fn run_chat(agent: &Agent, config: &Config) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;

    println!(
        "{} {} ({} tools). Type {} to quit.",
        style("pocket").bold().cyan(),
        style(config.provider.model.as_deref().unwrap_or(config.provider.provider_type.default_model())).dim(),
        agent.tools().len(),
        style("exit").bold()
    );

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let prompt = line.trim();
                if prompt.is_empty() {
                    continue;
                }
                if is_exit_command(prompt) {
                    break;
                }
                let _ = editor.add_history_entry(prompt);

                match agent.invoke(prompt).await {
                    Ok(output) => println!("@ {}", render_output(&output)),
                    Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    EXIT_WORDS.contains(&input.to_lowercase().as_str())
}

/// Strings print bare; anything else as JSON
fn render_output(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn show_tools(toolbox: &Toolbox) {
    println!("{}", style("Available Tools:").bold());
    println!();
    for descriptor in toolbox.registry.describe_all() {
        println!("  {}", descriptor);
    }
}

fn show_config(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some("********".to_string());
    }

    println!("{} {}", style("Config file:").bold(), path.display());
    println!();
    println!("{}", toml::to_string_pretty(&shown)?);
    println!(
        "{} {}",
        style("API key:").bold(),
        if config.provider.get_api_key().is_some() { "found" } else { "missing" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("pocket").chain(args.iter().copied()))
    }

    #[test]
    fn test_exit_words() {
        for word in ["exit", "thanks", "tq", "EXIT", "Thanks"] {
            assert!(is_exit_command(word), "{}", word);
        }
        assert!(!is_exit_command("thanks for the help"));
    }

    #[test]
    fn test_render_output() {
        assert_eq!(render_output(&Value::String("5".into())), "5");
        assert_eq!(render_output(&serde_json::json!({"sum": 5})), r#"{"sum":5}"#);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let args = cli(&[
            "--provider", "cohere", "--max-rounds", "0", "--observe-tool-errors",
            "--context", "Be brief.", "--mcp", "a.py", "--mcp", "b.js",
        ]);
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.provider.provider_type, ProviderType::Cohere);
        assert_eq!(config.agent.max_rounds, 0);
        assert_eq!(config.agent.on_tool_error, ToolErrorPolicy::Observe);
        assert_eq!(config.agent.context, "Be brief.");
        assert_eq!(args.mcp, vec![PathBuf::from("a.py"), PathBuf::from("b.js")]);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &cli(&["--provider", "nope"])).is_err());
    }

    #[test]
    fn test_tools_subcommand_parses() {
        assert!(matches!(cli(&["tools"]).command, Some(Commands::Tools)));
    }
}
