use std::io::{self, Write};

use anyhow::{Context, Result};
use chief_agents::{build_agent, ChiefConfig, DefaultAgent};
use chief_core::{template_for, InboundMessage, Intent, ReplyOrigin};
use chief_observability::{init_tracing, AppMetrics};
use clap::{Parser, Subcommand};
use serde_json::json;

const CONSOLE_USER: &str = "local_user";
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

#[derive(Debug, Parser)]
#[command(name = "chief")]
#[command(about = "Chief auto-reply console")]
struct Cli {
    /// SQLite database for interactions and user memory; in-memory when unset.
    #[arg(long, env = "CHIEF_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Classify {
        text: String,
    },
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
    /// Posts webhook-shaped payloads to a running `chief-api`.
    Simulate {
        #[arg(long, default_value = "http://127.0.0.1:5000/webhook")]
        url: String,
        #[arg(long, default_value = "test_user_1")]
        sender: String,
        texts: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum MemoryCommand {
    Show { user: String },
    Clear { user: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("chief_cli");
    let cli = Cli::parse();

    let command = match cli.command {
        Command::Simulate { url, sender, texts } => return simulate(&url, &sender, &texts).await,
        command => command,
    };

    let mut config = ChiefConfig::from_env();
    if cli.database_url.is_some() {
        config.database_url = cli.database_url;
    }
    let agent = build_agent(&config, AppMetrics::shared()).await?;

    match command {
        Command::Chat => run_chat(&agent).await?,
        Command::Classify { text } => {
            let result = agent.classify(&text);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::History { limit } => {
            let history = agent.recent_interactions(limit).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Memory { command } => match command {
            MemoryCommand::Show { user } => {
                let memory = agent.user_memory(&user).await?;
                println!("{}", serde_json::to_string_pretty(&memory)?);
            }
            MemoryCommand::Clear { user } => {
                if agent.clear_user_memory(&user).await? {
                    println!("cleared memory for {user}");
                } else {
                    println!("no memory stored for {user}");
                }
            }
        },
        Command::Simulate { .. } => {}
    }

    Ok(())
}

async fn run_chat(agent: &DefaultAgent) -> Result<()> {
    println!("Chief console. type 'exit' to quit.");

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if EXIT_WORDS
            .iter()
            .any(|word| message.eq_ignore_ascii_case(word))
        {
            println!("Bot: {}", template_for(Intent::Goodbye).unwrap_or("Goodbye!"));
            break;
        }

        if message.is_empty() {
            continue;
        }

        let handled = agent
            .respond(&InboundMessage {
                sender_id: CONSOLE_USER.to_string(),
                text: message.to_string(),
            })
            .await;

        println!("Bot: {}", handled.reply.text);
        if let ReplyOrigin::LocalFallback { reason } = &handled.reply.origin {
            println!("(note: generation unavailable, replied locally: {reason})");
        }
    }

    Ok(())
}

async fn simulate(url: &str, sender: &str, texts: &[String]) -> Result<()> {
    let defaults = [
        "Hello",
        "Can you tell me the pricing?",
        "I want to track my order #12345",
    ];
    let texts: Vec<&str> = if texts.is_empty() {
        defaults.to_vec()
    } else {
        texts.iter().map(String::as_str).collect()
    };

    let client = reqwest::Client::new();
    for text in texts {
        let payload = json!({
            "entry": [{
                "messaging": [{
                    "sender": { "id": sender },
                    "message": { "text": text }
                }]
            }]
        });

        let response = client
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed posting to {url}"))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        println!("-> {text}");
        println!("<- {status} {body}");
    }

    Ok(())
}
