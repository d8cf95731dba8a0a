use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use invoicebot::api;
use invoicebot::commands::CommandHandler;
use invoicebot::config::AppConfig;
use invoicebot::database::Database;
use invoicebot::providers::deepseek::deepseek::DeepSeekProvider;
use invoicebot::providers::gemini::gemini::GeminiProvider;
use invoicebot::providers::traits::CompletionProvider;

const SYSTEM_MESSAGE: &str =
    "You are InvoiceBot, an assistant that answers questions about stored invoices.";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    api_key: Option<String>,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "3000")]
    port: u16,
}

async fn build_provider(
    name: &str,
    api_key: String,
) -> anyhow::Result<Box<dyn CompletionProvider + Send + Sync>> {
    match name {
        "gemini" => Ok(Box::new(
            GeminiProvider::new(api_key, SYSTEM_MESSAGE.to_string()).await?,
        )),
        "deepseek" => Ok(Box::new(
            DeepSeekProvider::new(api_key, SYSTEM_MESSAGE.to_string()).await?,
        )),
        _ => anyhow::bail!(
            "Unknown provider: {}. Available providers: gemini, deepseek",
            name
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = AppConfig::from_env();

    let provider_name = args
        .provider
        .clone()
        .or_else(|| env::var("INVOICEBOT_PROVIDER").ok())
        .unwrap_or_else(|| "gemini".to_string());

    let api_key = args
        .api_key
        .clone()
        .or_else(|| env::var(format!("{}_API_KEY", provider_name.to_uppercase())).ok())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No API key found. Pass --api-key or set {}_API_KEY in your environment.",
                provider_name.to_uppercase()
            )
        })?;

    let provider = build_provider(&provider_name, api_key).await?;
    let db_path = args.db.clone().unwrap_or_else(|| config.db_path.clone());
    let db = Database::new(&db_path).await?;

    if args.api {
        let app = api::create_api(provider, db, config.reference_date);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = TcpListener::bind(addr).await?;
        println!("🚀 InvoiceBot API listening on {}", addr);
        axum::serve(listener, app).await?;
        return Ok(());
    }

    run_repl(provider, db, &config).await
}

async fn run_repl(
    provider: Box<dyn CompletionProvider + Send + Sync>,
    db: Database,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mut handler = CommandHandler::new(provider, db, config.reference_date);
    let mut rl = Editor::<(), DefaultHistory>::new()?;

    println!("{}", "📄 InvoiceBot — chat with your invoices".bright_green());
    println!("Type 'help' for commands, 'exit' to quit.\n");

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let input = line.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&input);
                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    break;
                }

                // The interface blocks while a query or upload runs; the
                // spinner is the busy indicator.
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {msg}")
                        .unwrap(),
                );
                spinner.set_message("Processing...");
                spinner.enable_steady_tick(Duration::from_millis(100));

                let result = handler.handle_command(&input).await;
                spinner.finish_and_clear();

                if let Err(e) = result {
                    println!("{} {}", "Error:".red(), e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("{} {}", "Input error:".red(), e);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
