use clap::Parser;
use concierge_client::{
    ExchangeCoordinator, ExchangeError, ExchangeOutcome, ExchangeRejection, HttpTransport,
    SubmitRejection,
};
use concierge_core::{DEFAULT_GREETING, HistoryLimits};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "> ";
const ERROR_NOTICE: &str = "[!] 送信できませんでした。Enter で再送信します";

#[derive(Debug, Parser)]
#[command(name = "concierge-chat", about = "Terminal chat widget", version)]
struct Cli {
    /// Base URL of the chat server
    #[arg(long, default_value = "http://localhost:80")]
    url: String,
    /// Print sanitized HTML instead of the raw reply text
    #[arg(long)]
    html: bool,
    /// Opening line shown before the first turn
    #[arg(long, default_value = DEFAULT_GREETING)]
    greeting: String,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ExchangeError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let transport = HttpTransport::connect(&cli.url).await?;
    let mut coordinator = ExchangeCoordinator::new(Some(&cli.greeting), HistoryLimits::default());
    print_latest(&mut coordinator, cli.html);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        if stdout.write_all(PROMPT.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            break;
        }
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(error = %error, "failed to read stdin");
                break;
            }
        };

        // An empty line resends the text restored by the last rollback.
        if !line.trim().is_empty() || coordinator.error().is_none() {
            coordinator.set_input(line);
        }

        match coordinator.exchange(&transport).await {
            Ok(ExchangeOutcome::Committed { .. }) => print_latest(&mut coordinator, cli.html),
            Ok(ExchangeOutcome::RolledBack { kind, restored }) => {
                eprintln!("{ERROR_NOTICE} ({kind})");
                eprintln!("  {restored}");
            }
            Err(ExchangeRejection::Submit(SubmitRejection::Blank)) => {}
            Err(ExchangeRejection::Submit(SubmitRejection::TooLong(error))) => {
                eprintln!("[!] {}", error.client_message());
            }
            Err(rejection) => {
                tracing::warn!(?rejection, "exchange rejected");
            }
        }
    }

    Ok(())
}

fn print_latest(coordinator: &mut ExchangeCoordinator, html: bool) {
    coordinator.render_latest();
    let Some(entry) = coordinator.transcript().last() else {
        return;
    };
    match (&entry.markup, html) {
        (Some(markup), true) => println!("{markup}"),
        _ => println!("{}", entry.message.text),
    }
}
