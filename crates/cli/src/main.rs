use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;
use vista_bot::IntakeBot;
use vista_core::{
    calculate_quote, classify_service, render_summary, BusinessInfo, EditLevel, InboundMessage,
    InboundPayload, QuoteRequest, ServiceKind,
};
use vista_export::{LeadSink, RecordingSink};
use vista_observability::{init_tracing, BotMetrics};
use vista_storage::MemoryStore;
use vista_wa::ConsoleChannel;

#[derive(Debug, Parser)]
#[command(name = "vista")]
#[command(about = "Vista360 intake bot CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat {
        #[arg(long, default_value = "+56900000000")]
        phone: String,
    },
    Quote {
        #[arg(long, default_value = "restaurante")]
        service: String,
        #[arg(long, default_value_t = 3)]
        spaces: u32,
        #[arg(long, default_value = "básica")]
        edition: String,
        #[arg(long, default_value_t = false)]
        embed: bool,
        #[arg(long, default_value_t = false)]
        urgent: bool,
        #[arg(long, default_value = "Santiago Centro")]
        comuna: String,
    },
    Classify {
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("vista_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Chat { phone } => run_chat(phone).await?,
        Command::Quote {
            service,
            spaces,
            edition,
            embed,
            urgent,
            comuna,
        } => {
            let kind = ServiceKind::parse_id(&service).with_context(|| {
                format!(
                    "unknown service '{service}', expected restaurante, venue_eventos, \
                     airbnb_arriendo, hotel or otro"
                )
            })?;
            let edition = EditLevel::parse(&edition)
                .context("invalid --edition, expected 'básica' or 'avanzada'")?;

            let quote = calculate_quote(&QuoteRequest {
                spaces,
                edition,
                embed,
                urgent,
                comuna,
            });

            println!("Cotización {}\n", kind.label());
            println!("{}", render_summary(&quote));
        }
        Command::Classify { text } => {
            let result = classify_service(&text);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "kind": result.kind.as_id(),
                    "label": result.kind.label(),
                    "confidence": result.confidence,
                    "matched": result.matched,
                }))?
            );
        }
    }

    Ok(())
}

async fn run_chat(phone: String) -> Result<()> {
    let sink = RecordingSink::new();
    let bot = IntakeBot::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ConsoleChannel),
        LeadSink::Recording(sink.clone()),
        BusinessInfo::default(),
        BotMetrics::shared(),
    );

    println!("Vista360 intake chat. Escribe como el cliente.");
    println!("'/id' simula tocar un botón u opción de lista, 'exit' termina.\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let payload = match message.strip_prefix('/') {
            Some(id) => {
                let id = id.trim().to_string();
                // Count selections only arrive as list replies on the real channel.
                if id.starts_with("espacios_") {
                    InboundPayload::ListReply {
                        id: id.clone(),
                        title: id,
                    }
                } else {
                    InboundPayload::Button {
                        id: id.clone(),
                        title: id,
                    }
                }
            }
            None => InboundPayload::Text {
                body: message.to_string(),
            },
        };

        bot.handle_message(InboundMessage {
            from: phone.clone(),
            id: format!("cli-{}", Uuid::new_v4()),
            payload,
        })
        .await?;

        for exported in sink.drain() {
            println!("-- lead exportado --");
            println!("{}", serde_json::to_string_pretty(&exported)?);
        }
    }

    Ok(())
}
