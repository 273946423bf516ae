use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nest_assistant::insights::{CHECK_INTERVAL, FIRST_CHECK_DELAY};
use nest_assistant::knowledge::generate_knowledge_files;
use nest_assistant::{
    AppPaths, Assistant, ChatRequest, Config, PreferenceStore, ReplySource, SelectedModel,
    TicketId, Vendor,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "nestbot")]
#[command(version, about = "NestBot: AI assistant for your repair shop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        message: String,
        /// Model name from config.json, or a vendor (claude, openai, gemini)
        #[arg(short, long)]
        model: Option<String>,
        /// Leave the ticket list out of the prompt
        #[arg(long)]
        no_tickets: bool,
        /// Focus on one ticket, e.g. T-12345
        #[arg(short, long)]
        ticket: Option<String>,
    },
    /// Download all tickets from RepairDesk into the local cache
    Refresh {
        /// Bypass the in-memory response cache
        #[arg(short, long)]
        force: bool,
    },
    /// Add a note to a RepairDesk ticket
    Note {
        /// Ticket number, e.g. T-12345
        ticket: String,
        /// Note text
        text: String,
        /// 0 for an internal note, 1 for a diagnostic note
        #[arg(long = "type", default_value_t = 0)]
        note_type: i64,
        /// Flag the note
        #[arg(long)]
        flag: bool,
    },
    /// Regenerate the knowledge files from config.json
    Knowledge,
    /// Show or change the current user's assistant preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print the preferences as JSON
    Show,
    /// Set one preference, e.g. `personality technical`
    Set { key: String, value: String },
}

fn init_logging(paths: &AppPaths, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_file {
        // The terminal belongs to the TUI
        let log_path = paths.log_dir.join("nest.log");
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| anyhow!("Failed to open log file {:?}: {}", log_path, e))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(log_file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::discover()?;
    paths.ensure()?;
    init_logging(&paths, cli.command.is_none())?;

    let mut config = Config::load(&paths.config_file())?;
    config.apply_env_overrides();
    info!("Loaded config from {:?}", paths.config_file());

    match cli.command {
        None => run_tui(Assistant::new(config, paths)).await,
        Some(Commands::Ask { message, model, no_tickets, ticket }) => {
            ask(Assistant::new(config, paths), message, model, no_tickets, ticket).await
        }
        Some(Commands::Refresh { force }) => refresh(Assistant::new(config, paths), force).await,
        Some(Commands::Note { ticket, text, note_type, flag }) => {
            add_note(Assistant::new(config, paths), &ticket, &text, note_type, flag).await
        }
        Some(Commands::Knowledge) => {
            let path = generate_knowledge_files(&config, &paths.knowledge_dir)?;
            println!("Knowledge files written to {}", path.display());
            Ok(())
        }
        Some(Commands::Prefs { action }) => prefs(&config, &paths, action),
    }
}

async fn run_tui(assistant: Assistant) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(tui::TICK_RATE);
    let mut app = App::new(assistant);
    app.chat.start_insights(FIRST_CHECK_DELAY, CHECK_INTERVAL);

    let result: Result<()> = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            tokio::select! {
                event = events.next() => match event {
                    Some(event) => handler::handle_event(&mut app, event),
                    None => break,
                },
                applied = app.chat.next_event() => {
                    if applied {
                        // Pick up anything else that finished meanwhile
                        app.poll_replies();
                        app.scroll_chat_to_bottom();
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    tui::restore()?;
    result
}

fn resolve_model(config: &Config, name: &str) -> Result<SelectedModel> {
    if let Some(model) = config.find_model(name) {
        return Ok(model.clone());
    }
    let vendor = Vendor::from_str(name)
        .ok_or_else(|| anyhow!("Unknown model or vendor: {}", name))?;
    Ok(SelectedModel {
        name: vendor.display_name().to_string(),
        api: vendor.as_str().to_string(),
        model: config.model_for(vendor),
    })
}

async fn ask(
    assistant: Assistant,
    message: String,
    model: Option<String>,
    no_tickets: bool,
    ticket: Option<String>,
) -> Result<()> {
    let selected_model = match model {
        Some(name) => Some(resolve_model(assistant.config(), &name)?),
        None => assistant.config().model_choices().into_iter().next(),
    };
    let specific_ticket = ticket.as_deref().map(TicketId::parse).transpose()?;

    let request = ChatRequest {
        selected_model,
        ticket_access: !no_tickets,
        specific_ticket,
        ..ChatRequest::new(&message)
    };

    let reply = assistant.get_ai_response(request).await;
    match reply.source {
        ReplySource::Vendor(vendor) => info!("Reply from {}", vendor),
        ReplySource::Fallback => info!("No AI vendor configured, used a canned reply"),
        ReplySource::Error => info!("Vendor call failed"),
    }
    println!("{}", reply.text);
    Ok(())
}

async fn refresh(assistant: Assistant, force: bool) -> Result<()> {
    let client = assistant.repairdesk()?;
    let summary = client.refresh_ticket_cache(assistant.tickets(), force).await?;
    println!(
        "Cached {} tickets ({} detail files written, {} skipped)",
        summary.tickets, summary.details_written, summary.details_skipped
    );
    Ok(())
}

async fn add_note(
    assistant: Assistant,
    ticket: &str,
    text: &str,
    note_type: i64,
    flag: bool,
) -> Result<()> {
    let id = TicketId::parse(ticket)?;
    let api_id = assistant.api_id_for(&id);
    assistant
        .repairdesk()?
        .add_note(&api_id, text, note_type, flag)
        .await?;
    println!("Note added to ticket {}", id);
    Ok(())
}

fn prefs(config: &Config, paths: &AppPaths, action: Option<PrefsAction>) -> Result<()> {
    let store = PreferenceStore::new(paths.prefs_dir.clone());
    let user_id = config
        .current_user
        .as_ref()
        .map(|u| u.id.clone())
        .unwrap_or_default();
    let mut preferences = store.load_user_preferences(&user_id)?;

    match action.unwrap_or(PrefsAction::Show) {
        PrefsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&preferences)?);
        }
        PrefsAction::Set { key, value } => {
            match key.as_str() {
                "personality" => preferences.personality = value,
                "detail_level" => preferences.detail_level = value,
                "language_style" => preferences.language_style = value,
                "preferred_model" => preferences.preferred_model = Some(value),
                "proactive_insights" => preferences.proactive_insights = value.parse()?,
                "urgent_tickets" => {
                    preferences.notification_preferences.urgent_tickets = value.parse()?
                }
                "deadlines" => preferences.notification_preferences.deadlines = value.parse()?,
                "customer_responses" => {
                    preferences.notification_preferences.customer_responses = value.parse()?
                }
                "team_updates" => {
                    preferences.notification_preferences.team_updates = value.parse()?
                }
                "favorite_topics" => {
                    preferences.favorite_topics = value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                }
                other => return Err(anyhow!("Unknown preference: {}", other)),
            }
            store.save_user_preferences(&user_id, &preferences)?;
            println!("Saved {}", key);
        }
    }
    Ok(())
}
