mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AppointmentField, BookingController, ChainField, FieldPhase, FormEvent, FormRenderer,
    HttpTransport, NavigationIntent, PageContext, RefreshHandle, RefreshOutcome,
    SelectionError, TextFormRenderer,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, normalize_server_url, Settings};

type Controller = Arc<BookingController<HttpTransport>>;

#[derive(Parser, Debug)]
#[command(name = "front-desk", about = "Book clinic appointments")]
struct Args {
    /// Config file; defaults to ./front_desk.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Book in one go from flags.
    Book {
        #[arg(long)]
        date: String,
        #[arg(long)]
        doctor_id: String,
        #[arg(long)]
        schedule_id: String,
        #[arg(long)]
        chief_complaint: String,
        /// Only print the outcome, not the form after every change.
        #[arg(long)]
        quiet: bool,
    },
    /// Walk through the form step by step.
    Wizard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = &args.server_url {
        settings.server_url = normalize_server_url(url);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let transport = match settings.request_timeout() {
        Some(timeout) => HttpTransport::with_timeout(&settings.server_url, timeout)?,
        None => HttpTransport::new(&settings.server_url)?,
    };
    info!(server_url = %transport.base_url(), "front desk started");
    let controller = BookingController::new(transport);

    let intent = match args.command {
        Command::Book {
            date,
            doctor_id,
            schedule_id,
            chief_complaint,
            quiet,
        } => {
            if !quiet {
                spawn_printer(&controller, &settings);
            }
            let result = book(&controller, date, doctor_id, schedule_id, chief_complaint).await;
            if result.is_err() && quiet {
                print!("{}", renderer(&settings).render(&controller.snapshot().await));
            }
            result?
        }
        Command::Wizard => match wizard(&controller, &settings).await? {
            Some(intent) => intent,
            None => return Ok(()),
        },
    };

    println!("Appointment booked; continue at {}", intent.path);
    if let Some(flash) = &intent.flash {
        println!("{flash}");
    }
    Ok(())
}

fn renderer(settings: &Settings) -> TextFormRenderer {
    TextFormRenderer::new(PageContext::new(settings.page_title.clone()))
}

fn spawn_printer(controller: &Controller, settings: &Settings) {
    let mut events = controller.subscribe();
    let renderer = renderer(settings);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(FormEvent::StateChanged(snapshot)) => {
                    println!("{}", renderer.render(&snapshot));
                }
                Ok(FormEvent::Submitted(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "form printer fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn book(
    controller: &Controller,
    date: String,
    doctor_id: String,
    schedule_id: String,
    chief_complaint: String,
) -> Result<NavigationIntent> {
    await_options(controller.set_field(AppointmentField::Date, date).await?).await?;
    await_options(controller.set_field(AppointmentField::Doctor, doctor_id).await?).await?;
    controller
        .set_field(AppointmentField::Schedule, schedule_id)
        .await?;
    controller
        .set_field(AppointmentField::ChiefComplaint, chief_complaint)
        .await?;
    Ok(controller.submit().await?)
}

async fn await_options(handle: Option<RefreshHandle>) -> Result<()> {
    let Some(handle) = handle else {
        return Ok(());
    };
    let field = handle.field();
    match handle.wait().await {
        RefreshOutcome::Failed { reason } => {
            bail!("could not load {} options: {reason}", field.label())
        }
        RefreshOutcome::Applied { .. } | RefreshOutcome::Stale => Ok(()),
    }
}

/// Returns `None` when the user quits or input ends.
async fn wizard(controller: &Controller, settings: &Settings) -> Result<Option<NavigationIntent>> {
    let renderer = renderer(settings);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let snapshot = controller.snapshot().await;
        let mut prompt = renderer.render(&snapshot);

        let step = AppointmentField::ORDER.get(snapshot.current_step).copied();
        match step {
            None => prompt.push_str("[s]ubmit, [b]ack or [q]uit > "),
            Some(field) => {
                let current = snapshot.field(field);
                if field.has_options() && current.phase == FieldPhase::Empty {
                    prompt.push_str(&format!(
                        "{} options are unavailable. [r]etry, [b]ack or [q]uit > ",
                        field.label()
                    ));
                } else if field.has_options() {
                    prompt.push_str(&format!("{} (number) > ", field.label()));
                } else {
                    prompt.push_str(&format!("{} > ", field.label()));
                }
            }
        }
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let input = line.trim();

        match (input, step) {
            ("q", _) => return Ok(None),
            ("b", _) => {
                if let Err(err) = go_back(controller, snapshot.current_step).await {
                    warn!(%err, "cannot go back");
                }
            }
            ("s", None) => match controller.submit().await {
                Ok(intent) => return Ok(Some(intent)),
                Err(err) if err.is_local() => info!(%err, "appointment not sent"),
                Err(err) => warn!(%err, "submission failed"),
            },
            (_, None) => {}
            ("r", Some(field)) if field.has_options() => {
                if let Err(err) = controller.refresh_options(field).await {
                    warn!(%err, "cannot reload options");
                }
            }
            (_, Some(field)) => {
                let value = if field.has_options() {
                    choose(snapshot.field(field).options.as_slice(), input)
                } else {
                    input.to_string()
                };
                if let Ok(handle) = controller.set_field(field, value).await {
                    if let Err(err) = await_options(handle).await {
                        warn!(%err, "option refresh failed");
                    }
                }
            }
        }
    }
}

/// Clears the field before `current_step`, and everything after it.
async fn go_back(controller: &Controller, current_step: usize) -> Result<(), SelectionError> {
    let previous = current_step
        .checked_sub(1)
        .and_then(|i| AppointmentField::ORDER.get(i));
    match previous {
        Some(previous) => controller.set_field(*previous, "").await.map(|_| ()),
        None => Ok(()),
    }
}

fn choose(options: &[client_core::OptionItem], input: &str) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .map_or_else(|| input.to_string(), |option| option.value.clone())
}
