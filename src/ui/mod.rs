//! Terminal front-end: a landing page and a chat page, routed on whether a
//! guest session exists. Each user action runs one top-to-bottom pass through
//! the engine; the only long-lived operation is the completion stream,
//! printed incrementally as deltas arrive.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::io::Write;
use tracing::warn;

use crate::chat::{ChatEngine, MAX_INPUT_CHARS, TurnReport};
use crate::config::AppConfig;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Landing,
    Chat,
}

/// Router: guests without a session identifier land on the landing page.
#[inline]
pub fn route(ctx: &SessionContext) -> Page {
    if ctx.is_active() {
        Page::Chat
    } else {
        Page::Landing
    }
}

/// Drive one guest session from landing to chat until the guest leaves.
pub async fn run(app: &AppConfig, engine: &ChatEngine, ctx: &mut SessionContext) -> Result<()> {
    loop {
        match route(ctx) {
            Page::Landing => {
                if !show_landing_page(app)? {
                    return Ok(());
                }
                let guest_id = ctx.start_session();
                eprintln!("{}", style(format!("Session started: {guest_id}")).dim());
            }
            Page::Chat => {
                show_chat_page(app, engine, ctx).await?;
                return Ok(());
            }
        }
    }
}

/// Render the landing page and wait for the start action. Returns false when
/// the guest declines to start a session.
fn show_landing_page(app: &AppConfig) -> Result<bool> {
    eprintln!();
    eprintln!(
        "{} {}",
        style(&app.icon).bold(),
        style(&app.name).bold().yellow()
    );
    eprintln!("{}", style(&app.description).italic());

    // A missing logo degrades that element only
    if let Some(logo_path) = &app.logo_path {
        match std::fs::metadata(logo_path) {
            Ok(_) => eprintln!("{}", style(format!("[logo: {}]", logo_path.display())).dim()),
            Err(e) => warn!("Image not found: {} ({e})", logo_path.display()),
        }
    }

    eprintln!();
    Confirm::new()
        .with_prompt(&app.start_button_text)
        .default(true)
        .interact()
        .context("Failed to read start action")
}

async fn show_chat_page(
    app: &AppConfig,
    engine: &ChatEngine,
    ctx: &mut SessionContext,
) -> Result<()> {
    eprintln!();
    eprintln!("{}", style(&app.name).bold().yellow());
    eprintln!();

    // Lazily-sent welcome turn, streamed live
    if !ctx.welcome_sent() {
        print_assistant_prefix(app);
        let report = engine.welcome(ctx, &mut print_delta).await;
        finish_assistant_line(&report);
    }

    loop {
        let input: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .validate_with(|line: &String| {
                if line.chars().count() <= MAX_INPUT_CHARS {
                    Ok(())
                } else {
                    Err(format!(
                        "Message too long (max {MAX_INPUT_CHARS} characters)"
                    ))
                }
            })
            .interact_text()
            .context("Failed to read chat input")?;

        let prompt = input.trim();
        if prompt.is_empty() {
            // The terminal analog of ending the browser session
            eprintln!("{}", style("Session ended.").dim());
            return Ok(());
        }

        print_assistant_prefix(app);
        let report = engine.submit(ctx, prompt, &mut print_delta).await;
        finish_assistant_line(&report);
    }
}

fn print_assistant_prefix(app: &AppConfig) {
    eprint!("{} ", style(format!("{}:", app.name)).bold().green());
}

fn print_delta(delta: &str) {
    print!("{delta}");
    let _ = std::io::stdout().flush();
}

fn finish_assistant_line(report: &TurnReport) {
    println!();
    for notice in &report.notices {
        eprintln!("{}", style(notice).red());
    }
}
