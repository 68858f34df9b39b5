//! Console presentation loop: drains the executor's status queue and answers
//! its questions from stdin.

use anyhow::{Context, Result};
use colored::*;
use deskpilot::{ItemStatus, Resolution, UiEvent};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tracing::debug;

/// Read one trimmed line from stdin after printing `question`
pub fn prompt_line(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        anyhow::bail!("stdin closed");
    }
    Ok(line.trim().to_string())
}

/// Interpret a yes/no answer; anything unrecognised yields `default`
pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

fn parse_resolution(answer: &str) -> Resolution {
    match answer.trim().to_lowercase().as_str() {
        "r" | "retry" => Resolution::Retry,
        _ => Resolution::Cancel,
    }
}

async fn ask<T: Send + 'static>(
    question: String,
    interpret: impl FnOnce(&str) -> T + Send + 'static,
    fallback: T,
) -> T {
    let answer = tokio::task::spawn_blocking(move || prompt_line(&question)).await;
    match answer {
        Ok(Ok(line)) => interpret(&line),
        Ok(Err(e)) => {
            debug!("Prompt failed: {}", e);
            fallback
        }
        Err(e) => {
            debug!("Prompt task failed: {}", e);
            fallback
        }
    }
}

fn status_label(status: ItemStatus) -> ColoredString {
    match status {
        ItemStatus::Pending => "pending".dimmed(),
        ItemStatus::Processing => "processing".yellow().bold(),
        ItemStatus::Done => "done".green().bold(),
        ItemStatus::Failed => "failed".red().bold(),
    }
}

/// Runs until every sender is dropped, i.e. until the executor has finished
pub async fn present(mut rx: mpsc::Receiver<UiEvent>, items: Vec<String>) {
    let name = |index: usize| items.get(index).map(String::as_str).unwrap_or("?");

    while let Some(event) = rx.recv().await {
        match event {
            UiEvent::Status(text) => println!("{} {}", "»".cyan(), text),
            UiEvent::Progress { current, total } => {
                let percent = if total == 0 { 100 } else { current * 100 / total };
                println!("📊 {current}/{total} ({percent}%)");
            }
            UiEvent::ItemStatus { index, status } => {
                // The initial all-pending sweep would just repeat the file list
                if status != ItemStatus::Pending {
                    println!("   {:>3}. {:<40} {}", index + 1, name(index), status_label(status));
                }
            }
            UiEvent::ConfirmResume {
                cursor,
                total,
                reply,
            } => {
                let question = format!(
                    "{} Previous run stopped after {cursor} of {total} files. Resume from file {}? [Y/n] ",
                    "⏯".yellow(),
                    cursor + 1
                );
                let resume = ask(question, |a| parse_yes_no(a, true), true).await;
                let _ = reply.send(resume);
            }
            UiEvent::TargetNotFound {
                label,
                failure,
                reply,
            } => {
                let question = format!(
                    "{} '{label}' {failure}. Click it manually, then [r]etry, or [c]ancel: ",
                    "⚠️".yellow().bold()
                );
                let resolution = ask(question, parse_resolution, Resolution::Cancel).await;
                let _ = reply.send(resolution);
            }
            UiEvent::ConfirmStep { item, step, reply } => {
                let question = format!("{} {item}: run '{step}'? [Y/n] ", "?".cyan().bold());
                let proceed = ask(question, |a| parse_yes_no(a, true), false).await;
                let _ = reply.send(proceed);
            }
        }
    }
}
