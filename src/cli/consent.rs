//! Asking the user before installing anything.

use std::io::{BufRead, IsTerminal, Write};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::ConsentProvider;

/// Asks a yes/no question on the terminal
///
/// Declines without asking when stdin is not a terminal, so scripted runs
/// never block on a prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsent;

#[async_trait]
impl ConsentProvider for TerminalConsent {
    async fn request_install_consent(&self, package: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            info!(package, "Not a terminal; skipping install prompt");
            return false;
        }

        let prompt = format!(
            "RenzMC package ({}) is not installed. Do you want to install it now? [y/N] ",
            package
        );
        match tokio::task::spawn_blocking(move || ask(&prompt)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Consent prompt failed");
                false
            }
        }
    }
}

fn ask(prompt: &str) -> bool {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{}", prompt);
    let _ = stderr.flush();

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

/// `y` or `yes`, any case; everything else (including empty) is no
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
