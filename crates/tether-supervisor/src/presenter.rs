use std::io::Write;

use colored::Colorize;
use tether_types::PairingChallenge;

/// Shows pairing challenges to a human.
pub trait PairingPresenter: Send + Sync {
    fn present(&self, challenge: &PairingChallenge);

    /// Pairing succeeded and the connection is open.
    fn paired(&self) {}
}

/// Prints challenges to the terminal.
#[derive(Clone, Debug, Default)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    pub fn new() -> Self {
        Self
    }

    fn render(challenge: &PairingChallenge) -> String {
        match challenge {
            PairingChallenge::QrCode { payload } => format!(
                "{} Scan this pairing code with your phone:\n\n  {}\n",
                "▶".cyan().bold(),
                payload.bold()
            ),
            PairingChallenge::NumericCode { code } => format!(
                "{} Enter this code on your phone: {}\n",
                "▶".cyan().bold(),
                code.yellow().bold()
            ),
        }
    }
}

impl PairingPresenter for TerminalPresenter {
    fn present(&self, challenge: &PairingChallenge) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", Self::render(challenge));
        let _ = out.flush();
    }

    fn paired(&self) {
        println!("{} Paired; session is open.", "✓".green().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_challenge_kinds() {
        colored::control::set_override(false);
        let qr = TerminalPresenter::render(&PairingChallenge::QrCode {
            payload: "2@abc,def".into(),
        });
        assert!(qr.contains("2@abc,def"));
        let code = TerminalPresenter::render(&PairingChallenge::NumericCode {
            code: "ABCD-1234".into(),
        });
        assert!(code.contains("ABCD-1234"));
    }
}
