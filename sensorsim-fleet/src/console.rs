//! Console interactive : menu numérique lu ligne par ligne sur stdin.
//!
//! La console ne touche jamais directement aux capteurs. Chaque saisie acceptée
//! devient une [`ControlCommand`], le même type que produit le topic de contrôle.

use anyhow::{Context, Result};
use sensorsim_core::{ControlCommand, Fleet};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

pub const MENU: &[&str] = &[
    "Press 1 to start sensors",
    "Press 2 to stop sensors",
    "Press 3 to end program",
    "Press 4 to produce specified data by specified sensor",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    /// Exécute la commande, puis affiche la confirmation s'il y en a une.
    Dispatch(ControlCommand, Option<&'static str>),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Menu,
    Pick,
    Value(usize),
}

pub struct Console {
    mode: Mode,
    /// (id capteur, nom affiché), dans l'ordre de la flotte
    listing: Vec<(u32, String)>,
}

impl Console {
    pub fn new(listing: Vec<(u32, String)>) -> Self {
        Self { mode: Mode::Menu, listing }
    }

    pub fn for_fleet(fleet: &Fleet) -> Self {
        Self::new(fleet.sensors().map(|s| (s.id(), s.name())).collect())
    }

    /// Traite une ligne saisie et écrit les réponses de la console dans `out`.
    pub fn feed<W: Write>(&mut self, line: &str, out: &mut W) -> std::io::Result<Step> {
        let input = line.trim();
        match self.mode {
            Mode::Menu => {
                let Ok(key) = input.parse::<i64>() else {
                    writeln!(out, "Please enter a valid number.")?;
                    return Ok(Step::Continue);
                };
                match key {
                    1 => Ok(Step::Dispatch(ControlCommand::StartAll, Some("Sensors started"))),
                    2 => Ok(Step::Dispatch(ControlCommand::StopAll, Some("Sensors stopped"))),
                    3 => {
                        writeln!(out, "Exiting program...")?;
                        Ok(Step::Quit)
                    }
                    4 => {
                        writeln!(out, "Select a sensor (-1 to cancel):")?;
                        for (ordinal, (_, name)) in self.listing.iter().enumerate() {
                            writeln!(out, "{ordinal}: {name}")?;
                        }
                        self.mode = Mode::Pick;
                        Ok(Step::Continue)
                    }
                    _ => Ok(Step::Continue),
                }
            }
            Mode::Pick => {
                self.mode = Mode::Menu;
                match input.parse::<i64>() {
                    Err(_) => writeln!(out, "Please enter a valid number.")?,
                    Ok(-1) => writeln!(out, "Cancelled")?,
                    Ok(choice) => match usize::try_from(choice).ok().filter(|c| *c < self.listing.len()) {
                        Some(ordinal) => {
                            write!(out, "Enter value to generate for {}: ", self.listing[ordinal].1)?;
                            out.flush()?;
                            self.mode = Mode::Value(ordinal);
                        }
                        None => writeln!(out, "Invalid number")?,
                    },
                }
                Ok(Step::Continue)
            }
            Mode::Value(ordinal) => {
                self.mode = Mode::Menu;
                match input.parse::<f64>() {
                    Ok(value) if value.is_finite() => {
                        let id = self.listing[ordinal].0;
                        Ok(Step::Dispatch(ControlCommand::SetValue(id, value), None))
                    }
                    _ => {
                        writeln!(out, "Please enter a valid number.")?;
                        Ok(Step::Continue)
                    }
                }
            }
        }
    }
}

pub fn print_menu<W: Write>(out: &mut W) -> std::io::Result<()> {
    for line in MENU {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Reads stdin until the operator quits. On EOF the process keeps running
/// headless and this future never resolves.
pub async fn run(fleet: &Fleet) -> Result<()> {
    let mut console = Console::for_fleet(fleet);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_menu(&mut std::io::stdout()).context("cannot write to stdout")?;

    while let Some(line) = lines.next_line().await.context("cannot read stdin")? {
        let step = console
            .feed(&line, &mut std::io::stdout())
            .context("cannot write to stdout")?;
        match step {
            Step::Continue => {}
            Step::Dispatch(cmd, confirmation) => {
                debug!("console -> {cmd:?}");
                fleet.dispatch(cmd).await;
                if let Some(text) = confirmation {
                    println!("{text}");
                }
            }
            Step::Quit => return Ok(()),
        }
    }

    info!("stdin closed, running headless until Ctrl-C");
    std::future::pending::<()>().await;
    Ok(())
}
