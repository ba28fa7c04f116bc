//! Event output and the live receive spinner.

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use volley_core::{SessionEvent, TransferResult};

/// Spinner showing live receive counts.
pub struct ReceiveProgress {
    bar: ProgressBar,
}

impl ReceiveProgress {
    /// Start a spinner labelled with the listening endpoint.
    #[must_use]
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let template = "{spinner:.green} [{elapsed_precise}] {prefix} {msg}";
        if let Ok(style) = ProgressStyle::default_spinner().template(template) {
            bar.set_style(style);
        }
        bar.set_prefix(label.to_string());
        bar.set_message("waiting for data");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Show the latest statistics.
    pub fn update(&self, result: &TransferResult) {
        self.bar.set_message(format!(
            "{} packet(s), {} in {} ms",
            result.packet_count,
            format_bytes(received_bytes(result)),
            result.elapsed_millis
        ));
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    /// Remove the spinner.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Drains session events to the terminal.
pub struct EventPrinter {
    json: bool,
    label: String,
    spinner: Option<ReceiveProgress>,
    last: Option<TransferResult>,
    alerts: usize,
}

/// What the printer saw by the time the stream closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintSummary {
    /// Final statistics, if any were reported
    pub last: Option<TransferResult>,
    /// Alerts printed
    pub alerts: usize,
}

impl EventPrinter {
    /// Printer for one command. `label` names the endpoint on the spinner.
    #[must_use]
    pub fn new(json: bool, label: impl Into<String>) -> Self {
        Self {
            json,
            label: label.into(),
            spinner: None,
            last: None,
            alerts: 0,
        }
    }

    /// Print events until every sender is gone.
    pub fn run(mut self, events: Receiver<SessionEvent>) -> PrintSummary {
        for event in events {
            self.handle(event);
        }
        if let Some(spinner) = self.spinner.take() {
            spinner.finish();
        }
        PrintSummary {
            last: self.last,
            alerts: self.alerts,
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status(text) => self.status(&text),
            SessionEvent::Alert(text) => {
                self.alerts += 1;
                match &self.spinner {
                    Some(spinner) => spinner.bar.suspend(|| eprintln!("error: {text}")),
                    None => eprintln!("error: {text}"),
                }
            }
            SessionEvent::Result(result) => {
                if let Some(spinner) = &self.spinner {
                    spinner.update(&result);
                }
                self.last = Some(result);
            }
            SessionEvent::ConnectionReady(true) => {
                if !self.json {
                    self.spinner = Some(ReceiveProgress::new(&self.label));
                }
            }
            SessionEvent::ConnectionReady(false) => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish();
                }
                if let Some(result) = self.last {
                    self.print_result(&result);
                }
            }
        }
    }

    fn status(&self, text: &str) {
        if self.json {
            eprintln!("{text}");
            return;
        }
        match &self.spinner {
            // Per-unit notices would scroll the spinner away.
            Some(_) if text == "-received packet(s)" => {}
            Some(spinner) => spinner.println(text),
            None => println!("{text}"),
        }
    }

    fn print_result(&self, result: &TransferResult) {
        if self.json {
            match serde_json::to_string(result) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("error: can't encode result: {e}"),
            }
        } else {
            println!("{result}");
        }
    }
}

fn received_bytes(result: &TransferResult) -> u64 {
    result.packet_count.saturating_mul(result.packet_size as u64)
}

/// Format bytes in human-readable format
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}
