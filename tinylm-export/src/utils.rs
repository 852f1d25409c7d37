use std::{
    io::{self, Write},
    sync::atomic::{AtomicUsize, Ordering},
};

const BAR_WIDTH: usize = 30;
const LABEL_WIDTH: usize = 36;

/// Single-line progress bar for layer export.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: usize,
    last_displayed: AtomicUsize,
    label: String,
}

impl ProgressTracker {
    pub fn new(total: usize, label: &str) -> Self {
        Self { total: total.max(1), last_displayed: AtomicUsize::new(0), label: label.to_string() }
    }

    pub fn set_current(&self, current: usize, description: Option<&str>) {
        let current = current.min(self.total);
        let last_displayed = self.last_displayed.swap(current, Ordering::Relaxed);

        if current != last_displayed || current == self.total {
            print!("\r{}", self.render(current, description.unwrap_or_default()));
            io::stdout().flush().unwrap_or(());

            if current == self.total {
                println!();
            }
        }
    }

    fn render(&self, current: usize, description: &str) -> String {
        let percent = (current * 100) / self.total;
        let filled = (current * BAR_WIDTH) / self.total;
        let bar = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);

        format!("{}: [{bar}] {current}/{} ({percent}%): {}", self.label, self.total, fit_label(description))
    }
}

fn fit_label(description: &str) -> String {
    if description.chars().count() > LABEL_WIDTH {
        let mut cut = description.chars().take(LABEL_WIDTH - 2).collect::<String>();
        cut.push_str("..");
        cut
    } else {
        format!("{description:width$}", width = LABEL_WIDTH)
    }
}
