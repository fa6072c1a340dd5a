use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::session::{ProgressSink, ProgressUpdate};
use crate::ui::icons::{BLOCKER, CHECK, CROSS, LINK, STOP};

/// Spinner for a foreground poll loop.
///
/// Doubles as the loop's [`ProgressSink`]: every fetch refreshes the message
/// with the latest status, attempt number and elapsed time. Draws to stderr
/// and hides itself when stderr is not a terminal.
pub struct PollSpinner {
    bar: ProgressBar,
    max_attempts: u32,
}

impl PollSpinner {
    pub fn new(prefix: &str, max_attempts: u32) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner_style) =
            ProgressStyle::default_spinner().template("{prefix:.bold.dim} {spinner} {msg}")
        {
            bar.set_style(spinner_style);
        }
        bar.set_prefix(prefix.to_string());
        bar.set_message(style("(starting...)").dim().to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, max_attempts }
    }

    /// Print a line above the spinner.
    fn println(&self, msg: impl AsRef<str>) {
        self.bar.println(msg.as_ref());
    }

    pub fn show_session_url(&self, url: &str) {
        self.println(format!("  {} {}", LINK, style(url).underlined()));
    }

    pub fn finish_complete(&self, msg: &str) {
        self.bar
            .finish_with_message(format!("{} {}", CHECK, style(msg).green()));
    }

    pub fn finish_failed(&self, msg: &str) {
        self.bar
            .finish_with_message(format!("{} {}", CROSS, style(msg).red().bold()));
    }

    pub fn finish_blocked(&self, msg: &str) {
        self.bar
            .finish_with_message(format!("{} {}", BLOCKER, style(msg).yellow().bold()));
    }

    pub fn finish_cancelled(&self) {
        self.bar
            .finish_with_message(format!("{} {}", STOP, style("Cancelled").dim()));
    }
}

impl ProgressSink for PollSpinner {
    fn report(&self, update: &ProgressUpdate<'_>) -> anyhow::Result<()> {
        self.bar.set_message(format!(
            "Devin is {} {}",
            style(update.status).cyan(),
            style(format!(
                "(attempt {}/{}, {})",
                update.attempt,
                self.max_attempts,
                format_elapsed(update.elapsed)
            ))
            .dim()
        ));
        Ok(())
    }
}

/// `Xs`, or `Xm Ys` from a minute up.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
