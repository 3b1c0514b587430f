use indicatif::{ProgressBar as IndicatifProgressBar, ProgressStyle};

/// Progress bar wrapper around indicatif, hidden in quiet mode
pub struct ProgressBar {
    pb: IndicatifProgressBar,
}

impl ProgressBar {
    /// Bar with a known number of steps
    pub fn new(total: usize, quiet: bool) -> Self {
        let pb = if quiet {
            IndicatifProgressBar::hidden()
        } else {
            IndicatifProgressBar::new(total as u64)
        };
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:.cyan}/{len:.cyan} | ETA: {eta}",
        ) {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        Self { pb }
    }

    /// Spinner for runs whose length is unknown up front
    pub fn spinner(quiet: bool) -> Self {
        let pb = if quiet {
            IndicatifProgressBar::hidden()
        } else {
            IndicatifProgressBar::new_spinner()
        };
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { pb }
    }

    pub fn set(&self, current: usize) {
        self.pb.set_position(current as u64);
    }

    pub fn set_message<S: Into<String>>(&self, msg: S) {
        self.pb.set_message(msg.into());
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
