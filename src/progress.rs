use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

fn enabled() -> bool {
    if std::env::var_os("DBCLI_FORCE_PROGRESS").is_some() {
        return true;
    }
    if std::env::var_os("NO_PROGRESS").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICKS)
}

pub fn spinner(msg: &str) -> Option<ProgressBar> {
    if !enabled() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_style(style("{spinner:.cyan} {msg} [{elapsed}]"));
    pb.set_message(msg.to_string());
    Some(pb)
}

/// A bar whose length is usually learned later, from the first event.
pub fn bar(len: u64, msg: &str) -> Option<ProgressBar> {
    if !enabled() {
        return None;
    }
    let pb = ProgressBar::new(len);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_style(style("{spinner:.cyan} {wide_msg} {bar:30} {pos}/{len}"));
    pb.set_message(msg.to_string());
    Some(pb)
}
