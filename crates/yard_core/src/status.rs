//! Text shown on the yard's menu display.

use std::fmt::Write as _;

use crate::yard::Yard;
use crate::YardState;

/// Status page: state, missing components while welding, and progress.
pub fn format_status(yard: &Yard) -> String {
    let mut out = String::from("Yard Status:\n");
    let welding = match yard.state() {
        YardState::Disabled => {
            out.push_str("IDLE");
            false
        }
        YardState::Grind => {
            out.push_str("GRINDING");
            false
        }
        YardState::Weld => {
            out.push_str("WELDING");
            true
        }
        YardState::Invalid | YardState::Scanning => {
            out.push_str("ERROR");
            return out;
        }
    };
    out.push_str("\n\n");

    if welding && !yard.missing_components().is_empty() {
        out.push_str("Missing Components:\n");
        for (name, count) in yard.missing_components() {
            let _ = writeln!(out, "{name}: {count}");
        }
        out.push('\n');
    }

    let settings = yard.settings();
    let multiplier = if welding {
        settings.weld_multiplier
    } else {
        settings.grind_multiplier
    };
    let beam_budget = settings.beams() * yard.tools().len();
    let work: f32 = yard
        .catalog()
        .iter()
        .filter(|t| welding || !t.is_virtual())
        .map(|t| t.remaining_time)
        .sum();
    let seconds = if beam_budget == 0 {
        0.0
    } else {
        work / multiplier / beam_budget as f32
    };

    let _ = writeln!(out, "Targets: {}", yard.working().len());
    let _ = writeln!(
        out,
        "Active beams: {}/{}",
        yard.assignments().active_count(),
        beam_budget
    );
    let _ = writeln!(out, "Blocks remaining: {}", yard.catalog().len());
    let _ = writeln!(out, "Estimated time remaining: {}", format_hms(seconds));
    out.push('\n');
    out
}

pub fn format_main_menu(yard: &Yard) -> String {
    let mut out = String::from("Automated Yard Main Menu\n\n");
    let _ = writeln!(out, "Current targets: {}", yard.contained().len());
    out.push('\n');
    out.push_str(". Exit : Up :. Down :: Select\n\n");
    out
}

/// Whole seconds as `h:mm:ss`, with a leading day count past 24 hours.
pub fn format_hms(seconds: f32) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let days = total / 86_400;
    let hours = total % 86_400 / 3600;
    let minutes = total % 3600 / 60;
    let secs = total % 60;
    if days > 0 {
        format!("{days}:{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{hours}:{minutes:02}:{secs:02}")
    }
}

/// Scan time estimate: seconds under two minutes, minutes under two hours,
/// hours beyond.
pub fn format_estimate(seconds: f32) -> String {
    if seconds >= 7200.0 {
        format!("{:.2} hours", seconds / 3600.0)
    } else if seconds >= 120.0 {
        format!("{:.2} min", seconds / 60.0)
    } else {
        format!("{seconds:.2}s")
    }
}
