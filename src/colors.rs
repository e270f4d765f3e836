//! Terminal colors and status markers.
//!
//! Colors follow NO_COLOR (https://no-color.org/) and the CLICOLOR
//! conventions: `NO_COLOR` wins over everything, `CLICOLOR_FORCE` (non-zero)
//! forces colors even when piped, `CLICOLOR=0` disables them, and otherwise
//! colors are used only when stdout is a terminal.

use colored::{ColoredString, Colorize, control};
use winsetup::InstallAttemptResult;
use winsetup::system::{ActionOutcome, ActionReport};

/// Decide whether to color output from the relevant environment values.
fn colors_enabled(
    no_color: bool,
    clicolor_force: Option<&str>,
    clicolor: Option<&str>,
    is_tty: bool,
) -> bool {
    if no_color {
        return false;
    }
    if clicolor_force.is_some_and(|v| v != "0") {
        return true;
    }
    if clicolor == Some("0") {
        return false;
    }
    is_tty
}

/// Configure `colored` for the whole process. Call early in main().
pub fn init_colors() {
    let force = std::env::var("CLICOLOR_FORCE").ok();
    let clicolor = std::env::var("CLICOLOR").ok();
    let enabled = colors_enabled(
        std::env::var_os("NO_COLOR").is_some(),
        force.as_deref(),
        clicolor.as_deref(),
        std::io::IsTerminal::is_terminal(&std::io::stdout()),
    );
    control::set_override(enabled);
}

/// `✓` for a verified or already-present install, `!` for an unverified
/// one, `✗` for a failure
pub fn result_mark(result: &InstallAttemptResult) -> ColoredString {
    if !result.succeeded() {
        "✗".red()
    } else if result.is_soft_success() {
        "!".yellow()
    } else {
        "✓".green()
    }
}

pub fn report_mark(report: &ActionReport) -> ColoredString {
    match report.outcome {
        ActionOutcome::Applied => "✓".green(),
        ActionOutcome::DryRun => "~".cyan(),
        ActionOutcome::Skipped(_) => "-".dimmed(),
        ActionOutcome::Failed(_) => "✗".red(),
    }
}
