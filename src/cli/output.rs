//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use std::fmt::Display;

use colored::Colorize;

const LABEL_WIDTH: usize = 14;

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print success status (green checkmark)
pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Print failure status (red X)
pub fn failure(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✗".red(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print an indented, aligned `label value` line
pub fn metric(label: &str, value: impl Display) {
    println!("  {:<width$} {}", label.dimmed(), value, width = LABEL_WIDTH);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}
