//! Styled terminal output for tfexport
//!
//! Components never call these directly. They log through the `Output` handle
//! they were constructed with, and `TerminalOutput` forwards here.

use owo_colors::OwoColorize;

type Rgb = (u8, u8, u8);

const MINT: Rgb = (152, 225, 152);
const CORAL: Rgb = (255, 160, 160);
const CREAM: Rgb = (255, 230, 160);
const SKY: Rgb = (160, 200, 255);
const LAVENDER: Rgb = (181, 174, 254);
const GREY: Rgb = (160, 160, 160);
const TEAL: Rgb = (120, 180, 195);

fn paint(text: &str, (r, g, b): Rgb) -> String {
    text.truecolor(r, g, b).to_string()
}

/// Colour for an item state as printed by the importer
fn state_colour(status: &str) -> Rgb {
    match status {
        "imported" => MINT,
        "failed" => CORAL,
        "skipped" => CREAM,
        _ => TEAL,
    }
}

pub fn success(message: &str) {
    println!("{} {}", paint("✓", MINT).bold(), message.bright_white());
}

/// Errors go to stderr so a redirected config dump stays clean
pub fn error(message: &str) {
    eprintln!("{} {}", paint("✗", CORAL).bold(), message.bright_white());
}

pub fn warning(message: &str) {
    println!("{} {}", paint("⚠", CREAM).bold(), message.bright_white());
}

pub fn info(message: &str) {
    println!("{} {}", paint("ℹ", SKY).bold(), message.bright_white());
}

pub fn debug(message: &str) {
    println!("{} {}", paint("·", GREY), paint(message, GREY));
}

/// Section header followed by a separator line
pub fn section(title: &str) {
    println!("\n{}", paint(title, LAVENDER).bold());
    println!("{}", paint(&"─".repeat(50), GREY));
}

pub fn key_value(key: &str, value: &str) {
    println!("  {} {}", paint(&format!("{}:", key), GREY), value.bright_white());
}

pub fn dimmed(message: &str) {
    println!("{}", paint(message, GREY));
}

/// One finished item: `[3/12] imported azurerm_virtual_network.main`
pub fn progress(current: usize, total: usize, item: &str, status: &str) {
    let width = total.to_string().len();
    println!(
        "  {} {} {}",
        paint(&format!("[{:>width$}/{}]", current, total, width = width), GREY),
        paint(&format!("{:<8}", status), state_colour(status)),
        item.bright_white()
    );
}

pub fn blank() {
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_states_get_distinct_colours() {
        assert_eq!(state_colour("imported"), MINT);
        assert_eq!(state_colour("failed"), CORAL);
        assert_eq!(state_colour("skipped"), CREAM);
        assert_eq!(state_colour("pending"), TEAL);
    }
}
