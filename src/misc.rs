use std::sync::atomic::{AtomicUsize, Ordering};

use owo_colors::AnsiColors;

static TERMINAL_COLOR_INDEX: AtomicUsize = AtomicUsize::new(0);

const TERMINAL_COLORS: [AnsiColors; 6] = [
    AnsiColors::Green,
    AnsiColors::Cyan,
    AnsiColors::Magenta,
    AnsiColors::Yellow,
    AnsiColors::Blue,
    AnsiColors::Red,
];

/// Returns the next color in a rotation, used so that the forwarded lines of
/// different commands can be told apart
pub fn next_terminal_color() -> AnsiColors {
    let i = TERMINAL_COLOR_INDEX.fetch_add(1, Ordering::Relaxed);
    TERMINAL_COLORS[i % TERMINAL_COLORS.len()]
}
