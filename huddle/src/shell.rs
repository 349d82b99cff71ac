//! Helpers for text-mode shells.
//!
//! Notifications carry light HTML-style markup meant for a rich-text view.
//! A terminal shell shows them as plain text instead.

use crate::membership::ShellEvent;

/// Strip `<...>` tags from rendered markup. `<br>` becomes a newline.
///
/// A `<` with no closing `>` is kept as literal text.
#[must_use]
pub fn to_plain(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            out.push_str(&rest[open..]);
            return out;
        };
        if is_line_break(&after[..close]) {
            out.push('\n');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_line_break(tag: &str) -> bool {
    let name = tag.trim().trim_end_matches('/').trim();
    name.eq_ignore_ascii_case("br")
}

/// Plain-text line for a shell event, or `None` for control events.
#[must_use]
pub fn describe(event: &ShellEvent) -> Option<String> {
    match event {
        ShellEvent::Notify(notification) => Some(to_plain(&notification.render())),
        ShellEvent::LoggedIn { name } => Some(format!("Logged in as {name}.")),
        ShellEvent::ForceClose => None,
    }
}
