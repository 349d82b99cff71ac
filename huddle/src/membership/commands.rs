//! Parsing of text typed by the local user.
//!
//! Two words are reserved: `list players` is answered locally and never
//! published, and `kick <name>` becomes a moderation request. Everything
//! else is chat.

/// Keyword that starts a kick request.
const KICK_KEYWORD: &str = "kick";

/// Exact (case-insensitive) text of the roster query.
const LIST_PLAYERS: &str = "list players";

/// Errors in locally typed commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// `kick` was typed without a target name.
    #[error("Error: specify a name after kick")]
    MissingKickTarget,
}

/// What a line of user input asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand<'a> {
    /// Show the presence ledger.
    ListPlayers,
    /// Ask every peer named `target` to leave.
    Kick {
        /// Target as typed, trimmed.
        target: &'a str,
    },
    /// Publish a chat line.
    Say {
        /// Trimmed text.
        text: &'a str,
    },
}

/// Classify one line of user input.
///
/// Returns `Ok(None)` for blank input.
///
/// # Errors
///
/// Returns [`CommandError::MissingKickTarget`] for `kick` with nothing after it.
pub fn parse(input: &str) -> Result<Option<LocalCommand<'_>>, CommandError> {
    let text = input.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if text.eq_ignore_ascii_case(LIST_PLAYERS) {
        return Ok(Some(LocalCommand::ListPlayers));
    }
    if let Some(target) = kick_target(text) {
        if target.is_empty() {
            return Err(CommandError::MissingKickTarget);
        }
        return Ok(Some(LocalCommand::Kick { target }));
    }
    Ok(Some(LocalCommand::Say { text }))
}

/// Returns the (possibly empty) target if `text` is a kick command.
fn kick_target(text: &str) -> Option<&str> {
    let keyword = text.get(..KICK_KEYWORD.len())?;
    if !keyword.eq_ignore_ascii_case(KICK_KEYWORD) {
        return None;
    }
    let rest = &text[KICK_KEYWORD.len()..];
    if rest.is_empty() {
        return Some("");
    }
    // "kicks" or "kickoff" are ordinary chat.
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}
