//! Inbound text classification.

/// What an inbound text asks the relay to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// `/start`
    Start,
    /// `/clear`
    Clear,
    /// Any other slash command; carries the command word without the slash.
    Unknown(&'a str),
    /// Plain conversation text.
    Text(&'a str),
}

impl<'a> Inbound<'a> {
    /// Classify a message. Commands may carry a `@botname` suffix
    /// (`/clear@MyBot`) and trailing arguments, both ignored.
    pub fn parse(text: &'a str) -> Self {
        let trimmed = text.trim_start();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Inbound::Text(text);
        };

        let word = rest.split_whitespace().next().unwrap_or("");
        let command = word.split('@').next().unwrap_or("");

        if command.eq_ignore_ascii_case("start") {
            Inbound::Start
        } else if command.eq_ignore_ascii_case("clear") {
            Inbound::Clear
        } else {
            Inbound::Unknown(command)
        }
    }
}
