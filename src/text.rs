use std::sync::LazyLock;

use regex::Regex;

const EMOJI_SHORTCUTS: [(&str, &str); 10] = [
    (":rocket:", "🚀"),
    (":fire:", "🔥"),
    (":heart:", "❤️"),
    (":smile:", "😊"),
    (":laugh:", "😂"),
    (":cool:", "😎"),
    (":thumbsup:", "👍"),
    (":thumbsdown:", "👎"),
    (":clap:", "👏"),
    (":party:", "🎉"),
];

const PROFANITY_WORDS: [&str; 7] = ["fuck", "shit", "bitch", "ass", "damn", "hell", "crap"];

// substring match, so "hello" becomes "****o"
static PROFANITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?i){}", PROFANITY_WORDS.join("|")))
        .expect("profanity pattern is a plain alternation")
});

pub fn filter_profanity(text: &str) -> String {
    PROFANITY
        .replace_all(text, |caps: &regex::Captures| "*".repeat(caps[0].chars().count()))
        .into_owned()
}

pub fn replace_emoji_shortcuts(text: &str) -> String {
    EMOJI_SHORTCUTS
        .iter()
        .fold(text.to_owned(), |acc, (shortcut, emoji)| acc.replace(shortcut, emoji))
}

/// What a sender's text turns into before it is shown or stored.
pub fn prepare_outgoing(text: &str) -> String {
    replace_emoji_shortcuts(&filter_profanity(text.trim()))
}
