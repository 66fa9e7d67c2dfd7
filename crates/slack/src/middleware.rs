use turnwire_core::{CanonicalTurn, EventTag};

/// Refines plain messages into direct messages and mentions of the bot,
/// stripping a leading mention. Bot suppression always runs last.
pub fn tag_message_type(turn: &mut CanonicalTurn, bot_user_id: Option<&str>) {
    if turn.is_message() && turn.tag == EventTag::Message {
        refine_message(turn, bot_user_id);
    }
    turn.suppress_bot_sender();
}

fn refine_message(turn: &mut CanonicalTurn, bot_user_id: Option<&str>) {
    let text = turn.text.clone().unwrap_or_default();

    if turn.is_direct_channel() {
        turn.tag = EventTag::DirectMessage;
        if let Some(stripped) = bot_user_id.and_then(|bot| strip_leading_mention(&text, bot)) {
            turn.text = Some(stripped);
        }
        return;
    }

    let Some(bot) = bot_user_id.filter(|bot| !bot.is_empty()) else {
        return;
    };
    if let Some(stripped) = strip_leading_mention(&text, bot) {
        turn.tag = EventTag::DirectMention;
        turn.text = Some(stripped);
    } else if contains_mention(&text, bot) {
        turn.tag = EventTag::Mention;
    }
}

/// `<@U123> hi` and `<@U123|bot>: hi` both yield `hi`.
fn strip_leading_mention(text: &str, bot_user_id: &str) -> Option<String> {
    let rest = mention_end(text.trim_start(), bot_user_id)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Some(rest.trim_start().to_owned())
}

fn contains_mention(text: &str, bot_user_id: &str) -> bool {
    text.match_indices("<@").any(|(index, _)| mention_end(&text[index..], bot_user_id).is_some())
}

/// Returns the text after a mention of `bot_user_id` at the very start of `text`.
fn mention_end<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let after_open = text.strip_prefix("<@")?;
    let id = after_open.get(..bot_user_id.len())?;
    if !id.eq_ignore_ascii_case(bot_user_id) {
        return None;
    }
    let after_id = &after_open[bot_user_id.len()..];
    match after_id.chars().next()? {
        '>' => Some(&after_id[1..]),
        '|' => after_id.find('>').map(|close| &after_id[close + 1..]),
        _ => None,
    }
}
