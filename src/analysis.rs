//! Channel analysis: command parsing, activity statistics, and
//! transcript formatting for summaries.
//!
//! A request is a channel command when it references a channel
//! (`<#C123|general>` or `<#C123>`), or says "this channel" / "here"
//! together with an analysis verb.
//!
//! | Text contains | Mode |
//! |---------------|------|
//! | analyze, recent, activity, overview, happen* | [`AnalysisMode::Activity`] |
//! | anything else | [`AnalysisMode::Summarize`] |
//!
//! | Text contains | Window |
//! |---------------|--------|
//! | yesterday | [`TimeWindow::Yesterday`] |
//! | week | [`TimeWindow::Week`] (last 7 days) |
//! | month | [`TimeWindow::Month`] (last 30 days) |
//! | otherwise | [`TimeWindow::Today`] |

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use regex::Regex;

pub const NO_MESSAGES_REPLY: &str =
    "I couldn't find any recent messages in that channel or I don't have access to it.";

const ACTIVITY_WORDS: &[&str] = &[
    "analyze", "analyse", "recent", "activity", "overview", "happen",
];
const ANALYSIS_VERBS: &[&str] = &[
    "summarize", "summarise", "summary", "recap", "analyze", "analyse", "activity", "overview",
    "happening", "happened",
];
const HIGHLIGHT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Summarize,
    Activity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Today,
    Yesterday,
    Week,
    Month,
}

impl TimeWindow {
    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::Today => "today",
            TimeWindow::Yesterday => "yesterday",
            TimeWindow::Week => "past week",
            TimeWindow::Month => "past month",
        }
    }

    /// `(oldest, latest)` bounds relative to `now`. `latest` is `None` when
    /// the window runs up to the present.
    ///
    /// Day boundaries are midnights in `now`'s time zone.
    pub fn bounds<Tz: TimeZone>(self, now: &DateTime<Tz>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let now_utc = now.with_timezone(&Utc);
        let midnight = start_of_day(now).unwrap_or(now_utc - Duration::hours(24));
        match self {
            TimeWindow::Today => (midnight, None),
            TimeWindow::Yesterday => (midnight - Duration::days(1), Some(midnight)),
            TimeWindow::Week => (now_utc - Duration::days(7), None),
            TimeWindow::Month => (now_utc - Duration::days(30), None),
        }
    }
}

fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let naive = now.date_naive().and_hms_opt(0, 0, 0)?;
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Which channel a command refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Id(String),
    /// The channel the request was made in.
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCommand {
    pub target: ChannelTarget,
    pub mode: AnalysisMode,
    pub window: TimeWindow,
}

impl ChannelCommand {
    /// Resolve the target channel id given the channel the request came from.
    pub fn channel_id<'a>(&'a self, current: &'a str) -> &'a str {
        match &self.target {
            ChannelTarget::Id(id) => id,
            ChannelTarget::Current => current,
        }
    }
}

fn channel_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#([A-Za-z0-9]+)(?:\|[^>]*)?>").expect("valid regex"))
}

fn here_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(this channel|here)\b").expect("valid regex"))
}

/// Parse a channel command, or `None` if `text` is not one.
pub fn parse_channel_command(text: &str) -> Option<ChannelCommand> {
    let lower = text.to_lowercase();

    let target = if let Some(caps) = channel_ref_re().captures(text) {
        ChannelTarget::Id(caps[1].to_uppercase())
    } else if here_re().is_match(&lower) && ANALYSIS_VERBS.iter().any(|v| lower.contains(v)) {
        ChannelTarget::Current
    } else {
        return None;
    };

    let mode = if ACTIVITY_WORDS.iter().any(|w| lower.contains(w)) {
        AnalysisMode::Activity
    } else {
        AnalysisMode::Summarize
    };

    let window = if lower.contains("yesterday") {
        TimeWindow::Yesterday
    } else if lower.contains("week") {
        TimeWindow::Week
    } else if lower.contains("month") {
        TimeWindow::Month
    } else {
        TimeWindow::Today
    };

    Some(ChannelCommand {
        target,
        mode,
        window,
    })
}

/// One channel message with the author already resolved to a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityStats {
    pub total_messages: usize,
    pub unique_users: usize,
    pub most_active_user: String,
    /// Hour of day (0-23) with the most messages, in the caller's time zone.
    pub peak_hour: u32,
    /// Up to three most recent `(user, text)` pairs, oldest first.
    pub recent: Vec<(String, String)>,
}

/// Statistics over `messages` (oldest first). `None` when there are none.
///
/// Ties for most active user go to the alphabetically first name; ties
/// for peak hour go to the earliest hour.
pub fn activity_stats<Tz: TimeZone>(messages: &[ChannelMessage], tz: &Tz) -> Option<ActivityStats> {
    if messages.is_empty() {
        return None;
    }

    let mut per_user: BTreeMap<&str, usize> = BTreeMap::new();
    let mut per_hour: HashMap<u32, usize> = HashMap::new();
    for msg in messages {
        *per_user.entry(msg.user.as_str()).or_default() += 1;
        *per_hour
            .entry(msg.timestamp.with_timezone(tz).hour())
            .or_default() += 1;
    }

    let most_active_user = per_user
        .iter()
        .fold(None::<(&str, usize)>, |best, (user, count)| match best {
            Some((_, best_count)) if best_count >= *count => best,
            _ => Some((user, *count)),
        })
        .map(|(user, _)| user.to_string())
        .unwrap_or_default();

    let peak_hour = per_hour
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(hour, _)| *hour)
        .unwrap_or(0);

    let recent = messages
        .iter()
        .skip(messages.len().saturating_sub(3))
        .map(|m| (m.user.clone(), m.text.clone()))
        .collect();

    Some(ActivityStats {
        total_messages: messages.len(),
        unique_users: per_user.len(),
        most_active_user,
        peak_hour,
        recent,
    })
}

/// Slack-formatted activity report.
pub fn format_activity(stats: &ActivityStats, window: TimeWindow) -> String {
    let mut out = format!(
        "📈 *Activity Summary* ({}):\n\n\
         • *{}* total messages\n\
         • *{}* active participants\n\
         • Most active: *{}*\n\
         • Peak activity: *{}:00*\n\n\
         Recent highlights:",
        window.label(),
        stats.total_messages,
        stats.unique_users,
        stats.most_active_user,
        stats.peak_hour
    );
    for (user, text) in &stats.recent {
        out.push_str(&format!("\n• {}: {}", user, truncate_chars(text, HIGHLIGHT_CHARS)));
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render messages as `[HH:MM] user: text` lines.
///
/// When the whole transcript exceeds `budget` characters, only the most
/// recent lines that fit are kept.
pub fn format_transcript<Tz: TimeZone>(messages: &[ChannelMessage], tz: &Tz, budget: usize) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let lines: Vec<String> = messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}: {}",
                m.timestamp.with_timezone(tz).format("%H:%M"),
                m.user,
                m.text
            )
        })
        .collect();

    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0usize;
    for line in lines.iter().rev() {
        let cost = line.chars().count() + usize::from(!kept.is_empty());
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(line);
    }
    kept.reverse();
    kept.join("\n")
}

/// Wrap a model-written summary in the channel summary frame.
pub fn format_summary(summary: &str, window: TimeWindow, analyzed: usize) -> String {
    format!(
        "📊 *Channel Summary* ({}):\n\n{}\n\n_Analyzed {} messages_",
        window.label(),
        summary,
        analyzed
    )
}
