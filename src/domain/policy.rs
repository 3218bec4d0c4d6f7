//! Per-integration response policy
//!
//! A Policy is loaded once at run start and treated as immutable for the
//! remainder of the run. Every field has a documented default so a freshly
//! created integration behaves sensibly before anyone edits its settings.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Voice used when generating replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Formal,
    #[default]
    Casual,
    Funny,
    Empathetic,
    Professional,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Casual => "casual",
            Tone::Funny => "funny",
            Tone::Empathetic => "empathetic",
            Tone::Professional => "professional",
        }
    }

    /// Prompt-ready description of the tone
    pub fn describe(&self) -> &'static str {
        match self {
            Tone::Formal => "formal and polite, without slang",
            Tone::Casual => "casual and friendly, like talking to a friend",
            Tone::Funny => "light-hearted and witty, with gentle humor",
            Tone::Empathetic => "warm and understanding, acknowledging how the person feels",
            Tone::Professional => "professional and objective, focused on being helpful",
        }
    }
}

/// Daily window during which the integration may reply
///
/// `start > end` means the window spans midnight (e.g. 22:00 to 06:00).
/// Weekdays use Monday = 0 .. Sunday = 6 and are evaluated in the window's
/// local offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub days: Vec<u8>,

    /// Offset from UTC in minutes for evaluating the window
    pub utc_offset_minutes: i32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default(),
            days: (0..7).collect(),
            utc_offset_minutes: 0,
        }
    }
}

impl WorkingHours {
    /// Whether `at` falls inside the window. Both ends are inclusive at minute resolution.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        let local = at.with_timezone(&offset);

        let weekday = local.weekday().num_days_from_monday() as u8;
        if !self.days.contains(&weekday) {
            return false;
        }

        let Some(now) = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0) else {
            return false;
        };
        let start = truncate_to_minute(self.start);
        let end = truncate_to_minute(self.end);

        if start <= end {
            now >= start && now <= end
        } else {
            now >= start || now <= end
        }
    }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

/// Behavior settings for one integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Name the replies are signed as
    pub persona_name: String,
    pub tone: Tone,
    pub custom_instruction: Option<String>,

    /// BCP 47 tag of the reply language
    pub language: String,

    /// Case-insensitive substrings that cause a comment to be discarded
    pub blacklist: Vec<String>,

    pub respond_to_praise: bool,
    pub respond_to_questions: bool,
    pub respond_to_neutral: bool,
    pub respond_to_criticism: bool,
    pub skip_spam: bool,
    pub skip_offensive: bool,

    pub working_hours: WorkingHours,

    pub max_responses_per_run: u32,
    pub max_comments_per_hour: u32,

    /// Integration-level daily cap, layered under the plan ceiling
    pub max_comments_per_day: u32,

    /// Hold generated replies as pending until a human approves them
    pub approval_required: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            persona_name: "Assistant".to_string(),
            tone: Tone::default(),
            custom_instruction: None,
            language: "pt-BR".to_string(),
            blacklist: vec![],
            respond_to_praise: true,
            respond_to_questions: true,
            respond_to_neutral: true,
            respond_to_criticism: true,
            skip_spam: true,
            skip_offensive: true,
            working_hours: WorkingHours::default(),
            max_responses_per_run: 10,
            max_comments_per_hour: 10,
            max_comments_per_day: 100,
            approval_required: false,
        }
    }
}

impl Policy {
    pub fn with_blacklist(mut self, terms: &[&str]) -> Self {
        self.blacklist = terms.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }

    pub fn with_caps(mut self, per_run: u32, per_hour: u32, per_day: u32) -> Self {
        self.max_responses_per_run = per_run;
        self.max_comments_per_hour = per_hour;
        self.max_comments_per_day = per_day;
        self
    }

    pub fn with_working_hours(mut self, working_hours: WorkingHours) -> Self {
        self.working_hours = working_hours;
        self
    }
}
