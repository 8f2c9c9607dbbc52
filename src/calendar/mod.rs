// Content calendar
//
// A 30-day plan of (category, topic) pairs with weekly thread days and a
// theme per month. The built-in plan lives in data/calendar.toml; a custom
// file can replace it via `calendar_path`.

mod progress;

pub use progress::{StrategyProgress, StrategyStatus};

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Number of days in one calendar cycle
pub const CALENDAR_DAYS: u32 = 30;

const FALLBACK_TOPIC: &str = "AI automation insight";
const FALLBACK_THREAD_TOPIC: &str = "AI automation deep dive";
const FALLBACK_THEME: &str = "foundation_building";

/// Content pillar a post belongs to; selects prompt templates and search queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    EducationExplainer,
    ExperimentCaseStudy,
    HotTakeOpinion,
    VisualFramework,
    EngagementBooster,
    PersonalJourney,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 6] = [
        ContentCategory::EducationExplainer,
        ContentCategory::ExperimentCaseStudy,
        ContentCategory::HotTakeOpinion,
        ContentCategory::VisualFramework,
        ContentCategory::EngagementBooster,
        ContentCategory::PersonalJourney,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::EducationExplainer => "education_explainer",
            ContentCategory::ExperimentCaseStudy => "experiment_case_study",
            ContentCategory::HotTakeOpinion => "hot_take_opinion",
            ContentCategory::VisualFramework => "visual_framework",
            ContentCategory::EngagementBooster => "engagement_booster",
            ContentCategory::PersonalJourney => "personal_journey",
        }
    }

    /// Weekly rhythm used when no calendar day applies:
    /// explainer on day%7 == 0, visuals on 2 and 5, hot take on 3,
    /// engagement on 4, otherwise a coin flip between case study and journey.
    pub fn for_day_of_month<R: Rng + ?Sized>(day_of_month: u32, rng: &mut R) -> Self {
        match day_of_month % 7 {
            0 => ContentCategory::EducationExplainer,
            2 | 5 => ContentCategory::VisualFramework,
            3 => ContentCategory::HotTakeOpinion,
            4 => ContentCategory::EngagementBooster,
            _ => {
                if rng.gen_bool(0.5) {
                    ContentCategory::ExperimentCaseStudy
                } else {
                    ContentCategory::PersonalJourney
                }
            }
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ContentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .with_context(|| {
                format!(
                    "Unknown content category '{}' (expected one of: {})",
                    s,
                    ContentCategory::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// What to post on a given calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentPlan {
    pub day: u32,
    pub category: ContentCategory,
    pub topic: String,
    pub theme: String,
    pub is_thread: bool,
}

#[derive(Debug, Deserialize)]
struct CalendarFile {
    #[serde(default)]
    days: Vec<DayEntry>,
    #[serde(default)]
    threads: Vec<ThreadEntry>,
    #[serde(default)]
    themes: Vec<ThemeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct DayEntry {
    day: u32,
    category: ContentCategory,
    topic: String,
}

#[derive(Debug, Deserialize)]
struct ThreadEntry {
    day: u32,
    topic: String,
}

#[derive(Debug, Deserialize)]
struct ThemeEntry {
    month: u32,
    name: String,
}

/// 30-day content calendar
#[derive(Debug, Clone)]
pub struct ContentCalendar {
    days: BTreeMap<u32, (ContentCategory, String)>,
    threads: BTreeMap<u32, String>,
    themes: BTreeMap<u32, String>,
}

impl ContentCalendar {
    /// Calendar shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(include_str!("../../data/calendar.toml"))
            .context("Failed to parse built-in calendar")
    }

    /// Load a calendar from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calendar from {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse calendar {}", path.display()))
    }

    /// Custom calendar when a path is configured, otherwise the built-in one
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: CalendarFile = toml::from_str(contents)?;

        let mut days = BTreeMap::new();
        for entry in file.days {
            if entry.day == 0 || entry.day > CALENDAR_DAYS {
                bail!("Calendar day {} outside 1..={}", entry.day, CALENDAR_DAYS);
            }
            if days
                .insert(entry.day, (entry.category, entry.topic))
                .is_some()
            {
                bail!("Calendar day {} defined twice", entry.day);
            }
        }

        let threads = file.threads.into_iter().map(|t| (t.day, t.topic)).collect();

        let mut themes = BTreeMap::new();
        for theme in file.themes {
            if !(1..=12).contains(&theme.month) {
                bail!("Theme month {} outside 1..=12", theme.month);
            }
            themes.insert(theme.month, theme.name);
        }

        Ok(Self {
            days,
            threads,
            themes,
        })
    }

    /// Map any day number onto the 1..=30 cycle
    pub fn normalize_day(day: u32) -> u32 {
        if day > CALENDAR_DAYS {
            ((day - 1) % CALENDAR_DAYS) + 1
        } else {
            day
        }
    }

    pub fn is_thread_day(&self, day: u32) -> bool {
        self.threads.contains_key(&Self::normalize_day(day))
    }

    pub fn thread_topic(&self, day: u32) -> &str {
        self.threads
            .get(&Self::normalize_day(day))
            .map(String::as_str)
            .unwrap_or(FALLBACK_THREAD_TOPIC)
    }

    pub fn monthly_theme(&self, month: u32) -> &str {
        self.themes
            .get(&month)
            .map(String::as_str)
            .unwrap_or(FALLBACK_THEME)
    }

    /// Plan for `day` using the current month's theme
    pub fn plan_for_day(&self, day: u32) -> ContentPlan {
        self.plan_for(day, chrono::Local::now().month())
    }

    /// Plan for `day` in `month`. Days past 30 wrap; days missing from the
    /// calendar fall back to an explainer. Thread days swap in the thread topic.
    pub fn plan_for(&self, day: u32, month: u32) -> ContentPlan {
        let day = Self::normalize_day(day);
        let (category, topic) = self
            .days
            .get(&day)
            .cloned()
            .unwrap_or((ContentCategory::EducationExplainer, FALLBACK_TOPIC.to_string()));

        let is_thread = self.is_thread_day(day);
        let topic = if is_thread {
            self.thread_topic(day).to_string()
        } else {
            topic
        };

        ContentPlan {
            day,
            category,
            topic,
            theme: self.monthly_theme(month).to_string(),
            is_thread,
        }
    }

    /// Plans for `count` consecutive days starting at `start_day`
    pub fn preview(&self, start_day: u32, count: u32) -> Vec<ContentPlan> {
        let month = chrono::Local::now().month();
        (0..count)
            .map(|offset| self.plan_for(start_day + offset, month))
            .collect()
    }
}
