// Trend lookup for the research stage
//
// Search is optional: without a key, or when the search API misbehaves, the
// research prompt gets a placeholder instead and the run carries on.

mod brave;

pub use brave::BraveSearch;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::calendar::ContentCategory;

/// Placeholder used when no search results could be gathered
pub const NO_TRENDS: &str = "No current search results available";

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// Source of current web results
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}

/// Named search queries for a category: two general ones plus two
/// category-specific ones, all pinned to the current year.
pub fn search_queries(category: ContentCategory) -> Vec<(&'static str, String)> {
    let now = chrono::Local::now();
    let year = now.year();
    let month = now.format("%B");

    let mut queries = vec![
        ("ai_trends", format!("AI automation small business trends {}", year)),
        ("recent_news", format!("business automation news {} {}", month, year)),
    ];

    let specific: [(&'static str, String); 2] = match category {
        ContentCategory::EducationExplainer => [
            ("tools", format!("new AI automation tools {} small business", year)),
            ("guides", format!("AI automation tutorial business {}", year)),
        ],
        ContentCategory::ExperimentCaseStudy => [
            ("case_studies", format!("AI automation success stories small business {}", year)),
            ("results", format!("business automation ROI case study {}", year)),
        ],
        ContentCategory::HotTakeOpinion => [
            ("predictions", format!("AI automation predictions {} business", year + 1)),
            ("debates", format!("AI automation controversy {}", year)),
        ],
        ContentCategory::VisualFramework => [
            ("processes", "business automation workflow examples".to_string()),
            ("diagrams", "AI automation process visualization".to_string()),
        ],
        ContentCategory::EngagementBooster => [
            ("polls", format!("business automation survey results {}", year)),
            ("questions", "AI automation challenges small business".to_string()),
        ],
        ContentCategory::PersonalJourney => [
            ("experiences", format!("AI automation consultant journey {}", year)),
            ("learning", "learning AI automation business".to_string()),
        ],
    };

    queries.extend(specific);
    queries
}

/// Run every query for `category` and format the hits for a prompt.
///
/// Individual query failures are noted inline; a missing source yields
/// `NO_TRENDS`. Never fails.
pub async fn gather_trends(
    source: Option<&dyn TrendSource>,
    category: ContentCategory,
    count: u32,
) -> String {
    let Some(source) = source else {
        return NO_TRENDS.to_string();
    };

    let mut sections = Vec::new();
    let mut any_results = false;

    for (name, query) in search_queries(category) {
        match source.search(&query, count).await {
            Ok(results) if !results.is_empty() => {
                any_results = true;
                let lines: Vec<String> = results
                    .iter()
                    .map(|r| format!("- {}: {} ({})", r.title, r.description, r.url))
                    .collect();
                sections.push(format!("{}:\n{}", name, lines.join("\n")));
            }
            Ok(_) => {
                sections.push(format!("{}: no results", name));
            }
            Err(e) => {
                tracing::warn!("{} search failed for '{}': {:#}", source.name(), query, e);
                sections.push(format!("{}: search unavailable", name));
            }
        }
    }

    if !any_results {
        return NO_TRENDS.to_string();
    }

    sections.join("\n\n")
}
