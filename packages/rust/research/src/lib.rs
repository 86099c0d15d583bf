//! Lead research beyond the three enrichment stages.
//!
//! - [`aggregator`]: web mentions, extended place details, review themes
//! - [`social`]: per-platform social presence lookups and insight synthesis

pub mod aggregator;
pub mod search;
pub mod social;

pub use aggregator::{
    MentionCategory, PlaceSnapshot, ResearchAggregator, ResearchBundle, ResearchTarget, ReviewThemes,
    WebMention, classify_reviews,
};
pub use search::{SearchHit, WebSearchClient};
pub use social::{
    Platform, PlatformPresence, SocialAnalyzer, SocialInsights, SocialPresenceReport, classify_answer,
};
