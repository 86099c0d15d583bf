//! Shared types, error model, and configuration for LeadForge.
//!
//! This crate is the foundation depended on by all other LeadForge crates.
//! It provides:
//! - [`LeadForgeError`] and [`ErrorKind`]: the unified, structured error type
//! - Domain types ([`Lead`], [`Activity`], [`Stage`], campaign records)
//! - Enrichment payloads ([`GeoEnrichment`], [`PropertyAnalysis`], [`ServiceMapping`])
//! - Configuration ([`AppConfig`], [`Provider`], config loading)

pub mod config;
pub mod error;
pub mod payloads;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, Provider, ProvidersConfig, ScoringConfig, Settings, SocialConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_provider_key,
};
pub use error::{ErrorKind, LeadForgeError, Result};
pub use payloads::{
    ActionableInsights, BusinessIntelligence, CompetitionAssessment, CompetitorRecord,
    CompetitorReview, CostTimeAnalysis, GeoEnrichment, PropertyAnalysis, RecommendedService,
    ServiceContext, ServiceMapping,
};
pub use types::{
    Activity, ActivityKind, Campaign, CampaignStatus, CampaignStep, Channel, EnrichmentStatus,
    GeneratedMessage, Lead, LeadStatus, MessageStatus, QualificationLevel, Stage, new_id,
};
