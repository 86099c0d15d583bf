//! Lead intelligence workflows for LeadForge.
//!
//! This crate ties storage, the places directory, and the model providers
//! together into the operations exposed by [`service::LeadService`]:
//!
//! - [`scoring`]: AI Opportunity Score and its breakdown
//! - [`stages`] / [`orchestrator`]: the Geo → Property → Service sequence
//! - [`analysis`]: provider-backed stage execution
//! - [`contacts`]: Apollo contact enrichment
//! - [`campaign`]: campaign membership, bulk enrichment, message drafting

pub mod analysis;
pub mod campaign;
pub mod cancel;
pub mod contacts;
pub mod orchestrator;
pub mod progress;
pub mod scoring;
pub mod service;
pub mod stages;

pub use analysis::{ProviderClients, StageRunner};
pub use campaign::MessageUpdate;
pub use cancel::CancelFlag;
pub use orchestrator::{AnalysisReport, StageExecutor, StageOutput};
pub use progress::{BulkProgress, ProgressReporter, SilentProgress};
pub use scoring::{ScoreBreakdown, ScoredLead};
pub use service::{ActivityUpdate, LeadService, LeadStatusUpdate, NewActivity};
pub use stages::{StageSnapshot, StageState, StageStatus};
