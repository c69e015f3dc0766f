//! `occwalk-crosswalk`: hierarchical occupation-code crosswalk engine.
//!
//! Scores survey records coded in one occupational classification with a
//! reference table keyed in another, falling back through coarser code
//! prefixes and cross-vocabulary correspondences, and summarizes the result
//! with survey-weighted statistics.
//!
//! Pure engine crate: receives pre-loaded tables (or loads them through
//! [`load`]), returns annotated records plus coverage. No CLI dependencies.

pub mod aggregate;
pub mod bridge;
pub mod cascade;
pub mod code;
pub mod concordance;
pub mod config;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod impute;
pub mod load;
pub mod matcher;
pub mod model;
pub mod stats;
pub mod translate;
pub mod validate;

pub use cascade::{Cascade, MatchState, Tier, TierMethod};
pub use config::CrosswalkConfig;
pub use engine::run;
pub use error::CrosswalkError;
pub use impute::ImputationPolicy;
pub use matcher::HierarchicalMatcher;
pub use model::{AnnotatedRecord, CrosswalkInput, CrosswalkResult, Provenance, TargetRecord};
