//! # Artifact Rank
//!
//! Confidence scoring and similarity detection for artifact bundles
//! (skills, commands, agents).
//!
//! Artifact Rank ranks a population of artifacts against a free-text
//! query and detects duplicates between artifacts. Query matching blends
//! weighted-field keyword scoring with optional embedding-based semantic
//! scoring, then folds in source trust, Bayesian rating quality, and a
//! project-context boost. Duplicate detection compares artifact
//! fingerprints component by component and persists the top matches in a
//! SQLite cache fronted by an FTS5 prefilter.
//!
//! Every expensive path degrades instead of failing: semantic scoring
//! runs under a wall-clock budget and falls back to keyword-only, the
//! prefilter falls back to a full scan, and results report whether and
//! why they were degraded.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌────────────┐
//! │  keyword  │──▶│ calculator   │──▶│  scoring    │──▶ ScoringResult
//! │  semantic │──▶│ (blend+boost)│   │ (rank batch)│
//! └───────────┘   └─────────────┘   └────────────┘
//!
//! ┌────────────┐   ┌────────────┐   ┌──────────┐
//! │ fingerprint │──▶│ similarity  │──▶│  cache    │──▶ SQLite
//! │  (pairwise) │   │ (composite) │   │ (FTS5 pre)│
//! └────────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Collaborator traits and reference implementations |
//! | [`keyword`] | Tokenizer and weighted-field keyword matching |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`semantic`] | Cosine-based semantic scoring |
//! | [`context`] | Project-context detection and boosting |
//! | [`quality`] | Bayesian rating quality and source trust |
//! | [`decay`] | Time decay and score aggregation |
//! | [`calculator`] | Per-artifact hybrid score calculation |
//! | [`scoring`] | Query-match orchestration |
//! | [`fingerprint`] | Pairwise fingerprint comparison |
//! | [`similarity`] | Composite similarity scoring |
//! | [`cache`] | Persisted similarity cache |
//! | [`timeout`] | Wall-clock budgets for fallible work |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod calculator;
pub mod config;
pub mod context;
pub mod db;
pub mod decay;
pub mod embedding;
pub mod fingerprint;
pub mod keyword;
pub mod migrate;
pub mod models;
pub mod quality;
pub mod scoring;
pub mod semantic;
pub mod similarity;
pub mod store;
pub mod timeout;
