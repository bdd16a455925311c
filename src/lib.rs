// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # sleepwalker
//!
//! Wanders a bounded set of directories while the machine is idle, collects
//! what it finds, and has a language model write a short dream about it.
//!
//! ## Architecture
//!
//! - **Exploration** (`explore`): symlink-safe, depth-bounded random walk over allowed roots
//! - **Experiences** (`experience`): discoveries become observations, observations become a narrative
//! - **Narrative gateway** (`llm`): model fallback chain with explicit exponential backoff
//! - **Session** (`session`): cycle loop, cooperative shutdown, sleep prevention, artifacts on disk
//!
//! ## Library usage
//!
//! ```no_run
//! use sleepwalker::explore::{Explorer, ExplorerConfig};
//!
//! let mut explorer = Explorer::new(["/home/me/Documents"], ExplorerConfig::default());
//! while let Some(discovery) = explorer.wander() {
//!     println!("{} {}", discovery.kind, discovery.path.display());
//! }
//! ```

pub mod config;
pub mod error;
pub mod experience;
pub mod explore;
pub mod llm;
pub mod paths;
pub mod session;
