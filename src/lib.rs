//! agentflow - dependency-aware orchestration of order-processing agents.
//!
//! agentflow runs a fixed set of pipeline steps (reading purchase orders,
//! validating them, routing exceptions, creating sales orders, summarizing)
//! in waves derived from their declared dependencies, with bounded
//! parallelism, per-step retry and timeout handling, and a structured
//! report of what happened.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration loading, parsing, and validation
//! - [`error`] - Error types and result aliases
//! - [`runner`] - Dependency planning, scheduling, recovery and monitoring
//! - [`shell`] - Shell command steps
//! - [`ui`] - Progress output and run summaries
//!
//! # Example
//!
//! ```
//! use agentflow::config::OrchestrationConfig;
//! use agentflow::runner::{step_fn, Orchestrator, RunStatus, SharedContext};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut config = OrchestrationConfig::default();
//! config.dependencies.insert("po_reader".into(), vec![]);
//! config
//!     .dependencies
//!     .insert("validation".into(), vec!["po_reader".into()]);
//!
//! let orchestrator = Orchestrator::builder()
//!     .config(config)
//!     .step("po_reader", step_fn(|ctx| async move {
//!         ctx.shared().insert("orders", json!(3));
//!         Ok(json!(null))
//!     }))
//!     .step("validation", step_fn(|_| async { Ok(json!(null)) }))
//!     .build()
//!     .unwrap();
//!
//! let shared = SharedContext::new();
//! let report = orchestrator.run(shared.clone(), CancellationToken::new()).await;
//! assert_eq!(report.status, RunStatus::Completed);
//! assert_eq!(shared.get("orders"), Some(json!(3)));
//! # });
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod shell;
pub mod ui;

pub use error::{OrchestrationError, Result};
