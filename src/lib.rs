#![allow(clippy::doc_markdown)] // Allow technical terms like JSON-RPC, keccak256 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # AVS Operator
//!
//! Long-running operator daemon for a task-verification network. It watches the task
//! manager contract for `NewTaskCreated` events, asks an external compute service for
//! each task's result, signs the result and forwards the signed response to the
//! aggregator.
//!
//! ## Architecture
//!
//! ```text
//! chain ──NewTaskCreated──► Operator event loop ──client_id──► compute service
//!                                 │          ◄──payload──────
//!                                 ▼
//!                      ResponseSigner (digest + BLS on BN254)
//!                                 │
//!                                 ▼ detached
//!                           aggregator JSON-RPC
//! ```
//!
//! Every collaborator sits behind a trait ([`chain::TaskEventSource`],
//! [`chain::OperatorRegistry`], [`delegate::TaskDelegate`], [`signer::ResponseSigner`],
//! [`aggregator::AggregatorClient`]) and is injected into [`operator::Operator`] at
//! construction; [`operator::OperatorBootstrap`] wires the production implementations.
//!
//! ## Module Organization
//!
//! - [`operator`] - Event loop, statistics, auxiliary failure signal, bootstrap
//! - [`subscription`] - Resubscription with resume cursor, de-duplication and backoff
//! - [`chain`] - Task feed, registry queries, alloy contract bindings and node client
//! - [`delegate`] - Compute service client
//! - [`signer`] - Task response digest and signing
//! - [`aggregator`] - Aggregator client and detached dispatch
//! - [`identity`] - Operator identity and encrypted keystore
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avs_operator::config::ConfigManager;
//! use avs_operator::operator::{AuxiliaryMonitor, OperatorBootstrap};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_path("config/operator.toml")?;
//! let operator = OperatorBootstrap::from_config(manager.config()).await?;
//!
//! let (_stop, shutdown) = tokio::sync::oneshot::channel();
//! operator.start(shutdown, AuxiliaryMonitor::disabled()).await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod chain;
pub mod config;
pub mod delegate;
pub mod error;
pub mod identity;
pub mod logging;
pub mod operator;
pub mod signer;
pub mod subscription;
pub mod types;

pub use config::{ConfigManager, OperatorConfig};
pub use error::{OperatorError, Result};
pub use operator::{AuxiliaryMonitor, Operator, OperatorBootstrap, OperatorComponents};
pub use types::{ClientId, OperatorAddress, OperatorId, SignedTaskResponse, TaskCreatedEvent, TaskResponse};
