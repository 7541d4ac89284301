//! Herald monitor: watches a Slack channel for messages addressed to an agent
//! persona and hands them, batched, to an external autonomous agent.
//!
//! # Modules
//!
//! - [`dispatcher`]: the poll / classify / dispatch / persist loop
//! - [`state`]: persisted seen sets and the agent thread registry
//! - [`lock`]: single-instance guard
//! - [`bus`]: message-bus interface and the Slack adapter
//! - [`agent`]: agent process invocation and outcome classification
//! - [`agents`]: the closed registry of agent personas
//! - [`settings`]: the shared `~/.agent_settings.json` file
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_monitor::{AgentId, CliAgentRunner, Dispatcher, MonitorOptions, SlackBus};
//!
//! let options = MonitorOptions::default();
//! let runner = CliAgentRunner::new("claude", vec!["-p".into()], ".");
//! let mut dispatcher = Dispatcher::new(AgentId::Nova.profile(), "C0123", options, bus, runner);
//! let summary = dispatcher
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! ```

pub mod agent;
pub mod agents;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lock;
pub mod message;
pub mod prompt;
pub mod settings;
pub mod state;

pub use agent::{AgentError, AgentInvocation, AgentRunner, CliAgentRunner, DispatchOutcome};
pub use agents::{AgentId, AgentProfile};
pub use bus::{BusError, MessageBus, Persona, SlackBus};
pub use config::MonitorOptions;
pub use dispatcher::{CycleOutcome, CycleReport, Dispatcher, RunSummary, StopReason};
pub use error::{MonitorError, MonitorResult};
pub use lock::{InstanceLock, LOCK_FILE_NAME};
pub use message::{Message, PendingItem, PendingKind, ReplyTarget};
pub use settings::AgentSettings;
pub use state::{MonitorState, StateLimits, StateStore};
