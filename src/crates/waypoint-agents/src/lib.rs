//! Agents built on the waypoint engine
//!
//! - [`email`]: triages inbound email and drafts replies and meetings, with
//!   every outbound action reviewed by a human
//! - [`content`]: a content-planning chat assistant with per-user memories
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waypoint_agents::email::{EmailAssistant, EmailInput, InMemoryMailbox};
//! use waypoint_core::{InMemoryCheckpointSaver, InMemoryStore, Runtime};
//!
//! # async fn example(model: Arc<dyn waypoint_core::ChatModel>) -> waypoint_core::Result<()> {
//! let runtime = Runtime::new(Arc::new(InMemoryStore::new())).with_model(model);
//! let graph = EmailAssistant::new(Arc::new(InMemoryMailbox::new()))
//!     .compile(runtime, Arc::new(InMemoryCheckpointSaver::new()))?;
//!
//! let email = EmailInput::new("Meeting?").with_author("ana@example.com");
//! let outcome = graph.run("thread-1", email.into_update()?).await?;
//! for request in outcome.interrupts() {
//!     println!("{}", request.description);
//! }
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod email;
pub mod template;

pub use template::fill;
