//! Social-media content manager
//!
//! A chat assistant that keeps three long-term memories per user: a
//! profile, a content calendar and content-creation guidelines.

pub mod graph;
pub mod prompts;
pub mod schemas;

pub use graph::{
    calendar_namespace, guidelines_namespace, profile_namespace, ContentManager, GUIDELINES_KEY,
    USER_ID,
};
pub use schemas::{ContentItem, ContentStatus, Profile, UpdateType, UPDATE_MEMORY};
