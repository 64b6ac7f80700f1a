//! Core type aliases shared across the gateway.
//!
//! Every subsystem speaks in these IDs; keeping them plain aliases (not
//! newtypes) matches the storage layer, where they are all BIGSERIAL columns.

/// User account identifier.
pub type UserId = i64;

/// Conversation identifier.
pub type ConversationId = i64;

/// Message identifier.
pub type MessageId = i64;

/// Agent (preset system prompt + sampling defaults) identifier.
pub type AgentId = i64;

/// Project (persona bundle) identifier.
pub type ProjectId = i64;

/// Freeze-log row identifier.
pub type FreezeId = i64;

/// Message ordinal within a conversation. 64-bit: millisecond timestamp
/// scaled by 100_000 plus a random jitter component.
pub type SequenceNo = i64;
