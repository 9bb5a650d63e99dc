//! SQLite-backed persistence (spec §6 "Persistent state layout").
//!
//! A single database file holds conversations, anticipations, scheduled
//! tasks, and usage records. Connections are pooled via `sqlx::SqlitePool`
//! with WAL mode and a busy timeout, per `config::SqliteConfig`.

pub mod anticipation;
pub mod checkpoints;
mod conversations;
pub mod scheduled_tasks;
pub mod sqlite;
mod tasks;
mod usage;

pub use anticipation::{AnticipationRow, AnticipationStore, NewAnticipation, Trigger, WakeContext};
pub use checkpoints::{CheckpointRecord, CheckpointStore};
pub use conversations::{ConversationStore, StoredMessage};
pub use scheduled_tasks::{NewScheduledTask, ScheduledTaskRow, ScheduledTaskStore};
pub use sqlite::{open_pool, run_migrations, SqlitePool};
pub use tasks::{AgentTask, TaskStatus, TaskStore};
pub use usage::{UsageRecord, UsageStore};
