//! Persisted condition/cooldown/lifecycle store for the Anticipation Engine
//! (spec §4.3). Trigger fields are stored as columns for indexed matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::sqlite::SqlitePool;
use crate::error::Result;

/// Pattern an anticipation fires on; an empty field is a wildcard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trigger {
    pub after_time: Option<DateTime<Utc>>,
    pub entity_id: Option<String>,
    pub entity_state: Option<String>,
    pub zone: Option<String>,
    pub zone_action: Option<String>,
    pub event_type: Option<String>,
}

/// Normalized event used to match against stored triggers.
#[derive(Debug, Clone)]
pub struct WakeContext {
    pub time: DateTime<Utc>,
    pub event_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_state: Option<String>,
    pub zone: Option<String>,
    pub zone_action: Option<String>,
}

impl Trigger {
    /// A trigger matches a context when every populated field equals the
    /// corresponding context field; an empty field is a wildcard.
    pub fn matches(&self, ctx: &WakeContext) -> bool {
        if let Some(ref after) = self.after_time {
            if ctx.time < *after {
                return false;
            }
        }
        field_matches(&self.entity_id, &ctx.entity_id)
            && field_matches(&self.entity_state, &ctx.entity_state)
            && field_matches(&self.zone, &ctx.zone)
            && field_matches(&self.zone_action, &ctx.zone_action)
            && field_matches(&self.event_type, &ctx.event_type)
    }
}

fn field_matches(trigger_field: &Option<String>, ctx_field: &Option<String>) -> bool {
    match trigger_field {
        None => true,
        Some(v) => ctx_field.as_deref() == Some(v.as_str()),
    }
}

/// A persisted anticipation row.
#[derive(Debug, Clone, FromRow)]
pub struct AnticipationRow {
    pub id: String,
    pub kind: String,
    pub description: String,
    pub context: String,
    pub trigger_json: String,
    pub companion_entities_json: String,
    pub wake_message: String,
    pub channel: String,
    pub cooldown_secs: i64,
    pub recurring: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AnticipationRow {
    pub fn trigger(&self) -> Trigger {
        serde_json::from_str(&self.trigger_json).unwrap_or_default()
    }

    pub fn companion_entities(&self) -> Vec<String> {
        serde_json::from_str(&self.companion_entities_json).unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }
}

/// A new anticipation to persist; `id` is assigned if absent.
#[derive(Debug, Clone)]
pub struct NewAnticipation {
    pub id: Option<String>,
    pub description: String,
    pub context: String,
    pub trigger: Trigger,
    pub companion_entities: Vec<String>,
    pub wake_message: String,
    pub channel: String,
    pub cooldown_secs: i64,
    pub recurring: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Store for anticipation records (spec §4.3 Store operations).
#[derive(Clone)]
pub struct AnticipationStore {
    pool: SqlitePool,
}

impl AnticipationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, a: NewAnticipation) -> Result<AnticipationRow> {
        let id = a.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let trigger_json = serde_json::to_string(&a.trigger)?;
        let companions_json = serde_json::to_string(&a.companion_entities)?;

        sqlx::query(
            r#"
            INSERT INTO anticipations
                (id, kind, condition_json, wake_message, channel, cooldown_secs, recurring, active)
            VALUES (?, 'trigger', ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&id)
        .bind(serde_json::json!({
            "description": a.description,
            "context": a.context,
            "trigger": trigger_json,
            "companion_entities": companions_json,
            "expires_at": a.expires_at,
        }).to_string())
        .bind(&a.wake_message)
        .bind(&a.channel)
        .bind(a.cooldown_secs)
        .bind(a.recurring)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| crate::error::Error::Internal("anticipation vanished after insert".into()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AnticipationRow>> {
        self.row_from_condition(id).await
    }

    /// Enumerate non-resolved, non-expired anticipations.
    pub async fn active(&self) -> Result<Vec<AnticipationRow>> {
        let rows = self.all_rows().await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter(|r| !r.resolved && !r.is_expired(now))
            .collect())
    }

    /// Every active record whose trigger matches the context.
    pub async fn matching(&self, ctx: &WakeContext) -> Result<Vec<AnticipationRow>> {
        let active = self.active().await?;
        Ok(active.into_iter().filter(|r| r.trigger().matches(ctx)).collect())
    }

    /// `now - last_fired_at < max(per-record cooldown, global_default)`.
    pub async fn on_cooldown(&self, id: &str, global_default_secs: i64) -> Result<bool> {
        let row = match self.get(id).await? {
            Some(r) => r,
            None => return Ok(false),
        };
        let Some(last_fired) = row.last_fired_at else {
            return Ok(false);
        };
        let window = row.cooldown_secs.max(global_default_secs);
        let elapsed = (Utc::now() - last_fired).num_seconds();
        Ok(elapsed < window)
    }

    pub async fn mark_fired(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE anticipations SET last_fired_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn resolve(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE anticipations SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM anticipations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all_rows(&self) -> Result<Vec<AnticipationRow>> {
        let raws: Vec<RawRow> = sqlx::query_as("SELECT * FROM anticipations").fetch_all(&self.pool).await?;
        Ok(raws.into_iter().map(Self::hydrate).collect())
    }

    async fn row_from_condition(&self, id: &str) -> Result<Option<AnticipationRow>> {
        let raw: Option<RawRow> = sqlx::query_as("SELECT * FROM anticipations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(raw.map(Self::hydrate))
    }

    fn hydrate(raw: RawRow) -> AnticipationRow {
        let condition: serde_json::Value =
            serde_json::from_str(&raw.condition_json).unwrap_or_else(|_| serde_json::json!({}));

        AnticipationRow {
            id: raw.id,
            kind: raw.kind,
            description: condition
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            context: condition
                .get("context")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            trigger_json: condition
                .get("trigger")
                .and_then(|v| v.as_str())
                .unwrap_or("{}")
                .to_string(),
            companion_entities_json: condition
                .get("companion_entities")
                .and_then(|v| v.as_str())
                .unwrap_or("[]")
                .to_string(),
            wake_message: raw.wake_message,
            channel: raw.channel,
            cooldown_secs: raw.cooldown_secs,
            recurring: raw.recurring,
            last_fired_at: raw.last_fired_at,
            resolved: !raw.active,
            expires_at: condition
                .get("expires_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            created_at: raw.created_at,
        }
    }
}

#[derive(FromRow)]
struct RawRow {
    id: String,
    kind: String,
    condition_json: String,
    wake_message: String,
    channel: String,
    cooldown_secs: i64,
    recurring: bool,
    last_fired_at: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::database::sqlite::{open_pool, run_migrations};

    async fn test_store() -> AnticipationStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ant.db");
        std::mem::forget(dir);
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        AnticipationStore::new(pool)
    }

    fn door_trigger() -> Trigger {
        Trigger {
            entity_id: Some("binary_sensor.front_door".into()),
            entity_state: Some("on".into()),
            event_type: Some("state_change".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_matching_returns_matching_trigger() {
        let store = test_store().await;
        store
            .create(NewAnticipation {
                id: Some("a1".into()),
                description: "door".into(),
                context: "Check who's home.".into(),
                trigger: door_trigger(),
                companion_entities: vec![],
                wake_message: "".into(),
                channel: "telegram".into(),
                cooldown_secs: 0,
                recurring: false,
                expires_at: None,
            })
            .await
            .unwrap();

        let ctx = WakeContext {
            time: Utc::now(),
            event_type: Some("state_change".into()),
            entity_id: Some("binary_sensor.front_door".into()),
            entity_state: Some("on".into()),
            zone: None,
            zone_action: None,
        };

        let matched = store.matching(&ctx).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a1");
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_fire() {
        let store = test_store().await;
        store
            .create(NewAnticipation {
                id: Some("a1".into()),
                description: "door".into(),
                context: "".into(),
                trigger: door_trigger(),
                companion_entities: vec![],
                wake_message: "".into(),
                channel: "telegram".into(),
                cooldown_secs: 3600,
                recurring: false,
                expires_at: None,
            })
            .await
            .unwrap();

        assert!(!store.on_cooldown("a1", 3600).await.unwrap());
        store.mark_fired("a1").await.unwrap();
        assert!(store.on_cooldown("a1", 3600).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_excludes_from_active() {
        let store = test_store().await;
        store
            .create(NewAnticipation {
                id: Some("a1".into()),
                description: "d".into(),
                context: "".into(),
                trigger: Trigger::default(),
                companion_entities: vec![],
                wake_message: "".into(),
                channel: "telegram".into(),
                cooldown_secs: 0,
                recurring: false,
                expires_at: None,
            })
            .await
            .unwrap();

        store.resolve("a1").await.unwrap();
        assert!(store.active().await.unwrap().is_empty());
        assert!(store.get("a1").await.unwrap().is_some());
    }
}
