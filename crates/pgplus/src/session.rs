//! Web session persistence on top of [`Pg`].
//!
//! Expects a table shaped like:
//!
//! ```sql
//! CREATE TABLE session (
//!     sid    text PRIMARY KEY,
//!     sess   jsonb NOT NULL,
//!     expire timestamptz NOT NULL
//! );
//! ```

use crate::driver::Driver;
use crate::error::{PgError, PgResult};
use crate::pg::Pg;
use crate::sql::{self, Fragment};
use crate::value::Value;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Default session lifetime.
pub const DEFAULT_TTL_DAYS: i64 = 14;

/// get / set / touch / destroy for session rows keyed by `sid`.
pub struct SessionStore<D> {
    pg: Arc<Pg<D>>,
    table: String,
    ttl: Duration,
}

impl<D: Driver> SessionStore<D> {
    /// Store backed by the `session` table with a 14-day TTL.
    pub fn new(pg: Arc<Pg<D>>) -> Self {
        Self {
            pg,
            table: "session".to_string(),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn table_id(&self) -> Fragment {
        sql::id(self.table.as_str())
    }

    /// The stored session, unless missing or expired.
    pub async fn get(&self, sid: &str) -> PgResult<Option<serde_json::Value>> {
        let row = self
            .pg
            .maybe_one(crate::sql!(
                "SELECT sid, sess::text AS sess, expire FROM {} WHERE sid = {} AND expire > now()",
                self.table_id(),
                sid
            ))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        match row.get("sess") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(raw)) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| PgError::Serialization(e.to_string())),
            Some(other) => Ok(Some(other.to_json())),
        }
    }

    /// Insert or replace a session. Without `expires_at` it expires one TTL
    /// from now.
    pub async fn set(
        &self,
        sid: &str,
        session: &serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> PgResult<()> {
        let expire = expires_at.unwrap_or_else(|| Utc::now() + self.ttl);
        self.pg
            .query(crate::sql!(
                "
                INSERT INTO {} (sid, sess, expire)
                VALUES ({}, {}, {})
                ON CONFLICT (sid) DO UPDATE SET
                sess = EXCLUDED.sess,
                expire = EXCLUDED.expire
                ",
                self.table_id(),
                sid,
                session.clone(),
                expire
            ))
            .await?;
        Ok(())
    }

    /// Push the expiry one TTL into the future.
    pub async fn touch(&self, sid: &str) -> PgResult<()> {
        self.pg
            .query(crate::sql!(
                "UPDATE {} SET expire = {} WHERE sid = {}",
                self.table_id(),
                Utc::now() + self.ttl,
                sid
            ))
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, sid: &str) -> PgResult<()> {
        self.pg
            .query(crate::sql!(
                "DELETE FROM {} WHERE sid = {}",
                self.table_id(),
                sid
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::record;
    use serde_json::json;

    fn store() -> (SessionStore<MockDriver>, MockDriver) {
        let mock = MockDriver::new();
        let store = SessionStore::new(Arc::new(Pg::new(mock.clone())));
        (store, mock)
    }

    #[tokio::test]
    async fn get_reads_json_or_text_sessions() {
        let (store, mock) = store();

        mock.push_rows(vec![record! {
            "sid" => "abc",
            "sess" => json!({ "user": { "id": 1 } }),
        }]);
        let sess = store.get("abc").await.unwrap();
        assert_eq!(sess, Some(json!({ "user": { "id": 1 } })));

        mock.push_rows(vec![record! { "sid" => "abc", "sess" => r#"{"n":2}"# }]);
        assert_eq!(store.get("abc").await.unwrap(), Some(json!({ "n": 2 })));

        assert_eq!(store.get("missing").await.unwrap(), None);

        let call = &mock.calls()[0];
        assert_eq!(
            call.text,
            r#"SELECT sid, sess::text AS sess, expire FROM "session" WHERE sid = $1 AND expire > now()"#
        );
        assert_eq!(call.params, vec![Value::Text("abc".into())]);
    }

    #[tokio::test]
    async fn set_upserts() {
        let (store, mock) = store();
        let expires = Utc::now();

        store
            .set("abc", &json!({ "cart": [1, 2] }), Some(expires))
            .await
            .unwrap();

        let call = &mock.calls()[0];
        assert_eq!(
            call.text,
            "INSERT INTO \"session\" (sid, sess, expire)\nVALUES ($1, $2, $3)\nON CONFLICT (sid) DO UPDATE SET\nsess = EXCLUDED.sess,\nexpire = EXCLUDED.expire"
        );
        assert_eq!(call.params[0], Value::Text("abc".into()));
        assert_eq!(call.params[1].to_json(), json!({ "cart": [1, 2] }));
        assert_eq!(call.params[2], Value::Timestamp(expires));
    }

    #[cfg(feature = "tracing")]
    #[tokio::test]
    async fn default_table_statements_are_kept_out_of_tracing() {
        let (store, mock) = store();
        store.get("abc").await.unwrap();
        store.set("abc", &json!({}), None).await.unwrap();
        store.touch("abc").await.unwrap();
        store.destroy("abc").await.unwrap();

        let hook = crate::TracingHook::new();
        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        for call in &calls {
            assert!(hook.is_excluded(&call.text), "logged: {}", call.text);
        }
    }

    #[tokio::test]
    async fn touch_extends_by_ttl_and_destroy_deletes() {
        let (store, mock) = store();
        let store = store.table("web_sessions").ttl(Duration::hours(1));

        let before = Utc::now();
        store.touch("abc").await.unwrap();
        store.destroy("abc").await.unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls[0].text,
            r#"UPDATE "web_sessions" SET expire = $1 WHERE sid = $2"#
        );
        match &calls[0].params[0] {
            Value::Timestamp(ts) => assert!(*ts >= before + Duration::hours(1)),
            other => panic!("expected a timestamp, got {other:?}"),
        }
        assert_eq!(calls[1].text, r#"DELETE FROM "web_sessions" WHERE sid = $1"#);
    }
}
