//! Row-insert subscriptions
//!
//! Joins a `postgres_changes` channel for `INSERT` on `public.<table>` and
//! yields each inserted row. Dropping the subscription leaves the channel.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::{events, topic_for, PhoenixMessage};
use crate::socket::RealtimeSocket;

/// Stream of rows inserted into one table
pub struct InsertSubscription {
    table: String,
    topic: String,
    socket: RealtimeSocket,
    frames: mpsc::UnboundedReceiver<PhoenixMessage>,
    join_ref: String,
    join_timeout: Duration,
    /// Rows that arrived while waiting for the join reply
    pending: VecDeque<Value>,
    joined: bool,
    ended: bool,
    closed: bool,
}

enum Step {
    Row(Value),
    Joined,
    Refused(String),
    Ended,
    Skip,
}

impl InsertSubscription {
    /// Subscribe to inserts on `public.<table>`, optionally filtered (e.g. `id=eq.<task>`)
    pub fn open(
        socket: &RealtimeSocket,
        config: &RealtimeConfig,
        table: &str,
        filter: Option<&str>,
    ) -> RealtimeResult<Self> {
        let join_ref = socket.next_ref();
        let topic = topic_for(&format!("db-{table}-{join_ref}"));
        let frames = socket.register(&topic)?;

        let mut change = json!({ "event": "INSERT", "schema": "public", "table": table });
        if let Some(filter) = filter {
            change["filter"] = Value::from(filter);
        }
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": "" },
                "postgres_changes": [change]
            }
        });
        if let Some(token) = &config.access_token {
            payload["access_token"] = Value::from(token.as_str());
        }

        if let Err(e) = socket.push(&PhoenixMessage::join(&topic, payload, join_ref.clone())) {
            socket.unregister(&topic);
            return Err(e);
        }

        info!(table = %table, filter = filter.unwrap_or_default(), "Subscribed to inserts");

        Ok(Self {
            table: table.to_string(),
            topic,
            socket: socket.clone(),
            frames,
            join_ref,
            join_timeout: config.join_timeout,
            pending: VecDeque::new(),
            joined: false,
            ended: false,
            closed: false,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Wait for the server to acknowledge the join, at most the configured
    /// join timeout.
    ///
    /// Returns `Ok(false)` when no reply came in time; the subscription stays
    /// usable and a late acknowledgment is still accepted by [`Self::next_row`].
    ///
    /// # Errors
    /// `JoinRefused` when the server rejects the join or ends the channel,
    /// `SocketClosed` when the socket goes away first.
    pub async fn wait_joined(&mut self) -> RealtimeResult<bool> {
        if self.joined {
            return Ok(true);
        }
        if self.ended {
            return Err(RealtimeError::JoinRefused("subscription ended".to_string()));
        }

        let deadline = tokio::time::sleep(self.join_timeout);
        tokio::pin!(deadline);

        loop {
            let frame = tokio::select! {
                frame = self.frames.recv() => frame,
                () = &mut deadline => {
                    warn!(table = %self.table, timeout = ?self.join_timeout, "No join acknowledgment for insert subscription");
                    return Ok(false);
                }
            };
            let Some(frame) = frame else {
                self.ended = true;
                return Err(RealtimeError::SocketClosed);
            };

            match self.step(&frame) {
                Step::Row(row) => self.pending.push_back(row),
                Step::Joined => return Ok(true),
                Step::Refused(reason) => return Err(RealtimeError::JoinRefused(reason)),
                Step::Ended => {
                    return Err(RealtimeError::JoinRefused("channel closed by server".to_string()))
                }
                Step::Skip => {}
            }
        }
    }

    /// Next inserted row. `None` once the channel ends or the join is refused.
    pub async fn next_row(&mut self) -> Option<Value> {
        if let Some(row) = self.pending.pop_front() {
            return Some(row);
        }
        if self.ended {
            return None;
        }

        loop {
            let frame = self.frames.recv().await?;
            match self.step(&frame) {
                Step::Row(row) => return Some(row),
                Step::Refused(_) | Step::Ended => return None,
                Step::Joined | Step::Skip => {}
            }
        }
    }

    fn step(&mut self, frame: &PhoenixMessage) -> Step {
        match frame.event.as_str() {
            events::POSTGRES_CHANGES => {
                if let Some(row) = inserted_row(&frame.payload) {
                    return Step::Row(row);
                }
                trace!(%frame, "Ignoring non-insert change");
            }
            events::REPLY if frame.is_reply_to(&self.join_ref) => {
                if frame.reply_status() != Some("ok") {
                    warn!(table = %self.table, reason = frame.reply_reason(), "Insert subscription refused");
                    self.ended = true;
                    return Step::Refused(frame.reply_reason().to_string());
                }
                debug!(table = %self.table, "Insert subscription active");
                self.joined = true;
                return Step::Joined;
            }
            events::CLOSE | events::ERROR => {
                warn!(table = %self.table, event = %frame.event, "Insert subscription ended by server");
                self.ended = true;
                return Step::Ended;
            }
            _ => trace!(%frame, "Unhandled frame"),
        }
        Step::Skip
    }

    /// Leave the channel. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self
            .socket
            .push(&PhoenixMessage::leave(&self.topic, self.socket.next_ref()))
        {
            debug!(error = %e, "Leave not sent");
        }
        self.socket.unregister(&self.topic);
        self.frames.close();
        debug!(table = %self.table, "Insert subscription closed");
    }
}

impl Drop for InsertSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InsertSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertSubscription")
            .field("table", &self.table)
            .field("topic", &self.topic)
            .field("joined", &self.joined)
            .finish_non_exhaustive()
    }
}

/// `payload.data.record` of an INSERT change
fn inserted_row(payload: &Value) -> Option<Value> {
    let data = payload.get("data")?;
    if data.get("type").and_then(Value::as_str) != Some("INSERT") {
        return None;
    }
    data.get("record").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServer;

    #[tokio::test]
    async fn test_join_payload() {
        let (client, mut server) = MockServer::client();
        let _sub = client.subscribe_inserts("llm_result", Some("id=eq.t-1")).unwrap();

        let join = server.expect_event("phx_join").await;
        let change = &join.payload["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["schema"], "public");
        assert_eq!(change["table"], "llm_result");
        assert_eq!(change["filter"], "id=eq.t-1");
    }

    #[tokio::test]
    async fn test_yields_inserted_rows() {
        let (client, mut server) = MockServer::client();
        let mut sub = client.subscribe_inserts("llm_result", None).unwrap();
        let join = server.expect_event("phx_join").await;
        server.reply_ok(&join);

        server.send(
            sub.topic(),
            "postgres_changes",
            json!({ "data": { "type": "UPDATE", "record": { "id": "x" } } }),
            None,
        );
        server.insert_row(sub.topic(), "llm_result", json!({ "id": "t-1" }));

        let row = sub.next_row().await.unwrap();
        assert_eq!(row["id"], "t-1");
    }

    #[tokio::test]
    async fn test_refused_join_ends_stream() {
        let (client, mut server) = MockServer::client();
        let mut sub = client.subscribe_inserts("llm_result", None).unwrap();
        let join = server.expect_event("phx_join").await;

        server.reply_error(&join, "table not in publication");

        assert!(sub.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_joined_keeps_early_rows() {
        let (client, mut server) = MockServer::client();
        let mut sub = client.subscribe_inserts("llm_result", None).unwrap();
        let join = server.expect_event("phx_join").await;

        server.insert_row(sub.topic(), "llm_result", json!({ "id": "early" }));
        server.reply_ok(&join);

        assert!(sub.wait_joined().await.unwrap());
        assert!(sub.is_joined());
        assert_eq!(sub.next_row().await.unwrap()["id"], "early");
    }

    #[tokio::test]
    async fn test_wait_joined_refused() {
        let (client, mut server) = MockServer::client();
        let mut sub = client.subscribe_inserts("llm_result", None).unwrap();
        let join = server.expect_event("phx_join").await;

        server.reply_error(&join, "table not in publication");

        match sub.wait_joined().await {
            Err(RealtimeError::JoinRefused(reason)) => assert_eq!(reason, "table not in publication"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(sub.next_row().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_joined_gives_up_after_timeout() {
        let (client, mut server) = MockServer::client();
        let mut sub = client.subscribe_inserts("llm_result", None).unwrap();
        let join = server.expect_event("phx_join").await;

        let started = tokio::time::Instant::now();
        assert!(!sub.wait_joined().await.unwrap());
        assert_eq!(started.elapsed(), client.config().join_timeout);

        // A late ack still lets rows through
        server.reply_ok(&join);
        server.insert_row(sub.topic(), "llm_result", json!({ "id": "t-1" }));
        assert_eq!(sub.next_row().await.unwrap()["id"], "t-1");
        assert!(sub.is_joined());
    }

    #[tokio::test]
    async fn test_drop_leaves_channel() {
        let (client, mut server) = MockServer::client();
        let sub = client.subscribe_inserts("llm_result", None).unwrap();
        let topic = sub.topic().to_string();
        server.expect_event("phx_join").await;

        drop(sub);

        let leave = server.expect_event("phx_leave").await;
        assert_eq!(leave.topic, topic);
        assert!(!client.socket().is_registered(&topic));
    }

    #[tokio::test]
    async fn test_subscriptions_get_distinct_topics() {
        let (client, _server) = MockServer::client();
        let a = client.subscribe_inserts("llm_result", None).unwrap();
        let b = client.subscribe_inserts("llm_result", None).unwrap();

        assert_ne!(a.topic(), b.topic());
    }
}
