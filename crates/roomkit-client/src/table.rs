//! Table client
//!
//! Row access through the REST interface the backing service exposes for
//! every table (`/rest/v1/<table>`). Filters are equality matches; row level
//! security decides what the caller may see, so requests carry the user
//! token when signed in and the anon key otherwise.

use std::fmt::Display;

use reqwest::header::HeaderValue;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::client::Shared;
use crate::error::{ClientError, ClientResult};

/// Page size used when an offset is given without a limit
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Table holding application profiles, keyed by auth user id
pub const PROFILE_TABLE: &str = "user_profile";

const RETURN_ROWS: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

/// Which rows, which columns, and in what order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    columns: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<(String, bool)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comma-separated column list; all columns when unset
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Keep rows where `column` equals `value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Display) -> Self {
        self.filters.push((column.into(), format!("eq.{value}")));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Query-string pairs for a read
    fn select_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.selected_columns())];
        params.extend(self.filters.iter().cloned());
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{column}.{direction}")));
        }
        let limit = self
            .limit
            .or_else(|| self.offset.map(|_| DEFAULT_PAGE_SIZE));
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Query-string pairs for a write: filters plus the returned columns
    fn write_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.selected_columns())];
        params.extend(self.filters.iter().cloned());
        params
    }

    fn selected_columns(&self) -> String {
        self.columns.clone().unwrap_or_else(|| "*".to_string())
    }
}

/// Error body the REST interface answers with
#[derive(Debug, Deserialize)]
struct RestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TableClient {
    shared: Shared,
}

impl TableClient {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Rows of `table` matching `query`
    #[instrument(skip(self, query))]
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> ClientResult<Vec<T>> {
        let request = self
            .shared
            .http
            .get(self.table_url(table))
            .query(&query.select_params());
        let rows = self.rows(request).await?;
        debug!(table = %table, count = rows.len(), "Rows selected");
        Ok(rows)
    }

    /// Insert one row (an object) or several (an array); returns the stored rows
    #[instrument(skip(self, rows))]
    pub async fn insert<T, B>(&self, table: &str, rows: &B) -> ClientResult<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self
            .shared
            .http
            .post(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", HeaderValue::from_static(RETURN_ROWS))
            .json(rows);
        let stored: Vec<T> = self.rows(request).await?;
        debug!(table = %table, count = stored.len(), "Rows inserted");
        Ok(stored)
    }

    /// Set `values` on the rows matching `query`; returns the updated rows.
    /// Refuses to run without a filter.
    #[instrument(skip(self, values, query))]
    pub async fn update<T, B>(&self, table: &str, values: &B, query: &Query) -> ClientResult<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        require_filter("update", query)?;
        let request = self
            .shared
            .http
            .patch(self.table_url(table))
            .query(&query.write_params())
            .header("Prefer", HeaderValue::from_static(RETURN_ROWS))
            .json(values);
        let updated: Vec<T> = self.rows(request).await?;
        debug!(table = %table, count = updated.len(), "Rows updated");
        Ok(updated)
    }

    /// Delete the rows matching `query`. Refuses to run without a filter.
    #[instrument(skip(self, query))]
    pub async fn delete(&self, table: &str, query: &Query) -> ClientResult<()> {
        require_filter("delete", query)?;
        let request = self
            .shared
            .http
            .delete(self.table_url(table))
            .query(&query.filters);
        self.send(request).await?;
        debug!(table = %table, "Rows deleted");
        Ok(())
    }

    /// Insert, or merge into existing rows on conflict. `on_conflict` names
    /// the unique column(s) to match on; the primary key otherwise.
    #[instrument(skip(self, rows))]
    pub async fn upsert<T, B>(&self, table: &str, rows: &B, on_conflict: Option<&str>) -> ClientResult<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .shared
            .http
            .post(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", HeaderValue::from_static(MERGE_DUPLICATES));
        if let Some(columns) = on_conflict {
            request = request.query(&[("on_conflict", columns)]);
        }
        let stored: Vec<T> = self.rows(request.json(rows)).await?;
        debug!(table = %table, count = stored.len(), "Rows upserted");
        Ok(stored)
    }

    /// Whether `user_id` has a profile row
    pub async fn user_exists(&self, user_id: &str) -> ClientResult<bool> {
        let query = Query::new().columns("id").eq("id", user_id).limit(1);
        let rows: Vec<Value> = self.select(PROFILE_TABLE, &query).await?;
        Ok(!rows.is_empty())
    }

    fn table_url(&self, table: &str) -> Url {
        self.shared.endpoint(["rest", "v1", table])
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<Vec<T>> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let request = self
            .shared
            .with_api_key(request)
            .bearer_auth(self.shared.bearer());
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let (code, message) = match response.json::<RestError>().await {
            Ok(body) => (
                body.code,
                body.message
                    .or(body.details)
                    .unwrap_or_else(|| status.to_string()),
            ),
            Err(_) => (None, status.to_string()),
        };
        Err(ClientError::Table {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

fn require_filter(operation: &str, query: &Query) -> ClientResult<()> {
    if query.has_filters() {
        Ok(())
    } else {
        Err(ClientError::InvalidRequest(format!(
            "{operation} needs at least one filter"
        )))
    }
}
