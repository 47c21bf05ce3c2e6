// src/sheet/google.rs
//! Google Sheets API v4 adapter for `TabularSource`.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};

use super::{Row, TabularSource};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
/// Refresh this long before Google says the token expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Pre-issued bearer token (e.g. `GOOGLE_ACCESS_TOKEN`).
    Static(String),
    /// GCE/Cloud Run metadata server for the attached service account.
    Metadata,
}

struct AccessTokens {
    source: TokenSource,
    http: Client,
    cached: Mutex<Option<(String, Instant)>>,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl AccessTokens {
    async fn bearer(&self) -> Result<String> {
        let url = match &self.source {
            TokenSource::Static(t) => return Ok(t.clone()),
            TokenSource::Metadata => METADATA_TOKEN_URL,
        };

        let mut cached = self.cached.lock().await;
        if let Some((token, valid_until)) = cached.as_ref() {
            if Instant::now() < *valid_until {
                return Ok(token.clone());
            }
        }

        let tok: MetadataToken = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata token request")?
            .error_for_status()
            .context("metadata token non-2xx")?
            .json()
            .await
            .context("parse metadata token")?;

        let ttl = Duration::from_secs(tok.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some((tok.access_token.clone(), Instant::now() + ttl));
        tracing::debug!(target: "sheets", ttl_secs = ttl.as_secs(), "refreshed access token");
        Ok(tok.access_token)
    }
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    spreadsheet_id: String,
    tokens: Arc<AccessTokens>,
    timeout: Duration,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token_source: TokenSource) -> Self {
        let http = Client::new();
        Self {
            tokens: Arc::new(AccessTokens {
                source: token_source,
                http: http.clone(),
                cached: Mutex::new(None),
            }),
            http,
            spreadsheet_id: spreadsheet_id.into(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn worksheet(&self, title: impl Into<String>) -> Worksheet {
        Worksheet {
            client: self.clone(),
            title: title.into(),
            sheet_id: OnceCell::new(),
        }
    }

    /// `{base}/{spreadsheet_id}{suffix}/{extra...}` with each segment encoded.
    fn url(&self, suffix: &str, extra: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_BASE).context("sheets base url")?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| anyhow!("sheets base url cannot be a base"))?;
            segs.push(&format!("{}{}", self.spreadsheet_id, suffix));
            for e in extra {
                segs.push(e);
            }
        }
        Ok(url)
    }

    async fn authed(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.tokens.bearer().await?;
        let resp = req
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .context("sheets request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sheets HTTP {status}: {body}"));
        }
        Ok(resp)
    }
}

/// One named tab of the spreadsheet.
pub struct Worksheet {
    client: SheetsClient,
    title: String,
    sheet_id: OnceCell<i64>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

fn cell_to_string(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Worksheet {
    fn a1(&self, cells: Option<&str>) -> String {
        let quoted = format!("'{}'", self.title.replace('\'', "''"));
        match cells {
            Some(c) => format!("{quoted}!{c}"),
            None => quoted,
        }
    }

    /// Numeric sheet id, needed by `batchUpdate`; looked up once.
    async fn sheet_id(&self) -> Result<i64> {
        self.sheet_id
            .get_or_try_init(|| async {
                let mut url = self.client.url("", &[])?;
                url.query_pairs_mut()
                    .append_pair("fields", "sheets.properties(sheetId,title)");
                let meta: SpreadsheetMeta = self
                    .client
                    .authed(self.client.http.get(url))
                    .await?
                    .json()
                    .await
                    .context("parse spreadsheet metadata")?;
                meta.sheets
                    .into_iter()
                    .find(|s| s.properties.title == self.title)
                    .map(|s| s.properties.sheet_id)
                    .ok_or_else(|| anyhow!("worksheet {:?} not found", self.title))
            })
            .await
            .copied()
    }
}

#[async_trait::async_trait]
impl TabularSource for Worksheet {
    async fn read_rows(&self) -> Result<Vec<Row>> {
        let range = self.a1(None);
        let mut url = self.client.url("", &["values", range.as_str()])?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let vr: ValueRange = self
            .client
            .authed(self.client.http.get(url))
            .await
            .with_context(|| format!("read worksheet {}", self.title))?
            .json()
            .await
            .context("parse values response")?;
        Ok(vr
            .values
            .into_iter()
            .map(|r| r.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(&self, row: Row) -> Result<()> {
        let range = format!("{}:append", self.a1(None));
        let mut url = self.client.url("", &["values", range.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        self.client
            .authed(self.client.http.post(url).json(&json!({ "values": [row] })))
            .await
            .with_context(|| format!("append to {}", self.title))?;
        Ok(())
    }

    async fn update_row(&self, index: usize, row: Row) -> Result<()> {
        let a1 = self.a1(Some(&format!("A{}", index + 1)));
        let mut url = self.client.url("", &["values", a1.as_str()])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.client
            .authed(self.client.http.put(url).json(&json!({ "values": [row] })))
            .await
            .with_context(|| format!("update row {index} of {}", self.title))?;
        Ok(())
    }

    async fn delete_row(&self, index: usize) -> Result<()> {
        let sheet_id = self.sheet_id().await?;
        let url = self.client.url(":batchUpdate", &[])?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": index,
                        "endIndex": index + 1,
                    }
                }
            }]
        });
        self.client
            .authed(self.client.http.post(url).json(&body))
            .await
            .with_context(|| format!("delete row {index} of {}", self.title))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_encode_ranges_per_segment() {
        let c = SheetsClient::new("abc", TokenSource::Static("t".into()));
        let ws = c.worksheet("My Tab");
        let range = ws.a1(Some("A3"));
        let url = c.url("", &["values", range.as_str()]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Tab'!A3"
        );
        let url = c.url(":batchUpdate", &[]).unwrap();
        assert!(url.as_str().ends_with("/spreadsheets/abc:batchUpdate"));
    }

    #[test]
    fn cells_become_trimmed_strings() {
        assert_eq!(cell_to_string(json!("  BMW ")), "BMW");
        assert_eq!(cell_to_string(json!(3)), "3");
        assert_eq!(cell_to_string(serde_json::Value::Null), "");
    }
}
