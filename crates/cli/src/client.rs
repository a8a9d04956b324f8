// SPDX-License-Identifier: MIT

//! Thin `reqwest` wrapper over the daemon's HTTP/JSON API.
//! Every call does the minimum: build the request, attach the bearer
//! token, surface RFC7807 problem bodies as the error text.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

pub struct FlowdClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl FlowdClient {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self { base_url, token, http: Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut req = self.http.request(method, self.url(path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.with_context(|| format!("request to {} failed", path))?;
        self.decode(resp).await
    }

    async fn decode(&self, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let bytes = resp.bytes().await.context("reading response body")?;
        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).context("decoding response JSON");
        }
        let problem: Value =
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        let detail =
            problem.get("detail").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| problem.to_string());
        Err(anyhow!("{status}: {detail}"))
    }

    pub async fn healthz(&self) -> Result<Value> {
        self.request(Method::GET, "/healthz", None).await
    }

    pub async fn list_jobs(&self) -> Result<Value> {
        self.request(Method::GET, "/jobs", None).await
    }

    pub async fn create_plan(&self, body: &Value) -> Result<Value> {
        self.request(Method::POST, "/plans", Some(body)).await
    }

    pub async fn create_run(&self, body: &Value, idempotency_key: &str) -> Result<Value> {
        let mut req = self.http.post(self.url("/runs")).header("Idempotency-Key", idempotency_key).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.context("POST /runs failed")?;
        self.decode(resp).await
    }

    pub async fn list_runs(&self, status: Option<&str>, offset: usize, limit: usize) -> Result<Value> {
        let mut path = format!("/runs?offset={offset}&limit={limit}");
        if let Some(status) = status {
            path.push_str(&format!("&status={status}"));
        }
        self.request(Method::GET, &path, None).await
    }

    pub async fn get_run(&self, id: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/runs/{id}"), None).await
    }

    pub async fn cancel_run(&self, id: &str) -> Result<Value> {
        self.request(Method::POST, &format!("/runs/{id}:cancel"), None).await
    }

    pub async fn list_sources(&self) -> Result<Value> {
        self.request(Method::GET, "/sources", None).await
    }

    pub async fn get_source(&self, name: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/sources/{name}"), None).await
    }

    pub async fn register_source(&self, body: &Value) -> Result<Value> {
        self.request(Method::POST, "/sources", Some(body)).await
    }

    pub async fn remove_source(&self, name: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/sources/{name}"), None).await.map(|_| ())
    }

    pub async fn kv_get(&self, ns: &str, key: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/kv/{ns}/{key}"), None).await
    }

    pub async fn kv_put(&self, ns: &str, key: &str, value_b64: &str) -> Result<()> {
        let body = serde_json::json!({ "value": value_b64 });
        self.request(Method::PUT, &format!("/kv/{ns}/{key}"), Some(&body)).await.map(|_| ())
    }

    pub async fn kv_delete(&self, ns: &str, key: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/kv/{ns}/{key}"), None).await.map(|_| ())
    }

    pub async fn kv_scan(&self, ns: &str, prefix: Option<&str>, cursor: Option<&str>, limit: usize) -> Result<Value> {
        let mut path = format!("/kv/{ns}?limit={limit}");
        if let Some(prefix) = prefix {
            path.push_str(&format!("&prefix={prefix}"));
        }
        if let Some(cursor) = cursor {
            path.push_str(&format!("&cursor={cursor}"));
        }
        self.request(Method::GET, &path, None).await
    }

    /// Stream raw SSE bytes for `GET /events` or `GET /runs/{id}/events`,
    /// writing each decoded chunk to stdout as it arrives. Used by
    /// `flowd events tail`.
    pub async fn stream_events(&self, path: &str) -> Result<()> {
        use futures_util::StreamExt;

        let mut req = self.http.get(self.url(path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.with_context(|| format!("GET {path} failed"))?;
        if resp.status() != StatusCode::OK {
            return Err(anyhow!("{}: failed to open event stream", resp.status()));
        }
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("reading event stream")?;
            print!("{}", String::from_utf8_lossy(&chunk));
        }
        Ok(())
    }
}

pub fn encode_args(pairs: &[(String, String)]) -> Value {
    let mut map = serde_json::Map::new();
    for (k, v) in pairs {
        let value = serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.clone()));
        map.insert(k.clone(), value);
    }
    Value::Object(map)
}
