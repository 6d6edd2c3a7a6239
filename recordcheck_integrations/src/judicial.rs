//! Public judicial-records search.
//!
//! One POST per page against the case-search endpoint. The classification of
//! pages into results / no results / API error lives in
//! `recordcheck_core::PaginatedLookup`; this module only fetches and parses.

use async_trait::async_trait;
use recordcheck_core::config::LookupConfig;
use recordcheck_core::{CaseRecord, Error, PageFetcher, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;

const SEARCH_PATH: &str = "api/consulta-causas/informacion/buscarCausas";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Clone)]
pub struct JudicialCaseFetcher {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl JudicialCaseFetcher {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        if config.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::backend_reqwest)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    pub fn search_url(&self, page: u32) -> String {
        format!(
            "{}/{SEARCH_PATH}?page={page}&size={}",
            self.base_url, self.page_size
        )
    }

    fn payload(&self, name: &str, page: u32) -> Value {
        serde_json::json!({
            "numeroCausa": "",
            "actor": { "cedulaActor": "", "nombreActor": "" },
            "demandado": { "cedulaDemandado": "", "nombreDemandado": name },
            "provincia": "",
            "numeroFiscalia": "",
            "recaptcha": "",
            "first": page,
            "pageSize": self.page_size,
        })
    }
}

#[async_trait]
impl PageFetcher for JudicialCaseFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, name: &str, page: u32) -> Result<Vec<CaseRecord>> {
        let resp = self
            .client
            .post(self.search_url(page))
            .json(&self.payload(name, page))
            .send()
            .await
            .map_err(|e| Error::Upstream {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(page, status = status.as_u16(), "case search returned an error status");
            return Err(Error::Upstream {
                status: Some(status.as_u16()),
                message: body.chars().take(500).collect(),
            });
        }

        let body: Value = resp.json().await.map_err(|e| Error::Upstream {
            status: Some(status.as_u16()),
            message: format!("malformed body: {e}"),
        })?;
        let items = parse_cases(body)?;
        tracing::debug!(page, items = items.len(), "case search page fetched");
        Ok(items)
    }
}

/// Accepts a bare list or an object carrying a `data` list (missing or null `data` is empty).
pub fn parse_cases(body: Value) -> Result<Vec<CaseRecord>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::Upstream {
                    status: None,
                    message: format!("unexpected `data` type: {}", type_name(&other)),
                });
            }
        },
        other => {
            return Err(Error::Upstream {
                status: None,
                message: format!("unexpected body type: {}", type_name(&other)),
            });
        }
    };
    Ok(items.into_iter().map(case_from_json).collect())
}

fn case_from_json(raw: Value) -> CaseRecord {
    CaseRecord {
        case_id: text_field(&raw, "idJuicio").unwrap_or_default(),
        filed_at: text_field(&raw, "fechaIngreso"),
        offense: text_field(&raw, "nombreDelito"),
        raw,
    }
}

fn text_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_list_and_data_envelope() {
        let list = parse_cases(json!([{ "idJuicio": "17282-2024-00123", "nombreDelito": "ROBO" }]))
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].case_id, "17282-2024-00123");
        assert_eq!(list[0].offense.as_deref(), Some("ROBO"));
        assert_eq!(list[0].filed_at, None);

        let wrapped = parse_cases(json!({ "data": [{ "idJuicio": 42 }], "total": 1 })).unwrap();
        assert_eq!(wrapped[0].case_id, "42");

        assert!(parse_cases(json!({ "total": 0 })).unwrap().is_empty());
        assert!(parse_cases(json!({ "data": null })).unwrap().is_empty());
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(parse_cases(json!("maintenance")).is_err());
        assert!(parse_cases(json!({ "data": "none" })).is_err());
    }

    #[test]
    fn search_url_carries_page_and_size() {
        let fetcher = JudicialCaseFetcher::new(&LookupConfig {
            base_url: "http://localhost:8080/svc/".to_string(),
            ..LookupConfig::default()
        })
        .unwrap();
        assert_eq!(
            fetcher.search_url(3),
            "http://localhost:8080/svc/api/consulta-causas/informacion/buscarCausas?page=3&size=10"
        );
    }
}
