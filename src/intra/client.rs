//! Async HTTP client for the 42 intranet API.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, info};

use super::{IntraError, IntraResult};
use crate::models::EvaluationRecord;

/// Project name used when a scale team carries none.
const UNKNOWN_PROJECT: &str = "unknown";

/// Client credentials for the OAuth client-credentials grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub uid: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(uid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            secret: secret.into(),
        }
    }

    /// Read credentials from `UID` and `SECRET`.
    pub fn from_env() -> IntraResult<Self> {
        let uid = env::var("UID").map_err(|_| IntraError::MissingCredentials("UID"))?;
        let secret = env::var("SECRET").map_err(|_| IntraError::MissingCredentials("SECRET"))?;
        Ok(Self::new(uid, secret))
    }
}

/// Connection settings for [`IntraClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.intra.42.fr`.
    pub api_url: String,
    /// Cursus whose level is used.
    pub cursus_id: i64,
    /// Items per page when paginating.
    pub page_size: usize,
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.intra.42.fr".to_string(),
            cursus_id: 21,
            page_size: 100,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated intranet client.
pub struct IntraClient {
    config: ClientConfig,
    http_client: reqwest::Client,
    token: String,
}

impl IntraClient {
    /// Build a client and acquire an access token.
    pub async fn connect(config: ClientConfig, credentials: &Credentials) -> IntraResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let token = fetch_token(&http_client, &config.api_url, credentials).await?;
        info!("Acquired API token from {}", config.api_url);

        Ok(Self {
            config,
            http_client,
            token,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Level of `login` in the configured cursus, `None` if not enrolled.
    pub async fn user_level(&self, login: &str) -> IntraResult<Option<f64>> {
        let url = format!("{}/v2/users/{}", self.config.api_url, login);
        let user = self.get_json(&url, &[]).await?;
        Ok(parse_user_level(&user, self.config.cursus_id))
    }

    /// Every evaluation `login` gave as corrector, one record per corrected
    /// user.
    pub async fn given_evaluations(&self, login: &str) -> IntraResult<Vec<EvaluationRecord>> {
        let url = format!(
            "{}/v2/users/{}/scale_teams/as_corrector",
            self.config.api_url, login
        );
        let teams = self.get_pages(&url, login).await?;

        Ok(teams
            .iter()
            .flat_map(|team| parse_scale_team(team, login))
            .collect())
    }

    /// Every evaluation `login` received, one record per evaluation.
    ///
    /// Records of teammates evaluated alongside `login` and evaluations with
    /// a hidden corrector are left out.
    pub async fn received_evaluations(&self, login: &str) -> IntraResult<Vec<EvaluationRecord>> {
        let url = format!(
            "{}/v2/users/{}/scale_teams/as_corrected",
            self.config.api_url, login
        );
        let teams = self.get_pages(&url, login).await?;

        Ok(teams
            .iter()
            .flat_map(|team| parse_scale_team(team, ""))
            .filter(|record| record.evaluated == login && !record.evaluator.is_empty())
            .collect())
    }

    /// Logins of the active users of a campus created after `created_after`.
    pub async fn campus_logins(
        &self,
        campus_id: u64,
        created_after: DateTime<Utc>,
    ) -> IntraResult<Vec<String>> {
        let url = format!("{}/v2/campus/{}/users", self.config.api_url, campus_id);
        let label = format!("campus {}", campus_id);
        let users = self.get_pages(&url, &label).await?;

        Ok(users
            .iter()
            .filter_map(|user| parse_campus_login(user, created_after))
            .collect())
    }

    /// Fetch every page of a list endpoint, stopping at the first empty one.
    async fn get_pages(&self, url: &str, label: &str) -> IntraResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let query = [
                ("page[size]", self.config.page_size.to_string()),
                ("page[number]", page.to_string()),
            ];
            let body = self.get_json(url, &query).await?;
            let batch = match body {
                Value::Array(batch) => batch,
                _ => return Err(IntraError::ParseError("expected a JSON array".to_string())),
            };

            if batch.is_empty() {
                break;
            }

            debug!("{}: page {} with {} items", label, page, batch.len());
            items.extend(batch);
            page += 1;
        }

        Ok(items)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> IntraResult<Value> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IntraError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| IntraError::ParseError(e.to_string()))
    }
}

async fn fetch_token(
    http_client: &reqwest::Client,
    api_url: &str,
    credentials: &Credentials,
) -> IntraResult<String> {
    let url = format!("{}/oauth/token", api_url);
    let response = http_client
        .post(&url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.uid.as_str()),
            ("client_secret", credentials.secret.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        let message = response.text().await.unwrap_or_default();
        return Err(IntraError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| IntraError::ParseError(e.to_string()))?;
    Ok(token.access_token)
}

/// Extract the level of the given cursus from a `/v2/users/:login` body.
pub fn parse_user_level(user: &Value, cursus_id: i64) -> Option<f64> {
    user["cursus_users"]
        .as_array()?
        .iter()
        .find(|cursus| cursus["cursus_id"].as_i64() == Some(cursus_id))?["level"]
        .as_f64()
}

/// Turn one scale team into records, one per corrected user.
///
/// `fallback_evaluator` is used when the corrector is hidden or missing.
pub fn parse_scale_team(team: &Value, fallback_evaluator: &str) -> Vec<EvaluationRecord> {
    let evaluator = team["corrector"]["login"]
        .as_str()
        .unwrap_or(fallback_evaluator)
        .to_string();
    let final_mark = team["final_mark"].as_i64();
    let cursus_id = team["cursus_id"].as_i64();
    let created_at = team["created_at"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let project = project_name(&team["team"]);

    team["correcteds"]
        .as_array()
        .map(|correcteds| {
            correcteds
                .iter()
                .filter_map(|user| user["login"].as_str())
                .map(|evaluated| EvaluationRecord {
                    evaluator: evaluator.clone(),
                    evaluated: evaluated.to_string(),
                    final_mark,
                    project: project.clone(),
                    cursus_id,
                    created_at,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Login of a `/v2/campus/:id/users` entry when the user is active and was
/// created strictly after `created_after`.
pub fn parse_campus_login(user: &Value, created_after: DateTime<Utc>) -> Option<String> {
    if user["active?"].as_bool() != Some(true) {
        return None;
    }

    let created_at = DateTime::parse_from_rfc3339(user["created_at"].as_str()?).ok()?;
    if created_at.with_timezone(&Utc) <= created_after {
        return None;
    }

    user["login"].as_str().map(str::to_string)
}

fn project_name(team: &Value) -> String {
    if let Some(name) = team["project"]["name"].as_str() {
        return name.to_string();
    }

    team["project_gitlab_path"]
        .as_str()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_PROJECT)
        .to_string()
}
