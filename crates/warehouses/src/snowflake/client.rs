use crate::error::WarehouseError;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Minimal client for Snowflake's HTTP session protocol: one login request
/// for a session token, then one query request per statement. Result sets
/// arrive as JSON with a `rowtype` header and a string-encoded `rowset`.
pub struct SnowflakeRestClient {
    http: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryData {
    #[serde(default)]
    pub rowtype: Vec<RowType>,
    #[serde(default)]
    pub rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnowflakeResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

// Statement error code for a referenced object that does not exist.
const OBJECT_DOES_NOT_EXIST: &str = "002003";

impl SnowflakeRestClient {
    pub fn new(account: &str) -> Self {
        SnowflakeRestClient {
            http: reqwest::Client::new(),
            base_url: format!("https://{account}.snowflakecomputing.com"),
            session_token: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session_token.is_some()
    }

    pub async fn login(
        &mut self,
        account: &str,
        user: &str,
        password: &str,
    ) -> Result<(), WarehouseError> {
        let url = format!(
            "{}/session/v1/login-request?requestId={}",
            self.base_url,
            Uuid::new_v4()
        );
        let body = json!({
            "data": {
                "ACCOUNT_NAME": account,
                "LOGIN_NAME": user,
                "PASSWORD": password,
                "CLIENT_APP_ID": "melchi",
            }
        });

        let response: SnowflakeResponse =
            self.http.post(url).json(&body).send().await?.json().await?;
        if !response.success {
            return Err(WarehouseError::Connection(format!(
                "snowflake login failed: {}",
                response
                    .message
                    .unwrap_or_else(|| "no message returned".to_string())
            )));
        }

        let token = response.data.and_then(|d| d.token).ok_or_else(|| {
            WarehouseError::Connection("snowflake login response carried no session token".into())
        })?;
        self.session_token = Some(token);
        Ok(())
    }

    pub fn close_session(&mut self) {
        self.session_token = None;
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryData, WarehouseError> {
        let token = self
            .session_token
            .as_ref()
            .ok_or_else(|| WarehouseError::not_connected("snowflake"))?;

        debug!(statement = sql, "executing snowflake statement");
        let url = format!(
            "{}/queries/v1/query-request?requestId={}",
            self.base_url,
            Uuid::new_v4()
        );
        let body = json!({ "sqlText": sql });
        let response: SnowflakeResponse = self
            .http
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Snowflake Token=\"{token}\""),
            )
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "no message returned".to_string());
            if response.code.as_deref() == Some(OBJECT_DOES_NOT_EXIST)
                || message.contains("does not exist")
            {
                return Err(WarehouseError::MissingObject(message));
            }
            return Err(WarehouseError::DataPlane(format!(
                "snowflake statement failed: {message}"
            )));
        }

        Ok(response.data.unwrap_or_default())
    }
}
