//! Salesforce REST adapter.
//!
//! Authenticates with the OAuth2 client-credentials flow against the org's
//! token endpoint and talks to `/services/data/v{version}`. Queries are SOQL,
//! sent as the `q` parameter of `/query`; totals come from a second
//! `SELECT COUNT()` query over the same filters.

use crate::adapter::{
    Association, VendorAdapter, none_if_not_found, response_id, retain_selected,
    split_associations,
};
use crate::auth::{ClientAuthMethod, ClientCredentialsAuth, OAuthClientConfig};
use crate::credential::{CredentialStore, credential_key};
use crate::error::{AdapterResult, StandardError};
use crate::http::{ApiRequest, VendorClient, path_segment};
use crate::query::{Comparison, PaginatedResult, Pagination, Predicate, QueryOptions, SortDirection};
use crate::reference::RefUrlTemplate;
use crate::token::TokenLifecycle;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use syncbridge_core::Record;
use tracing::{debug, instrument};

/// Vendor name used in credential keys.
pub const VENDOR: &str = "salesforce";

const ID_FIELD: &str = "Id";

/// Connection settings for one Salesforce org.
#[derive(Clone, Serialize, Deserialize)]
pub struct SalesforceSettings {
    /// REST host, e.g. `https://acme.my.salesforce.com`.
    pub instance_url: String,
    /// Host serving the token endpoint; the instance when unset.
    #[serde(default)]
    pub login_url: Option<String>,
    /// Host of the Lightning UI; the instance when unset.
    #[serde(default)]
    pub ui_url: Option<String>,
    /// REST API version without the leading `v`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Connected app consumer key.
    pub client_id: String,
    /// Connected app consumer secret.
    pub client_secret: String,
}

fn default_api_version() -> String {
    "60.0".to_string()
}

impl SalesforceSettings {
    /// Settings with defaults for everything but the org and its app.
    pub fn new(
        instance_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            instance_url: instance_url.into(),
            login_url: None,
            ui_url: None,
            api_version: default_api_version(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for SalesforceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceSettings")
            .field("instance_url", &self.instance_url)
            .field("login_url", &self.login_url)
            .field("api_version", &self.api_version)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Salesforce adapter.
#[derive(Debug)]
pub struct SalesforceAdapter {
    api_base: String,
    client: VendorClient,
    refs: RefUrlTemplate,
}

impl SalesforceAdapter {
    /// Creates the adapter. Credentials are persisted to `store` under
    /// `salesforce-token-{environment}` when a store is given.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid URLs.
    pub fn new(
        settings: &SalesforceSettings,
        store: Option<Arc<dyn CredentialStore>>,
        environment: &str,
    ) -> AdapterResult<Self> {
        let instance = settings.instance_url.trim_end_matches('/');
        let login = settings
            .login_url
            .as_deref()
            .map_or(instance, |url| url.trim_end_matches('/'));
        let ui = settings
            .ui_url
            .as_deref()
            .map_or(instance, |url| url.trim_end_matches('/'));

        let oauth = OAuthClientConfig::new(
            settings.client_id.clone(),
            settings.client_secret.clone(),
            format!("{login}/services/oauth2/token"),
        )?
        .with_auth_method(ClientAuthMethod::RequestBody);
        let mut tokens = TokenLifecycle::new(
            VENDOR,
            credential_key(VENDOR, environment),
            Arc::new(ClientCredentialsAuth::new(oauth)?),
        );
        if let Some(store) = store {
            tokens = tokens.with_store(store);
        }

        Ok(Self {
            api_base: format!("{instance}/services/data/v{}", settings.api_version),
            client: VendorClient::new(tokens)?,
            refs: RefUrlTemplate::new(format!("{ui}/lightning/r/{{type}}/{{id}}/view")),
        })
    }

    fn record_url(&self, object_type: &str, id: &str) -> AdapterResult<String> {
        Ok(format!(
            "{}/sobjects/{}/{}",
            self.api_base,
            path_segment("object type", object_type)?,
            path_segment("id", id)?
        ))
    }

    async fn fetch(&self, object_type: &str, id: &str, select: &[String]) -> AdapterResult<Record> {
        let mut request = ApiRequest::get(self.record_url(object_type, id)?);
        if !select.is_empty() {
            let mut fields = select.to_vec();
            if !fields.iter().any(|f| f == ID_FIELD) {
                fields.insert(0, ID_FIELD.to_string());
            }
            request = request.query("fields", fields.join(","));
        }
        into_record(self.client.send_json(request).await?)
    }

    async fn link(&self, object_type: &str, id: &str, associations: Vec<Association>) -> AdapterResult<()> {
        if associations.is_empty() {
            return Ok(());
        }
        let lookups: Map<String, Value> = associations
            .into_iter()
            .map(|association| (association.to, Value::String(association.id)))
            .collect();
        debug!(count = lookups.len(), "linking lookup fields");
        self.client
            .send(
                ApiRequest::new(Method::PATCH, self.record_url(object_type, id)?)
                    .json(Value::Object(lookups)),
            )
            .await?;
        Ok(())
    }

    async fn query(&self, soql: String) -> AdapterResult<Value> {
        debug!(%soql, "running SOQL");
        self.client
            .send_json(ApiRequest::get(format!("{}/query", self.api_base)).query("q", soql))
            .await
    }
}

#[async_trait]
impl VendorAdapter for SalesforceAdapter {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn authenticate(&self) -> AdapterResult<String> {
        self.client.tokens().authenticate().await
    }

    #[instrument(skip(self, data), fields(vendor = VENDOR))]
    async fn create(&self, object_type: &str, mut data: Record) -> AdapterResult<Record> {
        let associations = split_associations(&mut data)?;
        let url = format!(
            "{}/sobjects/{}",
            self.api_base,
            path_segment("object type", object_type)?
        );
        let response = self
            .client
            .send_json(ApiRequest::new(Method::POST, url).json(Value::Object(data)))
            .await?;
        let id = response_id(&response, "id")?;

        self.link(object_type, &id, associations).await?;
        self.fetch(object_type, &id, &[]).await
    }

    #[instrument(skip(self, options), fields(vendor = VENDOR))]
    async fn find(&self, object_type: &str, options: &QueryOptions) -> AdapterResult<PaginatedResult> {
        let soql = Soql::build(object_type, options)?;
        let count = self
            .query(soql.count)
            .await?
            .get("totalSize")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let page = self.query(soql.select).await?;
        let data = match page.get("records") {
            Some(Value::Array(records)) => records
                .iter()
                .cloned()
                .map(into_record)
                .collect::<AdapterResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(PaginatedResult {
            pagination: Pagination::for_options(count, options),
            data,
        })
    }

    #[instrument(skip(self, options), fields(vendor = VENDOR))]
    async fn find_one(
        &self,
        object_type: &str,
        id: &str,
        options: &QueryOptions,
    ) -> AdapterResult<Option<Record>> {
        none_if_not_found(self.fetch(object_type, id, &options.select).await)
    }

    #[instrument(skip(self, data, options), fields(vendor = VENDOR))]
    async fn update(
        &self,
        object_type: &str,
        id: &str,
        mut data: Record,
        options: &QueryOptions,
    ) -> AdapterResult<Record> {
        let associations = split_associations(&mut data)?;
        if !data.is_empty() {
            self.client
                .send(
                    ApiRequest::new(Method::PATCH, self.record_url(object_type, id)?)
                        .json(Value::Object(data)),
                )
                .await?;
        }
        self.link(object_type, id, associations).await?;

        let mut record = self.fetch(object_type, id, &options.select).await?;
        retain_selected(&mut record, &options.select, ID_FIELD);
        Ok(record)
    }

    #[instrument(skip(self), fields(vendor = VENDOR))]
    async fn delete(&self, object_type: &str, id: &str) -> AdapterResult<bool> {
        let request = ApiRequest::new(Method::DELETE, self.record_url(object_type, id)?);
        Ok(none_if_not_found(self.client.send(request).await)?.is_some())
    }

    fn get_ref_url(&self, object_type: &str, id: &str) -> String {
        self.refs.render(object_type, id)
    }
}

/// Drops the `attributes` metadata Salesforce attaches to every record,
/// including nested relationship records.
fn into_record(value: Value) -> AdapterResult<Record> {
    match strip_attributes(value) {
        Value::Object(record) => Ok(record),
        other => Err(StandardError::new(
            crate::error::ErrorKind::Http,
            "expected a record object",
        )
        .with_details(other)),
    }
}

fn strip_attributes(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.remove("attributes");
            Value::Object(
                object
                    .into_iter()
                    .map(|(key, value)| (key, strip_attributes(value)))
                    .collect(),
            )
        }
        other => other,
    }
}

/// A page query and its matching count query.
#[derive(Debug, PartialEq, Eq)]
struct Soql {
    select: String,
    count: String,
}

impl Soql {
    fn build(object_type: &str, options: &QueryOptions) -> AdapterResult<Self> {
        let object_type = identifier(object_type)?;

        let fields = if options.select.is_empty() {
            ID_FIELD.to_string()
        } else {
            options
                .select
                .iter()
                .map(|field| identifier(field))
                .collect::<AdapterResult<Vec<_>>>()?
                .join(", ")
        };

        let conditions = options
            .predicates()
            .iter()
            .map(condition)
            .collect::<AdapterResult<Vec<_>>>()?;
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let mut select = format!("SELECT {fields} FROM {object_type}{filter}");
        if !options.sort.is_empty() {
            let keys = options
                .sort
                .iter()
                .map(|sort| -> AdapterResult<String> {
                    let direction = match sort.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    Ok(format!("{} {direction}", identifier(&sort.field)?))
                })
                .collect::<AdapterResult<Vec<_>>>()?;
            select.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        select.push_str(&format!(
            " LIMIT {} OFFSET {}",
            options.effective_limit(),
            options.offset()
        ));

        Ok(Self {
            select,
            count: format!("SELECT COUNT() FROM {object_type}{filter}"),
        })
    }
}

fn identifier(name: &str) -> AdapterResult<&str> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(name)
    } else {
        Err(StandardError::validation(format!("invalid SOQL identifier '{name}'")))
    }
}

fn condition(predicate: &Predicate) -> AdapterResult<String> {
    let field = identifier(&predicate.field)?;
    let clause = match &predicate.comparison {
        Comparison::Eq(value) => format!("{field} = {}", literal(value)?),
        Comparison::Ne(value) => format!("{field} != {}", literal(value)?),
        Comparison::Gt(value) => format!("{field} > {}", literal(value)?),
        Comparison::Gte(value) => format!("{field} >= {}", literal(value)?),
        Comparison::Lt(value) => format!("{field} < {}", literal(value)?),
        Comparison::Lte(value) => format!("{field} <= {}", literal(value)?),
        Comparison::In(values) => {
            if values.is_empty() {
                return Err(StandardError::validation(format!(
                    "$in on '{field}' needs at least one value"
                )));
            }
            let values = values.iter().map(literal).collect::<AdapterResult<Vec<_>>>()?;
            format!("{field} IN ({})", values.join(", "))
        }
        Comparison::Exists(true) => format!("{field} != null"),
        Comparison::Exists(false) => format!("{field} = null"),
    };
    Ok(clause)
}

/// Renders a SOQL literal. Date and datetime strings stay unquoted, as SOQL
/// expects.
fn literal(value: &Value) -> AdapterResult<String> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if is_date_literal(s) => Ok(s.clone()),
        Value::String(s) => Ok(format!("'{}'", escape(s))),
        other => Err(StandardError::validation(format!(
            "unsupported SOQL filter value {other}"
        ))),
    }
}

fn is_date_literal(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}
