//! HubSpot CRM v3 adapter.
//!
//! Authenticates either with a private-app token or with OAuth2 refresh
//! tokens. Records are `{"id", "properties": {..}, ..}` on the wire and are
//! flattened so property names sit next to `id`. Search is cursor based; the
//! cursor is the record offset, which keeps `page`/`limit` addressable.

use crate::adapter::{
    Association, VendorAdapter, none_if_not_found, response_id, retain_selected,
    split_associations,
};
use crate::auth::{
    Authenticator, ClientAuthMethod, InitialGrant, OAuthClientConfig, RefreshTokenAuth,
    StaticKeyAuth,
};
use crate::credential::{CredentialStore, credential_key};
use crate::error::{AdapterResult, ErrorKind, StandardError};
use crate::http::{ApiRequest, VendorClient, path_segment};
use crate::query::{Comparison, PaginatedResult, Pagination, Predicate, QueryOptions, SortDirection};
use crate::reference::RefUrlTemplate;
use crate::token::TokenLifecycle;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use syncbridge_core::Record;
use tracing::{debug, instrument};

/// Vendor name used in credential keys.
pub const VENDOR: &str = "hubspot";

const ID_FIELD: &str = "id";

/// Properties HubSpot returns on every object when none are requested.
const SYSTEM_PROPERTIES: [&str; 4] = [
    "createdate",
    "lastmodifieddate",
    "hs_lastmodifieddate",
    "hs_object_id",
];

/// Properties HubSpot returns by default for the standard object types.
fn default_properties(object_type: &str) -> &'static [&'static str] {
    match object_type {
        "contacts" | "contact" => &["email", "firstname", "lastname"],
        "companies" | "company" => &["domain", "name"],
        "deals" | "deal" => &["amount", "closedate", "dealname", "dealstage", "pipeline"],
        "tickets" | "ticket" => &[
            "content",
            "hs_pipeline",
            "hs_pipeline_stage",
            "hs_ticket_priority",
            "subject",
        ],
        _ => &[],
    }
}

/// Properties to read back after a write: the vendor defaults for the object
/// type followed by every written key not already among them. Naming any
/// property replaces the vendor's default set, so the defaults are requested
/// explicitly to keep server-computed values in the result.
fn read_back_properties<'a>(
    object_type: &str,
    written: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let mut properties: Vec<String> = default_properties(object_type)
        .iter()
        .chain(SYSTEM_PROPERTIES.iter())
        .map(|p| (*p).to_string())
        .collect();
    for key in written {
        if !properties.contains(key) {
            properties.push(key.clone());
        }
    }
    properties
}

/// How the adapter authenticates.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubspotAuth {
    /// Private-app access token.
    PrivateApp {
        /// The token.
        token: String,
    },
    /// OAuth2 app with refreshable tokens.
    Oauth {
        /// App client id.
        client_id: String,
        /// App client secret.
        client_secret: String,
        /// Grant exchanged on first use.
        initial_grant: InitialGrant,
        /// Redirect URL registered with the app, required for
        /// authorization-code grants.
        #[serde(default)]
        redirect_url: Option<String>,
    },
}

impl fmt::Debug for HubspotAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateApp { .. } => f.debug_struct("PrivateApp").finish_non_exhaustive(),
            Self::Oauth {
                client_id,
                initial_grant,
                ..
            } => f
                .debug_struct("Oauth")
                .field("client_id", client_id)
                .field("initial_grant", initial_grant)
                .finish_non_exhaustive(),
        }
    }
}

/// Connection settings for one HubSpot portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubspotSettings {
    /// Portal (hub) id, used in UI links.
    pub portal_id: String,
    /// Credentials.
    pub auth: HubspotAuth,
    /// API host.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// UI host.
    #[serde(default = "default_ui_url")]
    pub ui_url: String,
}

fn default_api_url() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_ui_url() -> String {
    "https://app.hubspot.com".to_string()
}

impl HubspotSettings {
    /// Settings against the public HubSpot hosts.
    pub fn new(portal_id: impl Into<String>, auth: HubspotAuth) -> Self {
        Self {
            portal_id: portal_id.into(),
            auth,
            api_url: default_api_url(),
            ui_url: default_ui_url(),
        }
    }
}

/// HubSpot adapter.
#[derive(Debug)]
pub struct HubspotAdapter {
    api_base: String,
    client: VendorClient,
    refs: RefUrlTemplate,
}

impl HubspotAdapter {
    /// Creates the adapter. OAuth credentials are persisted to `store` under
    /// `hubspot-token-{environment}` when a store is given; private-app
    /// tokens never are.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid URLs.
    pub fn new(
        settings: &HubspotSettings,
        store: Option<Arc<dyn CredentialStore>>,
        environment: &str,
    ) -> AdapterResult<Self> {
        let api_base = settings.api_url.trim_end_matches('/').to_string();
        let ui = settings.ui_url.trim_end_matches('/');

        let authenticator: Arc<dyn Authenticator> = match &settings.auth {
            HubspotAuth::PrivateApp { token } => Arc::new(StaticKeyAuth::new(token.clone())),
            HubspotAuth::Oauth {
                client_id,
                client_secret,
                initial_grant,
                redirect_url,
            } => {
                let oauth = OAuthClientConfig::new(
                    client_id.clone(),
                    client_secret.clone(),
                    format!("{api_base}/oauth/v1/token"),
                )?
                .with_auth_method(ClientAuthMethod::RequestBody);
                Arc::new(RefreshTokenAuth::new(
                    oauth,
                    initial_grant.clone(),
                    redirect_url.clone(),
                )?)
            }
        };
        let mut tokens =
            TokenLifecycle::new(VENDOR, credential_key(VENDOR, environment), authenticator);
        if let Some(store) = store {
            tokens = tokens.with_store(store);
        }

        let refs = RefUrlTemplate::new(format!(
            "{ui}/contacts/{}/{{type}}/{{id}}",
            settings.portal_id
        ))
        .alias("contacts", "contact")
        .alias("companies", "company")
        .alias("deals", "deal")
        .alias("tickets", "ticket");

        Ok(Self {
            api_base,
            client: VendorClient::new(tokens)?,
            refs,
        })
    }

    fn objects_url(&self, object_type: &str) -> AdapterResult<String> {
        Ok(format!(
            "{}/crm/v3/objects/{}",
            self.api_base,
            path_segment("object type", object_type)?
        ))
    }

    fn record_url(&self, object_type: &str, id: &str) -> AdapterResult<String> {
        Ok(format!(
            "{}/{}",
            self.objects_url(object_type)?,
            path_segment("id", id)?
        ))
    }

    async fn fetch(&self, object_type: &str, id: &str, properties: &[String]) -> AdapterResult<Record> {
        let mut request = ApiRequest::get(self.record_url(object_type, id)?);
        if !properties.is_empty() {
            request = request.query("properties", properties.join(","));
        }
        flatten(self.client.send_json(request).await?)
    }

    async fn link(&self, object_type: &str, id: &str, associations: Vec<Association>) -> AdapterResult<()> {
        let from_type = path_segment("object type", object_type)?;
        let from_id = path_segment("id", id)?;
        for association in associations {
            let url = format!(
                "{}/crm/v4/objects/{from_type}/{from_id}/associations/default/{}/{}",
                self.api_base,
                path_segment("association type", &association.to)?,
                path_segment("association id", &association.id)?
            );
            debug!(to = %association.to, to_id = %association.id, "linking association");
            self.client.send(ApiRequest::new(Method::PUT, url)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VendorAdapter for HubspotAdapter {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn authenticate(&self) -> AdapterResult<String> {
        self.client.tokens().authenticate().await
    }

    #[instrument(skip(self, data), fields(vendor = VENDOR))]
    async fn create(&self, object_type: &str, mut data: Record) -> AdapterResult<Record> {
        let associations = split_associations(&mut data)?;
        let properties = read_back_properties(object_type, data.keys());
        let response = self
            .client
            .send_json(
                ApiRequest::new(Method::POST, self.objects_url(object_type)?)
                    .json(json!({ "properties": data })),
            )
            .await?;
        let id = response_id(&response, ID_FIELD)?;

        self.link(object_type, &id, associations).await?;
        self.fetch(object_type, &id, &properties).await
    }

    #[instrument(skip(self, options), fields(vendor = VENDOR))]
    async fn find(&self, object_type: &str, options: &QueryOptions) -> AdapterResult<PaginatedResult> {
        let url = format!("{}/search", self.objects_url(object_type)?);
        let response = self
            .client
            .send_json(ApiRequest::new(Method::POST, url).json(search_body(options)?))
            .await?;

        let count = response.get("total").and_then(Value::as_u64).unwrap_or(0);
        let data = match response.get("results") {
            Some(Value::Array(results)) => results
                .iter()
                .cloned()
                .map(flatten)
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
        let properties = if options.select.is_empty() {
            read_back_properties(object_type, data.keys())
        } else {
            options.select.clone()
        };
        if !data.is_empty() {
            self.client
                .send(
                    ApiRequest::new(Method::PATCH, self.record_url(object_type, id)?)
                        .json(json!({ "properties": data })),
                )
                .await?;
        }
        self.link(object_type, id, associations).await?;

        let mut record = self.fetch(object_type, id, &properties).await?;
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

/// Lifts `properties` to the top level. Top-level keys such as `id` and
/// `createdAt` win over properties of the same name.
fn flatten(value: Value) -> AdapterResult<Record> {
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(
                StandardError::new(ErrorKind::Http, "expected a record object").with_details(other),
            );
        }
    };
    let mut record = match object.remove("properties") {
        Some(Value::Object(properties)) => properties,
        _ => Map::new(),
    };
    record.extend(object);
    Ok(record)
}

fn search_body(options: &QueryOptions) -> AdapterResult<Value> {
    let filters = options
        .predicates()
        .iter()
        .map(filter)
        .collect::<AdapterResult<Vec<_>>>()?;

    let mut body = Map::new();
    if !filters.is_empty() {
        body.insert("filterGroups".to_string(), json!([{ "filters": filters }]));
    }
    if !options.sort.is_empty() {
        let sorts: Vec<Value> = options
            .sort
            .iter()
            .map(|sort| {
                json!({
                    "propertyName": sort.field,
                    "direction": match sort.direction {
                        SortDirection::Asc => "ASCENDING",
                        SortDirection::Desc => "DESCENDING",
                    },
                })
            })
            .collect();
        body.insert("sorts".to_string(), Value::Array(sorts));
    }
    if !options.select.is_empty() {
        body.insert("properties".to_string(), json!(options.select));
    }
    body.insert("limit".to_string(), json!(options.effective_limit()));
    let offset = options.offset();
    if offset > 0 {
        body.insert("after".to_string(), json!(offset.to_string()));
    }
    Ok(Value::Object(body))
}

fn filter(predicate: &Predicate) -> AdapterResult<Value> {
    let field = &predicate.field;
    let single = |operator: &str, value: &Value| -> AdapterResult<Value> {
        Ok(json!({
            "propertyName": field,
            "operator": operator,
            "value": filter_value(field, value)?,
        }))
    };

    match &predicate.comparison {
        Comparison::Eq(Value::Null) | Comparison::Exists(false) => Ok(json!({
            "propertyName": field,
            "operator": "NOT_HAS_PROPERTY",
        })),
        Comparison::Ne(Value::Null) | Comparison::Exists(true) => Ok(json!({
            "propertyName": field,
            "operator": "HAS_PROPERTY",
        })),
        Comparison::Eq(value) => single("EQ", value),
        Comparison::Ne(value) => single("NEQ", value),
        Comparison::Gt(value) => single("GT", value),
        Comparison::Gte(value) => single("GTE", value),
        Comparison::Lt(value) => single("LT", value),
        Comparison::Lte(value) => single("LTE", value),
        Comparison::In(values) => Ok(json!({
            "propertyName": field,
            "operator": "IN",
            "values": values
                .iter()
                .map(|value| filter_value(field, value))
                .collect::<AdapterResult<Vec<_>>>()?,
        })),
    }
}

fn filter_value(field: &str, value: &Value) -> AdapterResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(StandardError::validation(format!(
            "unsupported filter value for '{field}': {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_are_flattened() {
        let record = flatten(json!({
            "id": "51",
            "properties": {"email": "a@example.com", "hs_object_id": "51"},
            "createdAt": "2024-01-01T00:00:00Z",
            "archived": false
        }))
        .expect("object");
        assert_eq!(
            Value::Object(record),
            json!({
                "id": "51",
                "email": "a@example.com",
                "hs_object_id": "51",
                "createdAt": "2024-01-01T00:00:00Z",
                "archived": false
            })
        );
    }

    #[test]
    fn read_back_requests_defaults_and_written_keys() {
        let written = ["email".to_string(), "favorite_color".to_string()];
        assert_eq!(
            read_back_properties("contacts", &written).join(","),
            "email,firstname,lastname,createdate,lastmodifieddate,hs_lastmodifieddate,hs_object_id,favorite_color"
        );
        assert_eq!(
            read_back_properties("p_custom", &written).join(","),
            "createdate,lastmodifieddate,hs_lastmodifieddate,hs_object_id,email,favorite_color"
        );
    }

    #[test]
    fn search_body_translates_filters_sort_and_offset() {
        let options = QueryOptions::from_value(&json!({
            "select": ["email", "firstname"],
            "lifecyclestage": "customer",
            "sort": {"createdate": "desc"},
            "limit": 20,
            "page": 3
        }));
        let body = search_body(&options).expect("valid");

        assert_eq!(
            body,
            json!({
                "filterGroups": [{"filters": [
                    {"propertyName": "lifecyclestage", "operator": "EQ", "value": "customer"}
                ]}],
                "sorts": [{"propertyName": "createdate", "direction": "DESCENDING"}],
                "properties": ["email", "firstname"],
                "limit": 20,
                "after": "40"
            })
        );
    }

    #[test]
    fn operator_objects_map_to_search_operators() {
        let cases = [
            (json!({"$ne": "lead"}), json!({"propertyName": "f", "operator": "NEQ", "value": "lead"})),
            (json!({"$gt": 5}), json!({"propertyName": "f", "operator": "GT", "value": "5"})),
            (json!({"$lte": 9}), json!({"propertyName": "f", "operator": "LTE", "value": "9"})),
            (
                json!({"$in": ["a", "b"]}),
                json!({"propertyName": "f", "operator": "IN", "values": ["a", "b"]}),
            ),
            (json!({"$exists": true}), json!({"propertyName": "f", "operator": "HAS_PROPERTY"})),
            (
                json!({"$exists": false}),
                json!({"propertyName": "f", "operator": "NOT_HAS_PROPERTY"}),
            ),
        ];
        for (operand, expected) in cases {
            let body = search_body(&QueryOptions::new().filter("f", operand)).expect("valid");
            assert_eq!(body["filterGroups"][0]["filters"][0], expected);
        }
    }

    #[test]
    fn first_page_has_no_cursor_and_no_filter_groups() {
        let body = search_body(&QueryOptions::new()).expect("valid");
        assert_eq!(body, json!({"limit": 100}));
    }

    #[test]
    fn object_filter_values_are_rejected() {
        let options = QueryOptions::new().filter("f", json!({"$gt": {"nested": 1}}));
        assert!(search_body(&options).is_err());
    }

    #[tokio::test]
    async fn ref_urls_use_singular_ui_paths() {
        let settings = HubspotSettings::new(
            "4412",
            HubspotAuth::PrivateApp {
                token: "pat".to_string(),
            },
        );
        let adapter = HubspotAdapter::new(&settings, None, "test").expect("valid");

        let data = adapter.get_ref_data("contacts", "51");
        assert_eq!(data.ref_id, "51");
        assert_eq!(data.ref_url, "https://app.hubspot.com/contacts/4412/contact/51");
        assert_eq!(
            adapter.get_ref_url("p_custom", "9"),
            "https://app.hubspot.com/contacts/4412/p_custom/9"
        );
    }
}
