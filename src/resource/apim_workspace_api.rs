//! `azurerm_api_management_workspace_api`: an API revision inside an API
//! Management workspace.
//!
//! When an `import` block is given the API is submitted twice: first the
//! definition to import, then the explicit fields on top of what the
//! import produced.

use super::fetch;
use armclient::Client;
use declarative::mapping::{
    bool_at, clear_server_managed, copy_writable, flatten_enum, insert_opt, lookup, remove_path,
    set_path, str_at, strings_at,
};
use declarative::validation::{is_url, resource_id, string_in_slice, string_is_not_empty, string_matches};
use declarative::{
    BoxedKind, Error, Field, FieldType, OperationContext, ResourceData, ResourceDiff,
    ResourceKind, Result, Schema,
};
use resourceid::{IdPattern, ResourceId, Segment};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

const API_VERSION: &str = "2023-09-01-preview";

pub static SERVICE_ID: IdPattern = IdPattern::new(
    "ApiManagementService",
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.ApiManagement"),
        Segment::Static("service"),
        Segment::Value("serviceName"),
    ],
);

pub static WORKSPACE_ID: IdPattern = IdPattern::child_of(
    "Workspace",
    &SERVICE_ID,
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.ApiManagement"),
        Segment::Static("service"),
        Segment::Value("serviceName"),
        Segment::Static("workspaces"),
        Segment::Value("workspaceId"),
    ],
);

pub static WORKSPACE_API_ID: IdPattern = IdPattern::child_of(
    "WorkspaceApi",
    &WORKSPACE_ID,
    &[
        Segment::Static("subscriptions"),
        Segment::Value("subscriptionId"),
        Segment::Static("resourceGroups"),
        Segment::Value("resourceGroupName"),
        Segment::Static("providers"),
        Segment::Static("Microsoft.ApiManagement"),
        Segment::Static("service"),
        Segment::Value("serviceName"),
        Segment::Static("workspaces"),
        Segment::Value("workspaceId"),
        Segment::Static("apis"),
        Segment::Value("apiId"),
    ],
);

const API_TYPES: &[&str] = &["graphql", "http", "soap", "websocket"];
const PROTOCOLS: &[&str] = &["http", "https", "ws", "wss"];
const CONTENT_FORMATS: &[&str] = &[
    "graphql-link",
    "openapi",
    "openapi+json",
    "openapi+json-link",
    "openapi-link",
    "swagger-json",
    "swagger-link-json",
    "wadl-link-json",
    "wadl-xml",
    "wsdl",
    "wsdl-link",
];
const WSDL_FORMATS: &[&str] = &["wsdl", "wsdl-link"];
const BEARER_TOKEN_METHODS: &[&str] = &["authorizationHeader", "query"];

/// Sub-fields of `authenticationSettings` the service accepts back.
const WRITABLE_AUTHENTICATION: &[&str] = &["oAuth2", "openid"];

/// Fields an update may change, and where they live in the API model.
const UPDATABLE: &[(&str, &str)] = &[
    ("display_name", "properties.displayName"),
    ("path", "properties.path"),
    ("protocols", "properties.protocols"),
    ("description", "properties.description"),
    ("service_url", "properties.serviceUrl"),
    ("subscription_required", "properties.subscriptionRequired"),
    ("terms_of_service_url", "properties.termsOfServiceUrl"),
    ("version", "properties.apiVersion"),
    ("version_set_id", "properties.apiVersionSetId"),
    ("revision_description", "properties.apiRevisionDescription"),
    ("version_description", "properties.apiVersionDescription"),
];

/// Read-only API properties the service rejects on a PUT.
const READ_ONLY: &[&str] = &["isCurrent", "isOnline"];

/// Separator between the API name and its revision in the id.
const REVISION_SEPARATOR: &str = ";rev=";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Field::string("name")
            .required()
            .force_new()
            .validate(string_matches(
                r"^[^*#&+:<>?]+$",
                "may not contain the characters *, #, &, +, :, <, > or ?",
            )),
        Field::string("api_management_workspace_id")
            .required()
            .force_new()
            .validate(resource_id(&WORKSPACE_ID)),
        Field::string("revision")
            .required()
            .force_new()
            .validate(string_is_not_empty()),
        Field::string("display_name").optional().computed(),
        Field::set("protocols", FieldType::String)
            .optional()
            .computed()
            .validate(string_in_slice(PROTOCOLS, false)),
        Field::string("path").optional().computed(),
        Field::string("api_type")
            .optional()
            .force_new()
            .default("http")
            .validate(string_in_slice(API_TYPES, false)),
        Field::string("description").optional(),
        Field::string("service_url").optional().computed(),
        Field::bool("subscription_required").optional().default(true),
        Field::string("terms_of_service_url").optional().validate(is_url()),
        Field::string("version").optional().computed(),
        Field::string("version_set_id")
            .optional()
            .computed()
            .required_with(&["version"]),
        Field::string("revision_description").optional(),
        Field::string("version_description").optional(),
        Field::string("source_api_id").optional().force_new(),
        Field::block(
            "import",
            Schema::new(vec![
                Field::string("content_format")
                    .required()
                    .validate(string_in_slice(CONTENT_FORMATS, false)),
                Field::string("content_value")
                    .required()
                    .validate(string_is_not_empty()),
                Field::block(
                    "wsdl_selector",
                    Schema::new(vec![
                        Field::string("service_name").required(),
                        Field::string("endpoint_name").required(),
                    ]),
                )
                .optional()
                .max_items(1),
            ]),
        )
        .optional()
        .max_items(1),
        Field::block(
            "oauth2_authorization",
            Schema::new(vec![
                Field::string("authorization_server_name").required(),
                Field::string("scope").optional(),
            ]),
        )
        .optional()
        .max_items(1)
        .conflicts_with(&["openid_authentication"]),
        Field::block(
            "openid_authentication",
            Schema::new(vec![
                Field::string("openid_provider_name").required(),
                Field::set("bearer_token_sending_methods", FieldType::String)
                    .optional()
                    .validate(string_in_slice(BEARER_TOKEN_METHODS, false)),
            ]),
        )
        .optional()
        .max_items(1),
        Field::block(
            "subscription_key_parameter_names",
            Schema::new(vec![
                Field::string("header").required(),
                Field::string("query").required(),
            ]),
        )
        .optional()
        .computed()
        .max_items(1),
        Field::bool("is_current").computed(),
        Field::bool("is_online").computed(),
    ])
});

pub fn kinds() -> Vec<BoxedKind> {
    vec![Arc::new(WorkspaceApi)]
}

pub struct WorkspaceApi;

/// The user model, minus the fields the service never echoes (`import`
/// and `source_api_id`), which therefore keep their working value.
#[derive(Debug, Serialize)]
struct Flattened {
    name: String,
    api_management_workspace_id: String,
    revision: String,
    display_name: String,
    protocols: Vec<String>,
    path: String,
    api_type: String,
    description: String,
    service_url: String,
    subscription_required: bool,
    terms_of_service_url: String,
    version: String,
    version_set_id: String,
    revision_description: String,
    version_description: String,
    oauth2_authorization: Vec<Value>,
    openid_authentication: Vec<Value>,
    subscription_key_parameter_names: Vec<Value>,
    is_current: bool,
    is_online: bool,
}

/// Split an `apiId` into name and revision.
fn split_api_id(api_id: &str) -> (&str, &str) {
    api_id.split_once(REVISION_SEPARATOR).unwrap_or((api_id, ""))
}

impl WorkspaceApi {
    /// The first submission: only what the service needs to import.
    fn expand_import(data: &ResourceData) -> Option<Value> {
        let import = data.get("import.0")?;
        let format = str_at(import, "content_format");
        let mut properties = Map::new();
        properties.insert("format".into(), json!(format));
        properties.insert("value".into(), json!(str_at(import, "content_value")));
        properties.insert("path".into(), json!(data.get_str("path")));
        properties.insert("apiType".into(), json!(data.get_str("api_type")));
        if let Some(selector) = lookup(import, "wsdl_selector.0") {
            properties.insert(
                "wsdlSelector".into(),
                json!({
                    "wsdlServiceName": str_at(selector, "service_name"),
                    "wsdlEndpointName": str_at(selector, "endpoint_name"),
                }),
            );
        }
        Some(json!({"properties": properties}))
    }

    fn expand_authentication(data: &ResourceData, current: Option<&Value>) -> Value {
        // keep only what may be written back from the current settings
        let mut settings = match current {
            Some(current) => copy_writable(current, WRITABLE_AUTHENTICATION),
            None => json!({}),
        };
        if let Some(oauth) = data.get("oauth2_authorization.0") {
            settings["oAuth2"] = json!({
                "authorizationServerId": str_at(oauth, "authorization_server_name"),
                "scope": str_at(oauth, "scope"),
            });
        } else if let Some(map) = settings.as_object_mut() {
            map.remove("oAuth2");
        }
        if let Some(openid) = data.get("openid_authentication.0") {
            settings["openid"] = json!({
                "openidProviderId": str_at(openid, "openid_provider_name"),
                "bearerTokenSendingMethods": strings_at(openid, "bearer_token_sending_methods"),
            });
        } else if let Some(map) = settings.as_object_mut() {
            map.remove("openid");
        }
        settings
    }

    /// The second (or only) submission: the explicit fields.
    fn expand(data: &ResourceData, current_authentication: Option<&Value>) -> Value {
        let mut properties = Map::new();
        let text = |field: &str| data.get_ok(field).and_then(Value::as_str).map(str::to_string);

        insert_opt(&mut properties, "displayName", text("display_name"));
        insert_opt(&mut properties, "path", text("path"));
        if let Some(protocols) = data.get_ok("protocols") {
            properties.insert("protocols".into(), protocols.clone());
        }
        properties.insert("type".into(), json!(data.get_str("api_type")));
        insert_opt(&mut properties, "description", text("description"));
        insert_opt(&mut properties, "serviceUrl", text("service_url"));
        properties.insert(
            "subscriptionRequired".into(),
            json!(data.get("subscription_required").and_then(Value::as_bool).unwrap_or(true)),
        );
        insert_opt(&mut properties, "termsOfServiceUrl", text("terms_of_service_url"));
        insert_opt(&mut properties, "apiVersion", text("version"));
        insert_opt(&mut properties, "apiVersionSetId", text("version_set_id"));
        insert_opt(&mut properties, "apiRevisionDescription", text("revision_description"));
        insert_opt(&mut properties, "apiVersionDescription", text("version_description"));
        insert_opt(&mut properties, "sourceApiId", text("source_api_id"));
        properties.insert("apiRevision".into(), json!(data.get_str("revision")));

        let authentication = Self::expand_authentication(data, current_authentication);
        if authentication.as_object().is_some_and(|m| !m.is_empty()) {
            properties.insert("authenticationSettings".into(), authentication);
        }
        if let Some(names) = data.get("subscription_key_parameter_names.0") {
            properties.insert(
                "subscriptionKeyParameterNames".into(),
                json!({"header": str_at(names, "header"), "query": str_at(names, "query")}),
            );
        }

        json!({"properties": properties})
    }

    /// Apply the changed fields onto the current remote model.
    fn expand_onto(data: &ResourceData, model: &mut Value) -> Result<()> {
        clear_server_managed(model);
        if let Some(props) = model.get_mut("properties").and_then(Value::as_object_mut) {
            for key in READ_ONLY {
                props.remove(*key);
            }
        }

        for (field, path) in UPDATABLE {
            if !data.has_change(field) {
                continue;
            }
            match data.get(field) {
                Some(value) => set_path(model, path, value.clone())?,
                None => {
                    remove_path(model, path);
                }
            }
        }
        if data.has_change("subscription_key_parameter_names") {
            let path = "properties.subscriptionKeyParameterNames";
            match data.get("subscription_key_parameter_names.0") {
                Some(names) => set_path(
                    model,
                    path,
                    json!({"header": str_at(names, "header"), "query": str_at(names, "query")}),
                )?,
                None => {
                    remove_path(model, path);
                }
            }
        }

        let path = "properties.authenticationSettings";
        let authentication = Self::expand_authentication(data, lookup(model, path));
        if authentication.as_object().is_some_and(|m| !m.is_empty()) {
            set_path(model, path, authentication)?;
        } else {
            remove_path(model, path);
        }
        Ok(())
    }

    fn flatten(id: &ResourceId, model: &Value) -> Result<Flattened> {
        let workspace = id
            .parent()
            .ok_or_else(|| Error::decode("workspace api id", "missing workspace"))?;
        let (name, revision) = split_api_id(id.name());
        let props = model.get("properties").unwrap_or(&Value::Null);

        let remote_type = str_at(props, "type");
        let api_type = if remote_type.is_empty() {
            "http".to_string()
        } else {
            flatten_enum(Some(remote_type.as_str()), API_TYPES, "api_type")
        };

        let oauth2_authorization = lookup(props, "authenticationSettings.oAuth2")
            .filter(|v| !v.is_null())
            .map(|o| {
                vec![json!({
                    "authorization_server_name": str_at(o, "authorizationServerId"),
                    "scope": str_at(o, "scope"),
                })]
            })
            .unwrap_or_default();
        let openid_authentication = lookup(props, "authenticationSettings.openid")
            .filter(|v| !v.is_null())
            .map(|o| {
                vec![json!({
                    "openid_provider_name": str_at(o, "openidProviderId"),
                    "bearer_token_sending_methods": strings_at(o, "bearerTokenSendingMethods"),
                })]
            })
            .unwrap_or_default();
        let subscription_key_parameter_names = lookup(props, "subscriptionKeyParameterNames")
            .filter(|v| !v.is_null())
            .map(|k| vec![json!({"header": str_at(k, "header"), "query": str_at(k, "query")})])
            .unwrap_or_default();

        let remote_revision = str_at(props, "apiRevision");
        Ok(Flattened {
            name: name.to_string(),
            api_management_workspace_id: workspace.to_string(),
            revision: if remote_revision.is_empty() {
                revision.to_string()
            } else {
                remote_revision
            },
            display_name: str_at(props, "displayName"),
            protocols: strings_at(props, "protocols"),
            path: str_at(props, "path"),
            api_type,
            description: str_at(props, "description"),
            service_url: str_at(props, "serviceUrl"),
            subscription_required: lookup(props, "subscriptionRequired")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            terms_of_service_url: str_at(props, "termsOfServiceUrl"),
            version: str_at(props, "apiVersion"),
            version_set_id: str_at(props, "apiVersionSetId"),
            revision_description: str_at(props, "apiRevisionDescription"),
            version_description: str_at(props, "apiVersionDescription"),
            oauth2_authorization,
            openid_authentication,
            subscription_key_parameter_names,
            is_current: bool_at(props, "isCurrent"),
            is_online: bool_at(props, "isOnline"),
        })
    }

    /// Submit the import payload, when there is one, and wait for it.
    fn submit_import(client: &Client, ctx: &OperationContext<'_>, data: &ResourceData, id: &str) -> Result<()> {
        let Some(body) = Self::expand_import(data) else {
            return Ok(());
        };
        log::debug!("importing the definition of {id}");
        let resp = client.create_or_update(ctx.context(), id, &body)?;
        ctx.wait(client, &resp, id)
    }

    fn submit(
        client: &Client,
        ctx: &OperationContext<'_>,
        data: &ResourceData,
        id: &str,
        current: Option<&Value>,
    ) -> Result<()> {
        let authentication = current.and_then(|m| lookup(m, "properties.authenticationSettings"));
        let resp = client.create_or_update(ctx.context(), id, &Self::expand(data, authentication))?;
        ctx.wait(client, &resp, id)
    }
}

impl ResourceKind for WorkspaceApi {
    fn type_name(&self) -> &'static str {
        "azurerm_api_management_workspace_api"
    }

    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn id_pattern(&self) -> &'static IdPattern {
        &WORKSPACE_API_ID
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn description(&self) -> &'static str {
        "API revision in an API Management workspace"
    }

    fn resource_id(&self, _subscription_id: &str, data: &ResourceData) -> Result<ResourceId> {
        let workspace = ResourceId::parse(&WORKSPACE_ID, data.get_str("api_management_workspace_id"))?;
        let api_id = format!(
            "{}{REVISION_SEPARATOR}{}",
            data.get_str("name"),
            data.get_str("revision")
        );
        Ok(workspace.child(&WORKSPACE_API_ID, &[&api_id])?)
    }

    fn customize_diff(&self, diff: &ResourceDiff) -> Result<()> {
        if diff.get_str("source_api_id").is_empty() {
            if diff.get_str("display_name").is_empty() {
                return Err(Error::diff(
                    "display_name",
                    "`display_name` is required when `source_api_id` is not set",
                ));
            }
            if diff.get("protocols").and_then(Value::as_array).is_none_or(Vec::is_empty) {
                return Err(Error::diff(
                    "protocols",
                    "`protocols` is required when `source_api_id` is not set",
                ));
            }
        }

        if diff.get("import.0.wsdl_selector.0").is_some() {
            let format = diff.get_str("import.0.content_format");
            if !WSDL_FORMATS.contains(&format) {
                return Err(Error::diff(
                    "import.0.wsdl_selector",
                    "`wsdl_selector` is only applicable when `content_format` is `wsdl` or `wsdl-link`",
                ));
            }
        }
        Ok(())
    }

    fn create(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = self.resource_id(ctx.subscription_id(), data)?.to_string();

        let client = ctx.client(API_VERSION);
        Self::submit_import(&client, ctx, data, &id)?;
        let current = if data.get("import.0").is_some() {
            Some(fetch(&client, ctx, &id)?)
        } else {
            None
        };
        Self::submit(&client, ctx, data, &id, current.as_ref())?;

        data.set_id(id);
        Ok(())
    }

    fn read(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = ResourceId::parse(&WORKSPACE_API_ID, data.require_id()?)?;
        let model = fetch(&ctx.client(API_VERSION), ctx, &id.to_string())?;
        data.encode(&Self::flatten(&id, &model)?)
    }

    fn update(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let client = ctx.client(API_VERSION);
        if data.has_change("import") {
            Self::submit_import(&client, ctx, data, &id)?;
        }
        let mut model = fetch(&client, ctx, &id)?;
        Self::expand_onto(data, &mut model)?;
        let resp = client.create_or_update(ctx.context(), &id, &model)?;
        ctx.wait(&client, &resp, &id)
    }

    fn delete(&self, ctx: &OperationContext<'_>, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client(API_VERSION);
        let id = data.require_id()?.to_string();
        let resp = client.delete(ctx.context(), &id)?;
        ctx.wait(&client, &resp, &id)
    }
}
