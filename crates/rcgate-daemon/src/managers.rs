//! Mirrors of product sessions, patch states, RSO authentication and the
//! multifactor notice setting.

use async_trait::async_trait;
use rcgate_cache::{
    ChangeSink, DataManager, Delta, DeltaError, FetchError, MapChange, MapDataManager, MapSource,
    ObjectChange, ObjectDataManager, ObjectSource,
};
use rcgate_client::{CoreSdkApi, ManagedClient};
use rcgate_core::RcuEventType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One launched product as reported by the product-session API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductSession {
    pub phase: Option<String>,
    pub product_id: Option<String>,
    pub patchline_id: Option<String>,
    pub patchline_full_name: Option<String>,
    pub version: Option<String>,
    pub exit_code: Option<i64>,
    pub exit_reason: Option<String>,
    pub launch_configuration: Option<Value>,
}

/// What downstream consumers see of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub phase: Option<String>,
    pub product: Option<String>,
    pub patchline: Option<String>,
}

pub struct SessionsSource {
    client: ManagedClient,
    pattern: Regex,
}

impl SessionsSource {
    pub const ID: &'static str = "sessions";

    pub fn new(client: ManagedClient) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            pattern: Regex::new(r"^/product-session/v1/sessions/([\w-]{0,50})$")?,
        })
    }
}

#[async_trait]
impl MapSource for SessionsSource {
    type Key = String;
    type Value = ProductSession;
    type ValueView = SessionSummary;

    fn id(&self) -> &str {
        Self::ID
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<HashMap<String, ProductSession>, FetchError> {
        let sessions = self.client.api::<CoreSdkApi>()?.product_sessions().await?;
        sessions
            .into_iter()
            .map(|(id, raw)| Ok::<_, FetchError>((id, serde_json::from_value(raw)?)))
            .collect()
    }

    fn apply_delta(
        &self,
        delta: &Delta<'_>,
    ) -> Result<MapChange<String, ProductSession>, DeltaError> {
        let id = delta.capture(1)?.to_string();
        Ok(match delta.kind {
            RcuEventType::Delete => MapChange::Remove(id),
            RcuEventType::Create | RcuEventType::Update => MapChange::Put(id, delta.parse()?),
        })
    }

    fn compute_value_view(&self, _id: &String, session: &ProductSession) -> SessionSummary {
        SessionSummary {
            phase: session.phase.clone(),
            product: session.product_id.clone(),
            patchline: session.patchline_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultifactorDetails {
    pub email: Option<String>,
    pub method: Option<String>,
    pub methods: Vec<String>,
}

/// Body of `/rso-authenticator/v1/authentication`. Only the fields the view
/// needs are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthenticationResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub multifactor: Option<MultifactorDetails>,
    pub error: Option<Value>,
}

/// Login status as published downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginStatus {
    LoggedIn,
    LoggedOut,
    MultifactorRequired(MultifactorDetails),
    Error,
    Unknown,
}

pub struct AuthenticationSource {
    client: ManagedClient,
    pattern: Regex,
}

impl AuthenticationSource {
    pub const ID: &'static str = "authentication";

    pub fn new(client: ManagedClient) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            pattern: Regex::new(r"^/rso-authenticator/v1/authentication$")?,
        })
    }
}

#[async_trait]
impl ObjectSource for AuthenticationSource {
    type State = AuthenticationResponse;
    type View = LoginStatus;

    fn id(&self) -> &str {
        Self::ID
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<Option<AuthenticationResponse>, FetchError> {
        let raw = self.client.api::<CoreSdkApi>()?.authentication().await?;
        if raw.is_null() {
            return Err(FetchError::Other("empty authentication response".to_string()));
        }
        Ok(Some(serde_json::from_value(raw)?))
    }

    fn apply_delta(
        &self,
        _current: Option<&AuthenticationResponse>,
        delta: &Delta<'_>,
    ) -> Result<ObjectChange<AuthenticationResponse>, DeltaError> {
        Ok(match delta.kind {
            RcuEventType::Delete => ObjectChange::Clear,
            RcuEventType::Create | RcuEventType::Update => ObjectChange::Set(delta.parse()?),
        })
    }

    fn compute_view(&self, state: Option<&AuthenticationResponse>) -> LoginStatus {
        let Some(state) = state else {
            return LoginStatus::Unknown;
        };
        match state.kind.as_deref() {
            Some("success") => LoginStatus::LoggedIn,
            Some("auth") => LoginStatus::LoggedOut,
            Some("error") => LoginStatus::Error,
            Some("multifactor") => match &state.multifactor {
                Some(details) => LoginStatus::MultifactorRequired(details.clone()),
                None => LoginStatus::Unknown,
            },
            _ => LoginStatus::Unknown,
        }
    }
}

/// Patch progress per product patchline, keyed `product/patchline`.
///
/// The managed client has no bulk listing, so the table fills from events.
pub struct PatchStateSource {
    pattern: Regex,
}

impl PatchStateSource {
    pub const ID: &'static str = "patch-states";

    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"^/patch-proxy/v1/patch-states/products/(\w+)/patchlines/(\w+)$")?,
        })
    }
}

#[async_trait]
impl MapSource for PatchStateSource {
    type Key = String;
    type Value = Value;
    type ValueView = Value;

    fn id(&self) -> &str {
        Self::ID
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<HashMap<String, Value>, FetchError> {
        Ok(HashMap::new())
    }

    fn apply_delta(&self, delta: &Delta<'_>) -> Result<MapChange<String, Value>, DeltaError> {
        let key = format!("{}/{}", delta.capture(1)?, delta.capture(2)?);
        Ok(match delta.kind {
            RcuEventType::Delete => MapChange::Remove(key),
            RcuEventType::Create | RcuEventType::Update => {
                if !delta.data.is_object() {
                    tracing::warn!(%key, "patch state is not an object, ignoring");
                    return Ok(MapChange::Ignore);
                }
                MapChange::Put(key, delta.data.clone())
            }
        })
    }

    fn compute_value_view(&self, _key: &String, state: &Value) -> Value {
        state.clone()
    }
}

/// Body of `/rso-auth/v1/session`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RsoAuthSession {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub authentication_type: Option<String>,
    pub country: Option<String>,
    pub error: Option<String>,
    pub persist_login: Option<bool>,
    pub security_profile: Option<String>,
    pub multifactor: Option<MultifactorDetails>,
}

pub struct RsoAuthSessionSource {
    client: ManagedClient,
    pattern: Regex,
}

impl RsoAuthSessionSource {
    pub const ID: &'static str = "rso-auth-session";

    pub fn new(client: ManagedClient) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            pattern: Regex::new(r"^/rso-auth/v1/session$")?,
        })
    }
}

#[async_trait]
impl ObjectSource for RsoAuthSessionSource {
    type State = RsoAuthSession;
    type View = Option<RsoAuthSession>;

    fn id(&self) -> &str {
        Self::ID
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<Option<RsoAuthSession>, FetchError> {
        let raw = self.client.api::<CoreSdkApi>()?.rso_auth_session().await?;
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(raw)?))
    }

    fn apply_delta(
        &self,
        _current: Option<&RsoAuthSession>,
        delta: &Delta<'_>,
    ) -> Result<ObjectChange<RsoAuthSession>, DeltaError> {
        Ok(match delta.kind {
            RcuEventType::Delete => ObjectChange::Clear,
            RcuEventType::Create | RcuEventType::Update => ObjectChange::Set(delta.parse()?),
        })
    }

    fn compute_view(&self, state: Option<&RsoAuthSession>) -> Option<RsoAuthSession> {
        state.cloned()
    }
}

/// The install setting recording whether the multifactor notice was dismissed.
pub struct MfaNoticeSource {
    client: ManagedClient,
    pattern: Regex,
}

impl MfaNoticeSource {
    pub const ID: &'static str = "mfa-notice";

    pub fn new(client: ManagedClient) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            pattern: Regex::new(r"^/data-store/v1/install-settings/mfa_notification_dismissed$")?,
        })
    }
}

#[async_trait]
impl ObjectSource for MfaNoticeSource {
    type State = bool;
    type View = Option<bool>;

    fn id(&self) -> &str {
        Self::ID
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<Option<bool>, FetchError> {
        Ok(self
            .client
            .api::<CoreSdkApi>()?
            .mfa_notification_dismissed()
            .await?)
    }

    fn apply_delta(
        &self,
        _current: Option<&bool>,
        delta: &Delta<'_>,
    ) -> Result<ObjectChange<bool>, DeltaError> {
        Ok(match delta.kind {
            RcuEventType::Delete => ObjectChange::Clear,
            RcuEventType::Create | RcuEventType::Update => ObjectChange::Set(delta.parse()?),
        })
    }

    fn compute_view(&self, state: Option<&bool>) -> Option<bool> {
        state.copied()
    }
}

/// Publishing managers for every mirrored resource.
pub fn publishing_managers(
    client: &ManagedClient,
    sink: Arc<dyn ChangeSink>,
) -> Result<Vec<Arc<dyn DataManager>>, regex::Error> {
    Ok(vec![
        Arc::new(MapDataManager::publishing(
            SessionsSource::new(client.clone())?,
            sink.clone(),
        )),
        Arc::new(ObjectDataManager::publishing(
            AuthenticationSource::new(client.clone())?,
            sink.clone(),
        )),
        Arc::new(MapDataManager::publishing(PatchStateSource::new()?, sink.clone())),
        Arc::new(ObjectDataManager::publishing(
            RsoAuthSessionSource::new(client.clone())?,
            sink.clone(),
        )),
        Arc::new(ObjectDataManager::publishing(
            MfaNoticeSource::new(client.clone())?,
            sink,
        )),
    ])
}
