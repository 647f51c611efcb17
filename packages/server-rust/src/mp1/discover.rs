//! Service discovery: `GET .../applications/{appInstanceId}/services`.
//!
//! decode -> dispatch -> transcode -> hook, then encode as the finalizer.

use std::sync::Arc;

use async_trait::async_trait;
use mep_core::{
    decode_instance, EndPointInfo, ErrorCode, FindInstancesRequest, FindInstancesResponse,
    MicroServiceInstance, RegistryStatus, ServiceInfo,
};
use mep_core::properties::keys;
use tracing::{debug, error, info};

use super::{
    headers, CoreRequest, CoreResponse, MepReply, MepRequest, Mp1Deps, QueryParams, DEFAULT_SCOPE,
    GATEWAY_CONSUMER,
};
use crate::extif::ApiHook;
use crate::pipeline::{
    FirstError, Pipeline, PipelineContext, PipelineError, Slot, Task, TaskCode, TaskError,
};
use crate::store::{InstanceStore, LocalIndex, TargetScope};

/// Query parameters read by the discover stages.
pub mod query {
    pub const SER_NAME: &str = "ser_name";
    pub const INSTANCE_ID: &str = "instance_id";
    pub const VERSION: &str = "version";
    pub const ENV: &str = "env";
    pub const TAGS: &str = "tags";
}

/// Version rule used when the request names none.
pub const DEFAULT_VERSION_RULE: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoverField {
    Request,
    Scope,
    QueryParam,
    CoreRequest,
    CoreRsp,
    HttpErrInf,
    HttpRsp,
    HookRsp,
    Reply,
}

/// Per-request state of the discover pipeline.
#[derive(Debug)]
pub struct DiscoverContext {
    pub request: Slot<MepRequest>,
    pub scope: Slot<TargetScope>,
    pub query: Slot<QueryParams>,
    pub core_request: Slot<CoreRequest>,
    pub core_rsp: Slot<CoreResponse>,
    /// Non-success registry status, forwarded as-is.
    pub http_err_inf: Slot<RegistryStatus>,
    pub http_rsp: Slot<Vec<ServiceInfo>>,
    /// Endpoint the hook substitutes into every result.
    pub hook_rsp: Slot<EndPointInfo>,
    pub reply: Slot<MepReply>,
    errors: FirstError,
}

impl DiscoverContext {
    #[must_use]
    pub fn new(request: MepRequest) -> Self {
        Self {
            request: Slot::seeded("r", request),
            scope: Slot::new("ctx"),
            query: Slot::new("queryParam"),
            core_request: Slot::new("coreRequest"),
            core_rsp: Slot::new("coreRsp"),
            http_err_inf: Slot::new("httpErrInf"),
            http_rsp: Slot::new("httpRsp"),
            hook_rsp: Slot::new("hookRsp"),
            reply: Slot::new("reply"),
            errors: FirstError::default(),
        }
    }

    /// Final HTTP-shaped reply: the first recorded error if any, else the
    /// encoded body.
    #[must_use]
    pub fn into_reply(self) -> MepReply {
        if let Some(err) = self.errors.get() {
            return MepReply::problem(err);
        }
        self.reply.into_inner().unwrap_or_else(|| {
            MepReply::problem(&TaskError::new(ErrorCode::FailBase, "no response produced"))
        })
    }
}

impl PipelineContext for DiscoverContext {
    type Field = DiscoverField;

    fn seeded() -> &'static [DiscoverField] {
        &[DiscoverField::Request]
    }

    fn errors(&mut self) -> &mut FirstError {
        &mut self.errors
    }

    fn first_error(&self) -> Option<&TaskError> {
        self.errors.get()
    }
}

fn not_found(message: &str) -> TaskError {
    TaskError::new(ErrorCode::ServiceNotFound, message)
}

fn into_code(result: Result<TaskCode, TaskError>) -> TaskCode {
    result.unwrap_or_else(TaskCode::Finish)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Validates the caller and builds the registry find request.
pub struct DiscoverDecode;

impl DiscoverDecode {
    fn decode(ctx: &mut DiscoverContext) -> Result<TaskCode, TaskError> {
        let r = ctx.request.require()?;
        info!(
            client_ip = r.client_ip(),
            app_instance_id = r.header(headers::APP_INSTANCE_ID),
            method = %r.method,
            resource = %r.resource,
            "received discover request"
        );
        if let Err(err) = r.validate_app_instance_id() {
            error!("validate authorization error");
            return Err(err);
        }

        let q = &r.query;
        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        let find = FindInstancesRequest {
            consumer_service_id: r.header(headers::CONSUMER_ID).to_string(),
            app_id: or_default(q.get(query::INSTANCE_ID), DEFAULT_SCOPE),
            service_name: q.get(query::SER_NAME).to_string(),
            version_rule: or_default(q.get(query::VERSION), DEFAULT_VERSION_RULE),
            environment: q.get(query::ENV).to_string(),
            tags: q
                .get(query::TAGS)
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        };
        let scope = TargetScope::new(
            r.header(headers::DOMAIN_NAME),
            r.project.as_deref().unwrap_or_default(),
        );
        let params = q.clone();

        ctx.scope.set(scope)?;
        ctx.query.set(params)?;
        ctx.core_request.set(CoreRequest::FindInstances(find))?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<DiscoverContext> for DiscoverDecode {
    fn name(&self) -> &'static str {
        "discover-decode"
    }

    fn inputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::Request]
    }

    fn outputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::Scope, DiscoverField::QueryParam, DiscoverField::CoreRequest]
    }

    async fn on_request(&self, ctx: &mut DiscoverContext) -> TaskCode {
        into_code(Self::decode(ctx))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Answers the find request from the local index (no service name) or the
/// registry, then applies the instance-id and app-instance-id filters.
pub struct DiscoverService {
    registry: Arc<dyn InstanceStore>,
    index: Arc<LocalIndex>,
}

impl DiscoverService {
    #[must_use]
    pub fn new(registry: Arc<dyn InstanceStore>, index: Arc<LocalIndex>) -> Self {
        Self { registry, index }
    }

    async fn dispatch(&self, ctx: &mut DiscoverContext) -> Result<TaskCode, TaskError> {
        let CoreRequest::FindInstances(req) = ctx.core_request.require()? else {
            error!("cast input to find-instance-request failed");
            return Err(not_found("cast to instance request failed"));
        };
        let params = ctx.query.require()?;
        let app_instance_id = ctx.request.require()?.app_instance_id.as_str();
        debug!(app_id = %req.app_id, service = %req.service_name, "discover dispatch");

        let mut rsp = if req.service_name.is_empty() {
            match self.index.find_instance_by_key(params) {
                Err(e) => {
                    error!(error = %e, "failed to find instance");
                    return Err(not_found("failed to find the instance"));
                }
                Ok(None) => {
                    error!("failed to find instance");
                    return Err(not_found("could not find any instance"));
                }
                Ok(Some(rsp)) => rsp,
            }
        } else {
            let scope = ctx.scope.require()?;
            match self.registry.find(scope, req).await {
                Ok(rsp) => rsp,
                Err(e) => {
                    error!(error = %e, "failed to find instance request");
                    return Err(not_found("failed to find instance request"));
                }
            }
        };

        if rsp.failure().is_none() {
            if !filter_instance_id(&mut rsp, &req.app_id) {
                error!(instance_id = %req.app_id, "instance id not found");
                return Err(not_found("instance id not found"));
            }
            filter_app_instance_id(&mut rsp, app_instance_id);
        }

        ctx.core_rsp.set(CoreResponse::FindInstances(rsp))?;
        Ok(TaskCode::Continue)
    }
}

/// Keeps only the instance whose composite id is `instance_id`, unless it
/// is the default. Returns `false` when nothing is left.
fn filter_instance_id(rsp: &mut FindInstancesResponse, instance_id: &str) -> bool {
    if instance_id == DEFAULT_SCOPE {
        return true;
    }
    rsp.instances.retain(|inst| inst.composite_id() == instance_id);
    !rsp.instances.is_empty()
}

/// Keeps instances registered by the calling app instance (the path
/// parameter). An empty result is fine.
fn filter_app_instance_id(rsp: &mut FindInstancesResponse, app_instance_id: &str) {
    if app_instance_id.is_empty() {
        return;
    }
    rsp.instances.retain(|inst: &MicroServiceInstance| {
        inst.properties.get(keys::APP_INSTANCE_ID).map(String::as_str) == Some(app_instance_id)
    });
}

#[async_trait]
impl Task<DiscoverContext> for DiscoverService {
    fn name(&self) -> &'static str {
        "discover-service"
    }

    fn inputs(&self) -> &'static [DiscoverField] {
        &[
            DiscoverField::Request,
            DiscoverField::Scope,
            DiscoverField::QueryParam,
            DiscoverField::CoreRequest,
        ]
    }

    fn outputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::CoreRsp]
    }

    async fn on_request(&self, ctx: &mut DiscoverContext) -> TaskCode {
        into_code(self.dispatch(ctx).await)
    }
}

// ---------------------------------------------------------------------------
// Transcode
// ---------------------------------------------------------------------------

/// Converts registry instances back into service descriptions, or forwards
/// a non-success registry status.
pub struct ToStrDiscover;

impl ToStrDiscover {
    fn transcode(ctx: &mut DiscoverContext) -> Result<TaskCode, TaskError> {
        let CoreResponse::FindInstances(rsp) = ctx.core_rsp.require()? else {
            error!("cast input to find-instance-response failed");
            return Err(not_found("cast to instance response failed"));
        };

        if let Some(status) = rsp.failure() {
            let status = status.clone();
            ctx.http_err_inf.set(status)?;
            return Ok(TaskCode::Stop);
        }

        let services: Vec<ServiceInfo> = rsp.instances.iter().map(decode_instance).collect();
        ctx.http_rsp.set(services)?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<DiscoverContext> for ToStrDiscover {
    fn name(&self) -> &'static str {
        "discover-transcode"
    }

    fn inputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::CoreRsp]
    }

    fn outputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::HttpErrInf, DiscoverField::HttpRsp]
    }

    async fn on_request(&self, ctx: &mut DiscoverContext) -> TaskCode {
        into_code(Self::transcode(ctx))
    }
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// Lets the configured [`ApiHook`] replace every result's endpoint.
pub struct RspHook {
    hook: Option<Arc<dyn ApiHook>>,
}

impl RspHook {
    #[must_use]
    pub fn new(hook: Option<Arc<dyn ApiHook>>) -> Self {
        Self { hook }
    }

    fn apply(&self, ctx: &mut DiscoverContext) -> Result<TaskCode, TaskError> {
        let Some(hook) = &self.hook else {
            return Ok(TaskCode::Continue);
        };
        if ctx.http_rsp.require()?.is_empty() {
            return Ok(TaskCode::Continue);
        }
        if ctx.request.require()?.header(headers::CONSUMER_NAME) == GATEWAY_CONSUMER {
            return Ok(TaskCode::Continue);
        }

        let endpoint = hook.endpoint();
        if endpoint.uris.is_empty() && endpoint.addresses.is_empty() {
            debug!("api hook returned no endpoint, results left unchanged");
            return Ok(TaskCode::Continue);
        }
        ctx.hook_rsp.set(endpoint)?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<DiscoverContext> for RspHook {
    fn name(&self) -> &'static str {
        "discover-hook"
    }

    fn inputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::Request, DiscoverField::HttpRsp]
    }

    fn outputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::HookRsp]
    }

    async fn on_request(&self, ctx: &mut DiscoverContext) -> TaskCode {
        into_code(self.apply(ctx))
    }
}

// ---------------------------------------------------------------------------
// Encode (finalizer)
// ---------------------------------------------------------------------------

/// Serializes the outcome. Runs even after an earlier stage failed, in
/// which case the recorded error becomes the reply.
pub struct DiscoverEncode;

/// Status used when forwarding a registry failure.
const REGISTRY_FAILURE_STATUS: u16 = 400;

impl DiscoverEncode {
    fn encode(ctx: &mut DiscoverContext) -> Result<TaskCode, TaskError> {
        if ctx.first_error().is_some() {
            return Ok(TaskCode::Continue);
        }

        let marshal_failed =
            |e: serde_json::Error| {
                error!(error = %e, "http response marshal fail");
                TaskError::new(ErrorCode::FailBase, "http response marshal fail")
            };

        let reply = if let Some(status) = ctx.http_err_inf.get() {
            MepReply::json(REGISTRY_FAILURE_STATUS, status).map_err(marshal_failed)?
        } else {
            let services = ctx.http_rsp.get().map_or(&[][..], Vec::as_slice);
            match ctx.hook_rsp.get() {
                Some(endpoint) => {
                    let hooked: Vec<ServiceInfo> = services
                        .iter()
                        .map(|s| {
                            let mut s = s.clone();
                            s.transport_info.endpoint = endpoint.clone();
                            s
                        })
                        .collect();
                    MepReply::json(200, &hooked).map_err(marshal_failed)?
                }
                None => MepReply::json(200, services).map_err(marshal_failed)?,
            }
        };
        ctx.reply.set(reply)?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<DiscoverContext> for DiscoverEncode {
    fn name(&self) -> &'static str {
        "discover-encode"
    }

    fn inputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::HttpErrInf, DiscoverField::HttpRsp, DiscoverField::HookRsp]
    }

    fn outputs(&self) -> &'static [DiscoverField] {
        &[DiscoverField::Reply]
    }

    async fn on_request(&self, ctx: &mut DiscoverContext) -> TaskCode {
        into_code(Self::encode(ctx))
    }
}

/// Builds the discover pipeline over `deps`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the stage wiring is inconsistent.
pub fn discover_pipeline(deps: &Mp1Deps) -> Result<Pipeline<DiscoverContext>, PipelineError> {
    Pipeline::builder("discover")
        .stage(DiscoverDecode)
        .stage(DiscoverService::new(Arc::clone(&deps.registry), Arc::clone(&deps.index)))
        .stage(ToStrDiscover)
        .stage(RspHook::new(deps.hook.clone()))
        .finish_with(DiscoverEncode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
