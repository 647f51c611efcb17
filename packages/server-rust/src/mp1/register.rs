//! Service registration: `POST .../applications/{appInstanceId}/services`.

use std::sync::Arc;

use async_trait::async_trait;
use mep_core::properties::keys;
use mep_core::{
    to_micro_service, validate_service_info, EndPointInfo, EndpointKind, ErrorCode, MicroServiceInstance, ServiceInfo,
};
use tracing::{error, info};
use uuid::Uuid;

use super::{headers, CoreRequest, CoreResponse, MepReply, MepRequest, Mp1Deps};
use crate::codec::EndpointResolver;
use crate::pipeline::{
    FirstError, Pipeline, PipelineContext, PipelineError, Slot, Task, TaskCode, TaskError,
};
use crate::store::{InstanceStore, LocalIndex, TargetScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterField {
    Request,
    Scope,
    CoreRequest,
    CoreRsp,
    Reply,
}

/// Per-request state of the register pipeline.
#[derive(Debug)]
pub struct RegisterContext {
    pub request: Slot<MepRequest>,
    pub scope: Slot<TargetScope>,
    pub core_request: Slot<CoreRequest>,
    pub core_rsp: Slot<CoreResponse>,
    pub reply: Slot<MepReply>,
    errors: FirstError,
}

impl RegisterContext {
    #[must_use]
    pub fn new(request: MepRequest) -> Self {
        Self {
            request: Slot::seeded("r", request),
            scope: Slot::new("ctx"),
            core_request: Slot::new("coreRequest"),
            core_rsp: Slot::new("coreRsp"),
            reply: Slot::new("reply"),
            errors: FirstError::default(),
        }
    }

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

impl PipelineContext for RegisterContext {
    type Field = RegisterField;

    fn seeded() -> &'static [RegisterField] {
        &[RegisterField::Request]
    }

    fn errors(&mut self) -> &mut FirstError {
        &mut self.errors
    }

    fn first_error(&self) -> Option<&TaskError> {
        self.errors.get()
    }
}

fn into_code(result: Result<TaskCode, TaskError>) -> TaskCode {
    result.unwrap_or_else(TaskCode::Finish)
}

/// Liveness self-link for a registered instance.
#[must_use]
pub fn liveness_link(app_instance_id: &str, ser_instance_id: &str) -> String {
    format!(
        "/mep/mec_service_mgmt/v1/applications/{app_instance_id}/services/{ser_instance_id}/liveness"
    )
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Authorizes the caller, parses and validates the service description.
pub struct RegisterDecode;

impl RegisterDecode {
    fn decode(ctx: &mut RegisterContext) -> Result<TaskCode, TaskError> {
        let r = ctx.request.require()?;
        info!(
            client_ip = r.client_ip(),
            app_instance_id = r.header(headers::APP_INSTANCE_ID),
            method = %r.method,
            resource = %r.resource,
            "received register request"
        );
        r.validate_app_instance_id()?;

        let info: ServiceInfo = serde_json::from_slice(&r.body).map_err(|e| {
            error!(error = %e, "parse body failed");
            TaskError::new(ErrorCode::ParseInfo, "parse body failed")
        })?;
        validate_service_info(&info).map_err(|e| {
            error!(error = %e, "service info validation failed");
            TaskError::new(ErrorCode::RequestParam, e.to_string())
        })?;

        let scope = TargetScope::new(
            r.header(headers::DOMAIN_NAME),
            r.project.as_deref().unwrap_or_default(),
        );
        ctx.scope.set(scope)?;
        ctx.core_request.set(CoreRequest::Register(Box::new(info)))?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<RegisterContext> for RegisterDecode {
    fn name(&self) -> &'static str {
        "register-decode"
    }

    fn inputs(&self) -> &'static [RegisterField] {
        &[RegisterField::Request]
    }

    fn outputs(&self) -> &'static [RegisterField] {
        &[RegisterField::Scope, RegisterField::CoreRequest]
    }

    async fn on_request(&self, ctx: &mut RegisterContext) -> TaskCode {
        into_code(Self::decode(ctx))
    }
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// Encodes the description, stores it in the registry and the local index.
pub struct RegisterService {
    registry: Arc<dyn InstanceStore>,
    index: Arc<LocalIndex>,
    resolver: Arc<EndpointResolver>,
}

impl RegisterService {
    #[must_use]
    pub fn new(
        registry: Arc<dyn InstanceStore>,
        index: Arc<LocalIndex>,
        resolver: Arc<EndpointResolver>,
    ) -> Self {
        Self {
            registry,
            index,
            resolver,
        }
    }

    async fn register(&self, ctx: &mut RegisterContext) -> Result<TaskCode, TaskError> {
        let CoreRequest::Register(info) = ctx.core_request.require()? else {
            error!("cast input to service info failed");
            return Err(TaskError::new(ErrorCode::FailBase, "cast to service info failed"));
        };
        let mut info = ServiceInfo::clone(info);
        let app_instance_id = ctx.request.require()?.app_instance_id.clone();
        let scope = ctx.scope.require()?.clone();

        let service_id = new_id();
        let instance_id = new_id();
        info.ser_instance_id = format!("{service_id}{instance_id}");
        if info.liveness_interval != 0 {
            info.links.self_link.liveness = liveness_link(&app_instance_id, &info.ser_instance_id);
        }

        let mut service = to_micro_service(&info);
        service.service_id.clone_from(&service_id);
        let mut instance = self.resolver.encode(&mut info).await;
        reply_with_stored_endpoint(&mut info, &instance);
        instance.service_id = service_id;
        instance.instance_id = instance_id;
        instance
            .properties
            .insert(keys::APP_INSTANCE_ID.to_string(), app_instance_id);

        if let Err(e) = self.registry.register(&scope, service, instance.clone()).await {
            error!(service = %info.ser_name, error = %e, "register instance failed");
            return Err(TaskError::new(ErrorCode::FailBase, "register instance failed"));
        }
        self.index.upsert(instance);
        info!(
            service = %info.ser_name,
            ser_instance_id = %info.ser_instance_id,
            "service registered"
        );

        ctx.core_rsp.set(CoreResponse::Registered(Box::new(info)))?;
        Ok(TaskCode::Continue)
    }
}

/// A gateway URI synthesized from addresses replaces the posted endpoint,
/// so the created description matches what discover later returns.
fn reply_with_stored_endpoint(info: &mut ServiceInfo, instance: &MicroServiceInstance) {
    let stored_kind = instance.properties.get(keys::END_POINT_TYPE).map(String::as_str);
    if stored_kind == Some(EndpointKind::Uris.as_str()) && info.transport_info.endpoint.uris.is_empty() {
        info.transport_info.endpoint = EndPointInfo {
            uris: instance.endpoints.clone(),
            ..EndPointInfo::default()
        };
    }
}

#[async_trait]
impl Task<RegisterContext> for RegisterService {
    fn name(&self) -> &'static str {
        "register-service"
    }

    fn inputs(&self) -> &'static [RegisterField] {
        &[RegisterField::Request, RegisterField::Scope, RegisterField::CoreRequest]
    }

    fn outputs(&self) -> &'static [RegisterField] {
        &[RegisterField::CoreRsp]
    }

    async fn on_request(&self, ctx: &mut RegisterContext) -> TaskCode {
        into_code(self.register(ctx).await)
    }
}

// ---------------------------------------------------------------------------
// Encode (finalizer)
// ---------------------------------------------------------------------------

pub struct RegisterEncode;

const CREATED: u16 = 201;

impl RegisterEncode {
    fn encode(ctx: &mut RegisterContext) -> Result<TaskCode, TaskError> {
        if ctx.first_error().is_some() {
            return Ok(TaskCode::Continue);
        }
        let CoreResponse::Registered(info) = ctx.core_rsp.require()? else {
            return Err(TaskError::new(ErrorCode::FailBase, "cast to service info failed"));
        };
        let reply = MepReply::json(CREATED, info.as_ref()).map_err(|e| {
            error!(error = %e, "http response marshal fail");
            TaskError::new(ErrorCode::FailBase, "http response marshal fail")
        })?;
        ctx.reply.set(reply)?;
        Ok(TaskCode::Continue)
    }
}

#[async_trait]
impl Task<RegisterContext> for RegisterEncode {
    fn name(&self) -> &'static str {
        "register-encode"
    }

    fn inputs(&self) -> &'static [RegisterField] {
        &[RegisterField::CoreRsp]
    }

    fn outputs(&self) -> &'static [RegisterField] {
        &[RegisterField::Reply]
    }

    async fn on_request(&self, ctx: &mut RegisterContext) -> TaskCode {
        into_code(Self::encode(ctx))
    }
}

/// Builds the register pipeline over `deps`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the stage wiring is inconsistent.
pub fn register_pipeline(deps: &Mp1Deps) -> Result<Pipeline<RegisterContext>, PipelineError> {
    Pipeline::builder("register")
        .stage(RegisterDecode)
        .stage(RegisterService::new(
            Arc::clone(&deps.registry),
            Arc::clone(&deps.index),
            Arc::clone(&deps.resolver),
        ))
        .finish_with(RegisterEncode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
