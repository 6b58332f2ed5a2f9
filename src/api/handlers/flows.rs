//! Flow endpoints.
//!
//! Every handler is a thin translation between HTTP and the controller:
//! request metadata becomes an [`HttpContext`], controller results become
//! [`FlowReply`] or [`ApiError`].

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::{net::IpAddr, net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::api::FlowService;
use crate::api::types::{ActionInput, ApiError, FailureBody, FlowBody, FlowReply, failure};
use crate::config::HttpConfig;
use crate::flow::{ErrorCode, HttpContext};

#[utoipa::path(
    post,
    path = "/v1/flows",
    responses (
        (status = 201, description = "Flow created", body = FlowBody),
        (status = 500, description = "Flow could not be created", body = FailureBody),
    ),
    tag = "flows"
)]
#[instrument(skip(flows))]
pub async fn start_flow(flows: Extension<Arc<dyn FlowService>>) -> Response {
    match flows.start().await {
        Ok(response) => {
            let mut reply = FlowReply(response).into_response();
            *reply.status_mut() = StatusCode::CREATED;
            reply
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/flows/{flow_id}",
    params(("flow_id" = Uuid, Path, description = "Flow identifier")),
    responses (
        (status = 200, description = "Current flow state", body = FlowBody),
        (status = 404, description = "Unknown flow", body = FailureBody),
        (status = 410, description = "Flow expired", body = FailureBody),
    ),
    tag = "flows"
)]
#[instrument(skip(flows))]
pub async fn describe_flow(
    Path(flow_id): Path<String>,
    flows: Extension<Arc<dyn FlowService>>,
) -> Response {
    let Some(flow_id) = parse_flow_id(&flow_id) else {
        return failure(ErrorCode::FlowNotFound);
    };
    match flows.describe(flow_id).await {
        Ok(response) => FlowReply(response).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/flows/{flow_id}/actions/{action}",
    params(
        ("flow_id" = Uuid, Path, description = "Flow identifier"),
        ("action" = String, Path, description = "Action name, as listed by the flow"),
    ),
    request_body(content = ActionInput, description = "Inputs declared by the action", content_type = "application/json"),
    responses (
        (status = 200, description = "Step completed", body = FlowBody),
        (status = 400, description = "Form data invalid", body = FlowBody),
        (status = 401, description = "Credential rejected", body = FlowBody),
        (status = 403, description = "Action not available", body = FlowBody),
        (status = 404, description = "Unknown flow", body = FailureBody),
        (status = 410, description = "Flow expired", body = FailureBody),
        (status = 500, description = "Technical error", body = FailureBody),
    ),
    tag = "flows"
)]
#[instrument(skip(headers, connect, flows, config, body))]
pub async fn execute_action(
    Path((flow_id, action)): Path<(String, String)>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    flows: Extension<Arc<dyn FlowService>>,
    Extension(config): Extension<HttpConfig>,
    body: Bytes,
) -> Response {
    let Some(flow_id) = parse_flow_id(&flow_id) else {
        return failure(ErrorCode::FlowNotFound);
    };

    let input = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(err) => {
                debug!("Rejecting undecodable input: {err}");
                return failure(ErrorCode::FormDataInvalid);
            }
        }
    };

    let http = http_context(
        &headers,
        connect.map(|ConnectInfo(addr)| addr.ip()),
        config.trust_proxy_headers(),
    );

    match flows.execute(flow_id, &action, input, &http).await {
        Ok(response) => FlowReply(response).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/flows/{flow_id}/back",
    params(("flow_id" = Uuid, Path, description = "Flow identifier")),
    responses (
        (status = 200, description = "Last step reverted", body = FlowBody),
        (status = 404, description = "Unknown flow", body = FailureBody),
        (status = 409, description = "Flow cannot be reverted", body = FailureBody),
        (status = 410, description = "Flow expired", body = FailureBody),
    ),
    tag = "flows"
)]
#[instrument(skip(flows))]
pub async fn back(
    Path(flow_id): Path<String>,
    flows: Extension<Arc<dyn FlowService>>,
) -> Response {
    let Some(flow_id) = parse_flow_id(&flow_id) else {
        return failure(ErrorCode::FlowNotFound);
    };
    match flows.back(flow_id).await {
        Ok(response) => FlowReply(response).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

fn parse_flow_id(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

fn http_context(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> HttpContext {
    let forwarded = if trust_proxy {
        client_ip(headers)
    } else {
        None
    };
    HttpContext {
        ip_address: forwarded.or(peer).map(|ip| ip.to_string()),
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
        request_id: header_str(headers, "x-request-id").map(str::to_string),
    }
}

/// Client address from proxy headers. Any client can set these, so they are
/// only read when a trusted proxy sits in front of the service. Values that
/// are not IP addresses are ignored so they never reach the audit log's
/// `inet` column.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .and_then(|value| value.trim().parse().ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
