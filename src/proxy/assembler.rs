//! Turns transport signals into [`ProxyResult`]s and hands them to the caller
//! waiting on the matching registry entry.

use crate::proxy::message::{ErrorResponse, HttpResponse, ProxyResponse, ProxyResult, ProxyTransportInfo};
use crate::proxy::payload::encode_for_wire;
use crate::proxy::registry::{PendingRegistry, ProxyId};
use crate::proxy::transport::{TransportFailure, TransportInfo, TransportOutput};

/// Deliver a completed exchange.
///
/// Signals for ids that are no longer pending are dropped.
pub fn complete(registry: &PendingRegistry, id: ProxyId, output: TransportOutput) {
    let Some(operation) = registry.resolve(id) else {
        tracing::debug!(proxy_id = %id, "Discarding late completion for unknown operation");
        return;
    };

    let TransportOutput { response, info } = output;
    let response = HttpResponse {
        status: response.status,
        status_text: response.status_text,
        headers: response.headers,
        payload: response.payload.as_deref().map(encode_for_wire),
        loading_time: response.loading_time,
    };
    let result = ProxyResult {
        response: ProxyResponse::Success(response),
        transport: transport_info(Some(info)),
    };

    if !operation.deliver(result) {
        tracing::debug!(proxy_id = %id, "Caller went away before completion");
    }
}

/// Deliver a failed exchange as an error-shaped result.
pub fn fail(registry: &PendingRegistry, id: ProxyId, failure: TransportFailure) {
    let Some(operation) = registry.resolve(id) else {
        tracing::debug!(proxy_id = %id, error = %failure, "Discarding late failure for unknown operation");
        return;
    };

    let TransportFailure {
        message,
        info,
        response,
    } = failure;
    let response = response.unwrap_or_else(|| ErrorResponse::from_message(message));
    let result = ProxyResult {
        response: ProxyResponse::Error(response),
        transport: transport_info(info),
    };

    if !operation.deliver(result) {
        tracing::debug!(proxy_id = %id, "Caller went away before failure");
    }
}

fn transport_info(info: Option<TransportInfo>) -> ProxyTransportInfo {
    match info {
        Some(info) => ProxyTransportInfo {
            start_time: info.start_time,
            end_time: info.end_time,
            http_message: info.http_message.as_deref().map(encode_for_wire),
        },
        None => ProxyTransportInfo::default(),
    }
}
