use crate::error::FailedRequest;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use ticketing_logging::RequestContext;
use ticketing_models::LogLevel;

/// Copy every failed request into the persistent log pipeline.
///
/// Handlers return [`ApiError`](crate::error::ApiError), which leaves a
/// [`FailedRequest`] on the response; the request details are captured here
/// because the error itself never sees the request. The record is attributed
/// to where the error was raised.
pub async fn log_failures(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let context = RequestContext::from_request(
        request.method(),
        request.uri(),
        request.headers(),
        peer,
    );

    let response = next.run(request).await;

    if let Some(failed) = response.extensions().get::<FailedRequest>() {
        let context = context.with_status(response.status().as_u16());
        state.log_sink.log_from(
            LogLevel::Error,
            failed.message.clone(),
            Some(&context),
            failed.origin.clone(),
        );
    }

    response
}
