//! HTTP server loop.
//!
//! A thin hyper HTTP/1.1 accept loop in front of the dispatcher. Request
//! bodies are collected (bounded) before dispatch: the authenticator needs
//! the exact body bytes, and every payload this service accepts is small.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use tokio::net::TcpListener;

use crate::dispatcher::Dispatcher;
use crate::types::{BoxError, Response};

/// Largest request body the server will buffer.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runs the accept loop until the process is stopped.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> Result<(), BoxError> {
    tracing::info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, _addr) = listener.accept().await?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let dispatcher = dispatcher.clone();

        // One task per connection; requests on it are handled in sequence.
        tokio::spawn(async move {
            let service = service_fn(move |request: hyper::Request<Incoming>| {
                let dispatcher = dispatcher.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    let collected = match Limited::new(body, MAX_BODY_BYTES).collect().await {
                        Ok(collected) => collected.to_bytes(),
                        Err(_) => return Ok::<_, Infallible>(payload_too_large()),
                    };
                    let request = http::Request::from_parts(parts, collected);
                    Ok(dispatcher.dispatch(request).await)
                }
            });

            let connection = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service);
            if let Err(err) = connection.await {
                tracing::debug!(error = %err, "connection closed with error");
            }
        });
    }
}

fn payload_too_large() -> Response {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
    response
}
