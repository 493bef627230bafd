//! Per-request plugin dispatch.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{
    BoxError, ContextSettings, Error, RequestContext, ResponseBody, ResponseHandle, Result,
};
use crate::plugin::PluginChain;

const GENERIC_MESSAGE: &str = "internal server error";

/// Runs the plugin chain for every request and hands back the response.
///
/// Shared by all connections of a server.
pub struct Dispatcher {
    chain: PluginChain,
    settings: Arc<ContextSettings>,
    security: Vec<(HeaderName, HeaderValue)>,
    debug: bool,
    access_log: bool,
    abort: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        chain: PluginChain,
        settings: Arc<ContextSettings>,
        security: Vec<(HeaderName, HeaderValue)>,
    ) -> Self {
        Self {
            chain,
            settings,
            security,
            debug: false,
            access_log: false,
            abort: CancellationToken::new(),
        }
    }

    /// Expose plugin error messages in 500 bodies.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn with_access_log(mut self, enabled: bool) -> Self {
        self.access_log = enabled;
        self
    }

    /// Parent of every request's cancellation token.
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    #[inline]
    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }

    /// Handle one request.
    ///
    /// Returns `Err` only when the response was aborted; the transport then
    /// drops the connection (HTTP/1) or resets the stream (HTTP/2).
    pub async fn dispatch<B>(&self, request: http::Request<B>) -> Result<http::Response<ResponseBody>>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();

        // Cancelled if hyper drops this future or the server force-stops
        let token = self.abort.child_token();
        let guard = token.clone().drop_guard();

        let mut response =
            ResponseHandle::new().with_body_suppressed(request.method() == Method::HEAD);
        for (name, value) in &self.security {
            response.set_header_value(name.clone(), value.clone());
        }

        let request = request.map(|body| body.map_err(Into::into).boxed_unsync());
        let mut ctx = RequestContext::new(request, response, Arc::clone(&self.settings))
            .with_cancellation(token);

        if let Err(e) = self.run_chain(&mut ctx).await {
            self.fail(&mut ctx, &e);
        }

        if !ctx.is_finished() {
            if let Err(e) = ctx.end(None) {
                self.fail(&mut ctx, &e);
            }
        }

        if ctx.response().is_aborted() {
            debug!(method = ctx.method(), path = ctx.path(), "response aborted");
            return Err(Error::Aborted);
        }

        let access = self.access_log.then(|| AccessEntry::new(&ctx, started));
        let completion = ctx.response().completion();
        let response = ctx.response_mut().take_response().ok_or(Error::Aborted)?;

        match completion {
            Some(completion) => {
                tokio::spawn(async move {
                    let outcome = completion.wait().await;
                    // Keep the token alive only for abandoned bodies
                    match outcome {
                        Ok(_) => {
                            let _ = guard.disarm();
                        }
                        Err(_) => drop(guard),
                    }
                    if let Some(access) = access {
                        access.log(outcome.ok());
                    }
                });
            }
            None => {
                let _ = guard.disarm();
            }
        }

        Ok(response)
    }

    async fn run_chain(&self, ctx: &mut RequestContext) -> Result<()> {
        for entry in &self.chain {
            if ctx.is_finished() {
                break;
            }

            let token = ctx.cancellation().clone();
            let result = tokio::select! {
                biased;

                _ = token.cancelled() => None,
                result = entry.plugin().handle(ctx) => Some(result),
            };

            let Some(result) = result else {
                ctx.abort();
                return Err(Error::Aborted);
            };

            let binding = result.map_err(|e| Error::plugin(entry.name(), e))?;
            ctx.set(entry.name(), binding)?;
        }

        Ok(())
    }

    /// Turn a failure into a 500 unless the response is already out.
    fn fail(&self, ctx: &mut RequestContext, err: &Error) {
        if matches!(err, Error::Aborted) {
            debug!(method = ctx.method(), path = ctx.path(), "request cancelled");
            return;
        }

        error!(
            method = ctx.method(),
            path = ctx.path(),
            body = ctx.body().kind(),
            error = %err,
            "request failed"
        );

        if ctx.is_finished() {
            return;
        }

        let message = if self.debug {
            err.client_message()
        } else {
            GENERIC_MESSAGE.to_string()
        };

        ctx.take_body();
        ctx.remove_header(CONTENT_TYPE.as_str())
            .set_code(StatusCode::INTERNAL_SERVER_ERROR)
            .set_message(message);

        if let Err(e) = ctx.end(None) {
            error!(error = %e, "error response could not be written");
            ctx.abort();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("plugins", &self.chain.names())
            .field("debug", &self.debug)
            .field("access_log", &self.access_log)
            .finish()
    }
}

/// Fields of one access log line, captured before the body is written.
struct AccessEntry {
    method: String,
    path: String,
    status: u16,
    http: String,
    ip: String,
    request_id: String,
    started: Instant,
}

impl AccessEntry {
    fn new(ctx: &RequestContext, started: Instant) -> Self {
        Self {
            method: ctx.method().to_string(),
            path: ctx.path().to_string(),
            status: ctx.code().as_u16(),
            http: format!("{:?}", ctx.version()),
            ip: ctx
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            request_id: ctx
                .value("requestId")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            started,
        }
    }

    /// `bytes` is `None` when the body was not fully written.
    fn log(self, bytes: Option<u64>) {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        info!(
            target: "access",
            method = %self.method,
            path = %self.path,
            status = self.status,
            http = %self.http,
            ip = %self.ip,
            request_id = %self.request_id,
            bytes = bytes.unwrap_or(0),
            complete = bytes.is_some(),
            duration_ms,
            "request completed"
        );
    }
}
