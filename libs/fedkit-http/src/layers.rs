use std::task::{Context, Poll};

use http::header::USER_AGENT;
use http::{HeaderValue, Request};
use tower::{Layer, Service};

use crate::error::HttpError;

/// Stamps outgoing manifest requests with the host's user agent, leaving
/// any caller-supplied value untouched.
#[derive(Clone, Debug)]
pub struct UserAgentLayer {
    value: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// `HttpError::InvalidHeaderValue` if `agent` cannot be a header value.
    pub fn try_new(agent: impl AsRef<str>) -> Result<Self, HttpError> {
        Ok(Self {
            value: HeaderValue::from_str(agent.as_ref())?,
        })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            value: self.value.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UserAgentService<S> {
    inner: S,
    value: HeaderValue,
}

impl<S, B> Service<Request<B>> for UserAgentService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.value.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::Response;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn seen_agent(layer: &UserAgentLayer, preset: Option<&str>) -> String {
        let svc = layer.layer(service_fn(|req: Request<()>| async move {
            let agent = req
                .headers()
                .get(USER_AGENT)
                .map(|v| v.to_str().unwrap().to_owned())
                .unwrap_or_default();
            Ok::<_, std::convert::Infallible>(Response::new(agent))
        }));

        let mut req = Request::get("http://localhost/remoteEntry.json");
        if let Some(agent) = preset {
            req = req.header(USER_AGENT, agent);
        }
        svc.oneshot(req.body(()).unwrap())
            .await
            .unwrap()
            .into_body()
    }

    #[tokio::test]
    async fn fills_in_missing_agent() {
        let layer = UserAgentLayer::try_new("federation-host/1.0").unwrap();
        assert_eq!(seen_agent(&layer, None).await, "federation-host/1.0");
    }

    #[tokio::test]
    async fn caller_agent_wins() {
        let layer = UserAgentLayer::try_new("federation-host/1.0").unwrap();
        assert_eq!(seen_agent(&layer, Some("pulsegrid-admin/2.0")).await, "pulsegrid-admin/2.0");
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(matches!(
            UserAgentLayer::try_new("bad\nagent"),
            Err(HttpError::InvalidHeaderValue(_))
        ));
    }
}
