//! Per-usage-site mount state machine.
//!
//! ```text
//!            load ok               render fault
//! Loading ------------> Ready -------------------> Failed
//!    |                                               ^
//!    +----------------------- load error ------------+
//! ```
//!
//! `Failed` is terminal. `Ready` only leaves for `Failed` through a render
//! fault. A torn-down boundary accepts no transition at all, so a load that
//! settles after [`MountBoundary::unmount`] is discarded.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{FailureKind, LoadError};
use crate::failure::FailureNotice;
use crate::loader::RemoteLoader;
use crate::properties::Properties;
use crate::unit::UnitHandle;
use crate::view::Node;

/// Time-ordered identifier of one mount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(Uuid);

impl MountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct MountRequest {
    pub id: MountId,
    pub remote: String,
    pub unit: String,
    /// Properties supplied at mount time
    pub properties: Properties,
}

impl MountRequest {
    #[must_use]
    pub fn new(remote: impl Into<String>, unit: impl Into<String>, properties: Properties) -> Self {
        Self {
            id: MountId::new(),
            remote: remote.into(),
            unit: unit.into(),
            properties,
        }
    }

    /// Same target and properties under a fresh id.
    #[must_use]
    pub fn renewed(&self) -> Self {
        Self {
            id: MountId::new(),
            ..self.clone()
        }
    }
}

/// Typed failure stored in a `Failed` boundary.
#[derive(Debug, Clone)]
pub struct MountFailure {
    error: Arc<LoadError>,
    unit: String,
}

impl MountFailure {
    fn new(error: LoadError, unit: &str) -> Self {
        Self {
            error: Arc::new(error),
            unit: unit.to_owned(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }

    #[must_use]
    pub fn error(&self) -> &LoadError {
        &self.error
    }

    pub fn notice(&self) -> FailureNotice {
        FailureNotice::from_error(&self.error, &self.unit)
    }
}

#[derive(Debug, Clone)]
pub enum MountState {
    Loading,
    Ready(UnitHandle),
    Failed(MountFailure),
}

impl MountState {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&MountFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    fn accepts(&self, next: &MountState) -> bool {
        match (self, next) {
            (Self::Loading, Self::Ready(_) | Self::Failed(_)) => true,
            (Self::Ready(_), Self::Failed(failure)) => failure.kind() == FailureKind::RenderFault,
            _ => false,
        }
    }
}

/// Deterministic output while a unit is loading.
#[must_use]
pub fn placeholder(request: &MountRequest) -> Node {
    Node::element("div")
        .attr("class", "federation-loading")
        .attr("aria-busy", "true")
        .attr("data-remote", &request.remote)
        .attr("data-unit", &request.unit)
        .child(Node::text(format!("Loading {}...", request.unit)))
}

/// Failure-isolating mount site for one [`MountRequest`].
///
/// Renders use the request's properties until the host supplies a new bag
/// through [`render_with`](Self::render_with) or
/// [`set_properties`](Self::set_properties).
/// Dropping the boundary tears it down like [`unmount`](Self::unmount).
pub struct MountBoundary {
    request: MountRequest,
    props: Mutex<Properties>,
    loader: Arc<RemoteLoader>,
    state: Arc<watch::Sender<MountState>>,
    cancel: CancellationToken,
    span: tracing::Span,
}

impl MountBoundary {
    /// Enter `Loading` and start the load on a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn mount(loader: Arc<RemoteLoader>, request: MountRequest) -> Self {
        let (tx, _) = watch::channel(MountState::Loading);
        let state = Arc::new(tx);
        let cancel = CancellationToken::new();
        let span = tracing::info_span!(
            "federation.mount",
            mount_id = %request.id,
            remote = %request.remote,
            unit = %request.unit
        );
        span.in_scope(|| tracing::info!("mounting"));

        let task = {
            let loader = Arc::clone(&loader);
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            let remote = request.remote.clone();
            let unit = request.unit.clone();
            async move {
                let result = loader.load(&remote, &unit, &cancel).await;
                if cancel.is_cancelled() {
                    tracing::warn!("boundary torn down before load settled; discarding result");
                    return;
                }
                let next = match result {
                    Ok(handle) => MountState::Ready(handle),
                    Err(err) => {
                        tracing::warn!(kind = %err.kind(), error = %err, "load failed");
                        MountState::Failed(MountFailure::new(err, &unit))
                    }
                };
                transition(&state, &cancel, next);
            }
        };
        tokio::spawn(task.instrument(span.clone()));

        Self {
            props: Mutex::new(request.properties.clone()),
            request,
            loader,
            state,
            cancel,
            span,
        }
    }

    /// Tear this boundary down and mount the same target, with the latest
    /// properties, under a fresh request.
    #[must_use]
    pub fn remount(&self) -> Self {
        self.unmount();
        let request = MountRequest {
            properties: self.properties(),
            ..self.request.renewed()
        };
        Self::mount(Arc::clone(&self.loader), request)
    }

    #[must_use]
    pub fn id(&self) -> MountId {
        self.request.id
    }

    #[must_use]
    pub fn request(&self) -> &MountRequest {
        &self.request
    }

    /// Properties the next [`render`](Self::render) passes to the unit.
    #[must_use]
    pub fn properties(&self) -> Properties {
        self.props.lock().clone()
    }

    /// Replace the property bag without rendering. The state is unchanged.
    pub fn set_properties(&self, props: Properties) {
        *self.props.lock() = props;
    }

    #[must_use]
    pub fn state(&self) -> MountState {
        self.state.borrow().clone()
    }

    /// Watch state changes of this boundary.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MountState> {
        self.state.subscribe()
    }

    /// Wait until the boundary leaves `Loading`.
    ///
    /// Never completes for a boundary torn down while loading, nor for a
    /// fetch that never settles.
    pub async fn settled(&self) -> MountState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Cancel any outstanding load; no further transitions are accepted.
    pub fn unmount(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            self.span.in_scope(|| tracing::info!("unmounted"));
        }
    }

    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Store `props` as the current bag, then [`render`](Self::render).
    pub fn render_with(&self, props: Properties) -> Node {
        self.set_properties(props);
        self.render()
    }

    /// Output for the current state.
    ///
    /// `Ready` renders the unit with the current properties, reusing the
    /// linked handle. An error or panic raised by the unit moves the boundary
    /// to `Failed(RenderFault)` and the fallback is returned instead; nothing
    /// propagates to the caller.
    pub fn render(&self) -> Node {
        let _entered = self.span.enter();
        let current = self.state();
        match current {
            MountState::Loading => placeholder(&self.request),
            MountState::Failed(failure) => failure.notice().to_node(),
            MountState::Ready(handle) => match handle.render(&self.properties()) {
                Ok(node) => node,
                Err(err) => {
                    tracing::error!(error = %err, "unit failed while rendering; isolating");
                    let failure = MountFailure::new(
                        LoadError::RenderFault {
                            remote: self.request.remote.clone(),
                            unit: self.request.unit.clone(),
                            message: err.message().to_owned(),
                        },
                        &self.request.unit,
                    );
                    let fallback = failure.notice().to_node();
                    transition(&self.state, &self.cancel, MountState::Failed(failure));
                    fallback
                }
            },
        }
    }
}

impl Drop for MountBoundary {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for MountBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountBoundary")
            .field("id", &self.request.id)
            .field("remote", &self.request.remote)
            .field("unit", &self.request.unit)
            .field("state", &self.state.borrow().name())
            .finish_non_exhaustive()
    }
}

/// Apply `next` if the boundary is live and the move is allowed.
fn transition(
    state: &watch::Sender<MountState>,
    cancel: &CancellationToken,
    next: MountState,
) -> bool {
    state.send_if_modified(|current| {
        if cancel.is_cancelled() {
            tracing::debug!(to = next.name(), "transition refused; boundary torn down");
            return false;
        }
        if !current.accepts(&next) {
            tracing::debug!(from = current.name(), to = next.name(), "transition refused");
            return false;
        }
        tracing::info!(from = current.name(), to = next.name(), "mount state changed");
        *current = next;
        true
    })
}
