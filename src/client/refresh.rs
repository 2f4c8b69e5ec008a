//! Single-flight session refresh.
//!
//! However many callers discover an expired session at the same time, exactly one
//! refresh call is made and every caller observes its outcome. The in-flight slot is
//! emptied by the refresh itself as it settles, so a later expiry starts a new attempt.

use std::{
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::{
    gateway::{ForgeryToken, prepare},
    transport::{ApiRequest, Transport},
};

/// Performs one refresh of the session credentials. `true` means the session is usable again.
pub trait SessionRefresher: Send + Sync + 'static {
    fn refresh(&self) -> impl Future<Output = bool> + Send;
}

type PendingRefresh = Shared<BoxFuture<'static, bool>>;

struct Inner<R> {
    refresher: R,
    in_flight: Mutex<Option<PendingRefresh>>,
    attempts: AtomicU64,
}

pub struct TokenRefreshCoordinator<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for TokenRefreshCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: SessionRefresher> TokenRefreshCoordinator<R> {
    pub fn new(refresher: R) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                in_flight: Mutex::new(None),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn refresher(&self) -> &R {
        &self.inner.refresher
    }

    /// Number of refresh calls started so far.
    pub fn refresh_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Join the outstanding refresh, or start one if none is running.
    pub async fn ensure_fresh_session(&self) -> bool {
        let pending = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight session refresh");
                    pending.clone()
                }
                None => {
                    let attempt = self.inner.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        let refreshed = inner.refresher.refresh().await;
                        inner
                            .in_flight
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        debug!(attempt, refreshed, "Session refresh settled");
                        refreshed
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }
}

/// Refresh through the authentication service's refresh endpoint.
pub struct RefreshEndpoint<T> {
    transport: Arc<T>,
    path: String,
    forgery: ForgeryToken,
}

impl<T: Transport> RefreshEndpoint<T> {
    pub fn new(transport: Arc<T>, path: impl Into<String>, forgery: ForgeryToken) -> Self {
        Self {
            transport,
            path: path.into(),
            forgery,
        }
    }
}

impl<T: Transport> SessionRefresher for RefreshEndpoint<T> {
    async fn refresh(&self) -> bool {
        let request = prepare(ApiRequest::post(self.path.as_str()), &self.forgery);

        match self.transport.send(request).await {
            Ok(response) if response.is_success_status() => true,
            Ok(response) => {
                debug!(status = response.status, "Session refresh rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                false
            }
        }
    }
}
