//! HTTP/1.1 accept loop.
//!
//! One tokio task per connection; requests on different connections never
//! wait on each other.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::routes;
use crate::state::AppState;

/// Bound, not yet serving harness.
#[derive(Debug)]
pub struct HarnessServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl HarnessServer {
    /// Binds to the configured listen address.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn bind(state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(state.config().listen_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    ///
    /// # Errors
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    ///
    /// Accept errors are logged and skipped, so this only returns once
    /// shutdown is requested.
    ///
    /// # Errors
    /// Reserved for listener failures; none are raised today.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let service = service_fn(move |request| {
                            routes::dispatch(Arc::clone(&state), request)
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            tracing::debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
            }
        }
    }
}
