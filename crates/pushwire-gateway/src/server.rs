//! Accept loop and per-connection serving.
//!
//! Each accepted socket gets:
//! - a write deadline: a write that makes no progress for
//!   `gateway.write_timeout_ms` fails the connection
//! - a [`ConnectionAbort`] switch, inserted into every request's extensions;
//!   firing it drops the connection immediately, socket included
//!
//! The bus fires the switch when it evicts the connection's subscriber, so a
//! peer that stopped reading is cut off at once instead of after hyper's
//! blocked write gives up.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{extract::Request, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tokio::time::Sleep;
use tower::Service;

use crate::app_state::AppState;
use crate::router::build_router;

/// Kill switch for one accepted connection.
#[derive(Clone, Default)]
pub struct ConnectionAbort(Arc<Notify>);

impl ConnectionAbort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the connection. Safe to call more than once or before the
    /// connection task starts waiting.
    pub fn abort(&self) {
        self.0.notify_one();
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        self.0.notified().await;
    }
}

/// Serve the gateway on `listener` until `shutdown` resolves, then stop
/// accepting and let open connections finish. Idle keep-alive connections
/// close at once; streams end through the app's own drain.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let app = build_router(state.clone());
    let write_timeout = state.cfg().gateway.write_timeout();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut conns = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            r = listener.accept() => r,
            _ = &mut shutdown => break,
        };
        let (tcp, peer) = match accepted {
            Ok(a) => a,
            Err(e) => {
                // EMFILE and friends: give the process a moment to free fds
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }

        conns.spawn(serve_connection(
            tcp,
            peer,
            app.clone(),
            write_timeout,
            stop_rx.clone(),
        ));
        while conns.try_join_next().is_some() {}
    }

    stop_tx.send_replace(true);
    drop(listener);
    tracing::info!(open = conns.len(), "listener closed, draining connections");
    while conns.join_next().await.is_some() {}
    Ok(())
}

async fn serve_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    app: Router,
    write_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let abort = ConnectionAbort::new();
    let io = TokioIo::new(WriteDeadline::new(tcp, write_timeout));
    let svc = {
        let abort = abort.clone();
        service_fn(move |mut req: Request<Incoming>| {
            req.extensions_mut().insert(abort.clone());
            app.clone().call(req)
        })
    };

    let conn = http1::Builder::new().serve_connection(io, svc);
    tokio::pin!(conn);
    let mut draining = false;

    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(%peer, error = %e, "connection ended with error");
                }
                return;
            }
            _ = abort.aborted() => {
                tracing::info!(%peer, "connection aborted");
                return;
            }
            _ = shutdown.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// IO wrapper that fails a write (or flush) stuck for longer than `timeout`.
///
/// The clock starts when the inner writer first returns `Pending` and is
/// cleared on any progress.
pub struct WriteDeadline<T> {
    inner: T,
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<T> WriteDeadline<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: None,
        }
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        let timeout = self.timeout;
        let sleep = self
            .deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.deadline = None;
                Poll::Ready(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write stalled for {}ms", timeout.as_millis()),
                ))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn track<R>(&mut self, cx: &mut Context<'_>, polled: Poll<io::Result<R>>) -> Poll<io::Result<R>> {
        match polled {
            Poll::Ready(r) => {
                self.deadline = None;
                Poll::Ready(r)
            }
            Poll::Pending => self.poll_deadline(cx).map(Err),
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for WriteDeadline<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for WriteDeadline<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.track(cx, polled)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        this.track(cx, polled)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_flush(cx);
        this.track(cx, polled)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
