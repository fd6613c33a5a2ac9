//! Request/response router.

use std::{panic::AssertUnwindSafe, sync::Arc};

use ext_bridge_core::{Envelope, SenderContext, WireResponse};
use futures::FutureExt;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use uuid::Uuid;

use crate::HandlerTable;

/// Queue depth of a router's inbox.
const INBOX_CAPACITY: usize = 256;

/// A message waiting to be answered, plus the slot for its single reply.
#[derive(Debug)]
pub struct Inbound {
    pub id: Uuid,
    pub envelope: Envelope,
    pub sender: SenderContext,
    pub reply: oneshot::Sender<WireResponse>,
}

/// The router for one context.
///
/// Owns the obligation to answer every inbound message exactly once, whether
/// the handler is quick, slow, failing or panicking.
#[derive(Debug, Clone)]
pub struct Router {
    context: Arc<str>,
    table: Arc<HandlerTable>,
}

impl Router {
    /// Create a router for the context named `context`.
    #[must_use]
    pub fn new(context: impl Into<String>, table: HandlerTable) -> Self {
        Self {
            context: Arc::from(context.into()),
            table: Arc::new(table),
        }
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    /// Produce the response for one message.
    pub async fn dispatch(&self, envelope: Envelope, sender: SenderContext) -> WireResponse {
        let Some(kind) = envelope.message_kind() else {
            tracing::warn!(context = %self.context, kind = %envelope.kind, "Unknown message type");
            return WireResponse::unknown_kind();
        };
        let Some(handler) = self.table.handler(kind) else {
            tracing::warn!(context = %self.context, %kind, "No handler registered");
            return WireResponse::unknown_kind();
        };

        tracing::debug!(context = %self.context, %kind, origin = ?sender.origin, "Dispatching");
        // Handlers may panic before returning a future.
        let pending = futures::future::lazy(move |_| handler(envelope.payload, sender)).flatten();
        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(Ok(data)) => WireResponse::ok(data),
            Ok(Err(e)) => {
                tracing::warn!(context = %self.context, %kind, "Handler failed: {e}");
                WireResponse::err(e.to_string())
            }
            Err(_) => {
                tracing::error!(context = %self.context, %kind, "Handler panicked");
                WireResponse::err(format!("Handler for {kind} panicked"))
            }
        }
    }

    async fn answer(&self, inbound: Inbound) {
        let Inbound {
            id,
            envelope,
            sender,
            reply,
        } = inbound;
        let response = self.dispatch(envelope, sender).await;
        if reply.send(response).is_err() {
            tracing::debug!(context = %self.context, %id, "Caller went away before the reply");
        }
    }

    /// Run the router as its own task.
    ///
    /// Each inbound message is answered on a separate task so a slow handler
    /// never delays the others. Shutting the handle down drops every
    /// in-flight reply slot, which callers observe as a closed port.
    #[must_use]
    pub fn spawn(self) -> RouterHandle {
        let (tx, mut rx) = mpsc::channel::<Inbound>(INBOX_CAPACITY);
        let context = Arc::clone(&self.context);
        let router = Arc::new(self);

        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    inbound = rx.recv() => {
                        let Some(inbound) = inbound else { break };
                        let router = Arc::clone(&router);
                        in_flight.spawn(async move { router.answer(inbound).await });
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(context = %router.context, "Reply task failed: {e}");
                        }
                    }
                }
            }
            while in_flight.join_next().await.is_some() {}
            tracing::debug!(context = %router.context, "Router stopped");
        });

        RouterHandle {
            listener: Listener { tx, context },
            task,
        }
    }
}

/// The inbox could not accept the message: the router is gone.
#[derive(Debug, Clone, Copy, Error)]
#[error("Receiving end does not exist")]
pub struct ListenerClosed;

/// Sending side of a running router. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Listener {
    tx: mpsc::Sender<Inbound>,
    context: Arc<str>,
}

impl Listener {
    /// Name of the context this listener belongs to.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue `envelope` and return the slot its reply will arrive on.
    ///
    /// # Errors
    /// Returns [`ListenerClosed`] if the router has stopped.
    pub async fn deliver(
        &self,
        envelope: Envelope,
        sender: SenderContext,
    ) -> Result<oneshot::Receiver<WireResponse>, ListenerClosed> {
        let (reply, rx) = oneshot::channel();
        let inbound = Inbound {
            id: Uuid::new_v4(),
            envelope,
            sender,
            reply,
        };
        self.tx.send(inbound).await.map_err(|_| ListenerClosed)?;
        Ok(rx)
    }
}

/// Owner of a running router task.
#[derive(Debug)]
pub struct RouterHandle {
    listener: Listener,
    task: JoinHandle<()>,
}

impl RouterHandle {
    #[must_use]
    pub fn listener(&self) -> Listener {
        self.listener.clone()
    }

    /// Tear the context down. Pending calls observe a closed port.
    pub fn shutdown(self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
