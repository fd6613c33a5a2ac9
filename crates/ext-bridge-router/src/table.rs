//! Handler table.

use std::{collections::HashMap, future::Future, sync::Arc};

use ext_bridge_core::{Message, MessageKind, SenderContext};
use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;

use crate::HandlerError;

/// Type-erased handler: JSON payload in, JSON data out.
pub(crate) type ErasedHandler = Arc<
    dyn Fn(Value, SenderContext) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync,
>;

/// Mapping from message kind to the function that answers it.
///
/// Built once when a context starts and handed to its [`Router`](crate::Router),
/// which never mutates it. Registering a kind twice keeps the last handler.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<MessageKind, ErasedHandler>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`HandlerTable::register`].
    #[must_use]
    pub fn on<M, F, Fut>(mut self, handler: F) -> Self
    where
        M: Message,
        F: Fn(M, SenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, HandlerError>> + Send + 'static,
    {
        self.register(handler);
        self
    }

    /// Install `handler` for `M::KIND`, replacing any previous one.
    ///
    /// The payload is decoded into `M` before the handler runs; a payload
    /// that does not match fails with [`HandlerError::InvalidPayload`].
    pub fn register<M, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        M: Message,
        F: Fn(M, SenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, HandlerError>> + Send + 'static,
    {
        let erased: ErasedHandler = Arc::new(move |payload: Value, sender: SenderContext| {
            match serde_json::from_value::<M>(payload) {
                Ok(message) => {
                    let pending = handler(message, sender);
                    async move {
                        let response = pending.await?;
                        serde_json::to_value(response).map_err(|source| HandlerError::Encode {
                            kind: M::KIND,
                            source,
                        })
                    }
                    .boxed()
                }
                Err(source) => futures::future::ready(Err(HandlerError::InvalidPayload {
                    kind: M::KIND,
                    source,
                }))
                .boxed(),
            }
        });

        if self.handlers.insert(M::KIND, erased).is_some() {
            tracing::debug!(kind = %M::KIND, "Replaced previously registered handler");
        }
        self
    }

    /// Install every handler of `other`, overwriting kinds present in both.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.handlers.extend(other.handlers);
        self
    }

    #[must_use]
    pub fn contains(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<MessageKind> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn handler(&self, kind: MessageKind) -> Option<&ErasedHandler> {
        self.handlers.get(&kind)
    }
}
