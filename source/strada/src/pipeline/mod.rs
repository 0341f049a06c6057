//! The middleware pipeline: an ordered chain of around-advice
//! middlewares composed with a final handler into one dispatchable
//! unit.
//!
//! Each middleware receives a one-shot continuation. Code after
//! `next.run(..)` executes after every inner layer has returned, so
//! completion order is strictly LIFO. A continuation invoked twice is
//! a programming error and fails the dispatch with
//! [`Error::DoubleInvocation`].

pub mod error_boundary;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::Span;

use crate::context::{Context, PathParams};
use crate::error::Error;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Run this middleware. Call `next.run(ctx)` at most once to
    /// advance the chain; not calling it terminates the chain without
    /// reaching the handler.
    async fn execute(&self, ctx: &mut Context, next: Next, span: Span) -> Result<(), Error>;

    /// Bypass predicate, checked before `execute`. Must be pure.
    fn skip(&self, _ctx: &Context) -> bool {
        false
    }

    /// Opt into verbose diagnostics for this middleware.
    fn debug(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut Context,
        params: PathParams,
        span: Span,
    ) -> Result<Option<Value>, Error>;
}

pub type HandlerResult = Result<Option<Value>, Error>;

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut Context, PathParams) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait]
    impl<F> Handler for FnHandler<F>
    where
        F: for<'a> Fn(&'a mut Context, PathParams) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        async fn handle(
            &self,
            ctx: &mut Context,
            params: PathParams,
            _span: Span,
        ) -> Result<Option<Value>, Error> {
            (self.0)(ctx, params).await
        }
    }

    Arc::new(FnHandler(f))
}

/// The continuation handed to each middleware. One-shot: the second
/// `run` fails the dispatch.
pub struct Next {
    chain: Arc<ChainInner>,
    index: usize,
    owner: String,
    used: AtomicBool,
}

impl Next {
    pub async fn run(&self, ctx: &mut Context) -> Result<(), Error> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(Error::DoubleInvocation {
                middleware: self.owner.clone(),
            });
        }
        self.chain.clone().dispatch_from(self.index, ctx).await
    }
}

struct ChainInner {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
    root: Span,
}

impl ChainInner {
    // Recursion through `Next::run` is broken at the type level by the
    // boxed futures of the middleware trait, so a plain async fn works.
    async fn dispatch_from(self: Arc<Self>, mut index: usize, ctx: &mut Context) -> Result<(), Error> {
        while index < self.middlewares.len() && self.middlewares[index].skip(ctx) {
            index += 1;
        }

        if index >= self.middlewares.len() {
            let params = ctx.request.params.clone();
            let handler = self.handler.clone();
            let value = handler.handle(ctx, params, self.root.clone()).await?;
            if let Some(value) = value {
                if !ctx.response.sent() {
                    ctx.response.json(value)?;
                }
            }
            return Ok(());
        }

        let middleware = self.middlewares[index].clone();
        let next = Next {
            chain: self.clone(),
            index: index + 1,
            owner: middleware.name().to_string(),
            used: AtomicBool::new(false),
        };
        let span =
            tracing::debug_span!(parent: &self.root, "middleware", middleware = %middleware.name());
        middleware.execute(ctx, next, span).await
    }
}

/// An ordered middleware chain composed with a final handler.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<ChainInner>,
}

impl Pipeline {
    /// Compose `middlewares` and `handler`. The `root` span is what
    /// the handler receives; each middleware gets a child span with
    /// its name attached.
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>, handler: Arc<dyn Handler>, root: Span) -> Self {
        Self {
            chain: Arc::new(ChainInner {
                middlewares,
                handler,
                root,
            }),
        }
    }

    pub async fn dispatch(&self, ctx: &mut Context) -> Result<(), Error> {
        self.chain.clone().dispatch_from(0, ctx).await
    }
}
