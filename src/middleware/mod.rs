//! Middleware pipeline — composable before/after request handler logic.
//!
//! A [`Pipeline`] is an ordered stack of middleware in front of one terminal
//! endpoint. Each middleware receives the request [`Context`] and a [`Next`]
//! cursor; it may answer on its own (the response cache does this on a hit)
//! or call [`Next::run`] to continue and then inspect or rewrite the
//! downstream [`Response`] (the cache does this to capture what it stores).

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Request, Response, context::Context};

/// A boxed, `Send` future resolving to a [`Response`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// The terminal handler a pipeline ends in.
pub type Endpoint = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async endpoint functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this automatically.
pub trait IntoEndpoint: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoEndpoint for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

/// Converts a [`Middleware`] into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can continue the
/// pipeline at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Endpoint,
    // Which middleware the next `run` call invokes.
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of `middlewares`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Endpoint) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Invokes the next middleware, or the endpoint once the stack is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a response without calling `next`, or decorate the response
/// returned by `next`.
///
/// Implementations must be `Send + Sync` because a pipeline is shared across
/// Tokio tasks, and must not hold `&mut` borrows of shared state across an
/// `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// An ordered middleware stack in front of a terminal endpoint.
///
/// Cloning a pipeline is cheap; the server clones it into every connection task.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::middleware::Pipeline;
/// use rttp_cache::{Response, StatusCode, context::Context};
///
/// # async fn demo(request: rttp_cache::Request) {
/// let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("hi") });
/// let response = pipeline.handle(request).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Endpoint,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `endpoint`.
    pub fn new(endpoint: impl IntoEndpoint) -> Self {
        let endpoint: Endpoint = Arc::new(move |ctx| endpoint.call(ctx));
        Self {
            middlewares: Arc::from(Vec::new()),
            endpoint,
        }
    }

    /// Appends a middleware. Middleware run in the order they were added.
    #[must_use]
    pub fn layer<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(from_middleware(Arc::new(middleware)));
        Self {
            middlewares: Arc::from(middlewares),
            endpoint: self.endpoint,
        }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs one request through the whole pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.endpoint));
        next.run(Context::new(request)).await
    }
}
