//! Route declaration
//!
//! ```ignore
//! let mut r = Registrar::new();
//! r.get("/", pages::home).name("home");
//! r.group(vec![Middleware::backend_feature(&config)], |r| {
//!     r.get("/posts", posts::index).name("posts.index");
//!     r.post("/posts", posts::store).name("posts.store");
//! });
//! let (router, registry) = r.finish();
//! ```

use axum::{
    Router,
    response::IntoResponse,
    routing::{self, MethodRouter},
};
use std::future::Future;

use super::dispatch::{Ctx, dispatch};
use super::middleware::Middleware;
use super::registry::RouteRegistry;
use crate::AppState;
use crate::error::AppError;

/// Collects routes and their symbolic names during startup
#[derive(Default)]
pub struct Registrar {
    router: Router<AppState>,
    registry: RouteRegistry,
    /// Routes declared here and in nested groups
    declared: usize,
}

/// Returned by every declaration; can only attach a name
#[must_use = "call .name(..) or drop the handle explicitly"]
pub struct Named<'a> {
    registry: &'a mut RouteRegistry,
    path: String,
}

impl Named<'_> {
    /// Register `name` as a symbol for the declared path
    pub fn name(self, name: &str) {
        self.registry.register(name, &self.path);
    }
}

macro_rules! declare_method {
    ($(#[$doc:meta])* $method:ident) => {
        $(#[$doc])*
        pub fn $method<H, Fut, R>(&mut self, path: &str, handler: H) -> Named<'_>
        where
            H: Fn(Ctx) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, AppError>> + Send + 'static,
            R: IntoResponse + 'static,
        {
            self.declare(path, routing::$method(dispatch(handler)))
        }
    };
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    declare_method!(
        /// Declare a GET route
        get
    );
    declare_method!(
        /// Declare a POST route
        post
    );
    declare_method!(
        /// Declare a PUT route
        put
    );
    declare_method!(
        /// Declare a PATCH route
        patch
    );
    declare_method!(
        /// Declare a DELETE route
        delete
    );

    fn declare(&mut self, path: &str, method_router: MethodRouter<AppState>) -> Named<'_> {
        tracing::debug!(path, "Declaring route");
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        self.declared += 1;
        Named {
            registry: &mut self.registry,
            path: path.to_string(),
        }
    }

    /// Declare a group of routes sharing `middlewares`
    ///
    /// Middlewares run in list order and only wrap the group's routes.
    /// Names registered inside the group stay globally resolvable.
    pub fn group(&mut self, middlewares: Vec<Middleware>, declare: impl FnOnce(&mut Registrar)) {
        let mut nested = Registrar {
            router: Router::new(),
            registry: std::mem::take(&mut self.registry),
            declared: 0,
        };
        declare(&mut nested);

        let Registrar {
            router: mut group,
            registry,
            declared,
        } = nested;
        self.registry = registry;

        // route_layer panics on a router without routes
        if declared > 0 {
            for middleware in middlewares.into_iter().rev() {
                group = middleware.apply(group);
            }
        }

        self.router = std::mem::take(&mut self.router).merge(group);
        self.declared += declared;
    }

    /// Name registry built so far
    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Hand over the router and the frozen name registry
    pub fn finish(self) -> (Router<AppState>, RouteRegistry) {
        tracing::info!(
            routes = self.declared,
            names = self.registry.len(),
            "Routes declared"
        );
        (self.router, self.registry)
    }
}
