//! Web layer
//!
//! - Route declaration with symbolic names and middleware groups
//! - Request dispatch (`Ctx`, central error propagation)
//! - Backend feature gate
//! - View rendering

mod dispatch;
mod middleware;
mod registry;
mod routes;
mod views;

pub use dispatch::{Ctx, dispatch};
pub use middleware::{FEATURE_DISABLED_MESSAGE, FeatureGate, Middleware, require_backend};
pub use registry::RouteRegistry;
pub use routes::{Named, Registrar};
pub use views::{FileViews, ViewEngine};
