//! Demo application
//!
//! A home page plus a small posts resource backed by the `posts` table.
//! Everything touching the backend sits behind the backend feature gate.

mod pages;
mod posts;

use crate::config::AppConfig;
use crate::web::{Middleware, Registrar};

/// Declare every application route
pub fn routes(r: &mut Registrar, config: &AppConfig) {
    r.get("/", pages::home).name("home");

    r.group(vec![Middleware::backend_feature(config)], |r| {
        r.get("/posts", posts::index).name("posts.index");
        r.post("/posts", posts::store).name("posts.store");
        r.get("/posts/:id", posts::show).name("posts.show");
        r.post("/posts/:id/update", posts::update).name("posts.update");
        r.post("/posts/:id/delete", posts::destroy).name("posts.destroy");
        r.get("/api/posts", posts::api_index).name("api.posts");
    });
}
