//! JSON-over-HTTP surface of the realm.
//!
//! Handlers stay thin: they parse and validate the request, hand the work to
//! [`crate::realm`] through [`crate::realm::blocking`], and map
//! [`RealmError`](crate::realm::RealmError) onto a status code via [`ApiError`].

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, AppState};
