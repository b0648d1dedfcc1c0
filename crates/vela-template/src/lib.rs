//! Capability template rendering for the Vela control plane.
//!
//! A template declares a parameter schema, an optional `processing.http`
//! step, a primary `output` and named `outputs`. [`Renderer`] validates
//! parameters, runs the fetch step under a timeout and evaluates the
//! outputs deterministically.
//!
//! Health policies and custom status messages share the same expression
//! language and are evaluated by the [`status`] module.

pub mod context;
pub mod error;
pub mod expr;
pub mod fetch;
pub mod render;
pub mod schema;
pub mod status;
pub mod template;

pub use context::{ConfigEntry, RenderContext};
pub use error::{RenderError, RenderErrorCategory};
pub use expr::{Expr, ExprError, Scope, parse_expression};
pub use fetch::{DataFetcher, FetchBody, FetchRequest, HttpFetcher, HttpFetcherConfig};
pub use render::{DEFAULT_FETCH_TIMEOUT, RenderOutput, Renderer};
pub use schema::{ParamSchema, SchemaKind, validate_parameters};
pub use status::{evaluate_custom_status, evaluate_health};
pub use template::Template;
