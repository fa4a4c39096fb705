//! Runner controller.
//!
//! Converges each `Runner` into three children:
//!
//! - a Secret `<runner>` with a GitHub App installation token (only when the app is
//!   configured and the Runner brings no token of its own),
//! - a ConfigMap `<runner>-workspace` with the Dockerfile of the runner image,
//! - a Deployment `<runner>-runner` that builds the image in an init container and runs
//!   the runner.
//!
//! [`Reconciler`] is independent of the cluster: it works against any
//! [`ResourceStore`](garc_storage::ResourceStore). [`controller::run`] drives it from a
//! kube-rs `Controller`.

pub mod apply;
pub mod builder;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod gc;
pub mod observability;
pub mod reconciler;

pub use apply::{ApplyOutcome, Applier};
pub use config::ControllerConfig;
pub use error::ReconcileError;
pub use reconciler::{ReconcileResult, Reconciler};
