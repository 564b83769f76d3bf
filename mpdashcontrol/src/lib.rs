//! # mpdashcontrol - web dashboard for MPD
//!
//! This crate holds everything that talks to the MPD daemon and everything served
//! to the browser:
//!
//! - [`protocol`]: client for the MPD text protocol
//! - [`session`]: shared session, `ping` before each call and one reconnection
//! - [`queue`]: insertion, appending and removals in the play queue
//! - [`resolver`]: dashboard route table and canonical redirects
//! - [`views`] and [`render`]: HTML (or JSON) pages of the dashboard
//! - [`api`] and [`openapi`]: JSON read and control API, with its OpenAPI description
//! - [`mpdashserver_ext`]: mounts the whole on a `mpdashserver::Server`

pub mod api;
pub mod errors;
pub mod model;
pub mod mpdashserver_ext;
pub mod openapi;
pub mod protocol;
pub mod query;
pub mod queue;
pub mod render;
pub mod resolver;
pub mod session;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Action, ApiError};
pub use errors::{MpdError, MpdResult};
pub use model::{PlayState, PlaybackStatus, QueueEntry, Tag, Track};
pub use mpdashserver_ext::{DashboardExt, DashboardState};
pub use query::{ResourceQuery, TrackSelection};
pub use queue::QueueEngine;
pub use resolver::{RouteOutcome, RouteTable};
pub use session::{DaemonSession, MpdSession};
