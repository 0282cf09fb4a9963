//! Asynchronous fill-on-demand caches.
//!
//! Two primitives with the same access discipline (lookup never computes,
//! loads are explicit) but different completion shapes:
//!
//! - [`single::Cache`] computes its value in one step on a worker and
//!   publishes it directly.
//! - [`upload::UploadCache`] decodes an intermediate on a worker and defers
//!   the final conversion to whichever thread holds the device, so GPU
//!   resources are only ever created and destroyed there.

pub mod single;
pub mod upload;
