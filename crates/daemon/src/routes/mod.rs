// SPDX-License-Identifier: MIT

//! HTTP route handlers, one module per resource.

pub mod events;
pub mod health;
pub mod jobs;
pub mod kv;
pub mod plans;
pub mod runs;
pub mod sources;
mod support;
