// SPDX-License-Identifier: MIT

//! The Run Lifecycle Controller: job discovery
//! and aliasing, plan construction and policy gating, run execution,
//! and the durable event plane that every run's events flow through.

pub mod catalog;
pub mod error;
pub mod events;
pub mod executor;
pub mod plan;
pub mod run_store;

pub use catalog::{rebuild, DiscoveredRoot, JobCatalog};
pub use error::ControllerError;
pub use events::{
    subscribe_global, subscribe_run, EventSink, JournalSink, LiveHub, ReplaySubscription,
    Subscription, DEFAULT_BUFFER, DEFAULT_KEEPALIVE_SECS, GLOBAL_TOPIC,
};
pub use executor::{
    bind_args_as_env, ensure_no_name_conflict, ContainerExecutor, ExecutionOutcome, HostExecutor,
    RunExecutor,
};
pub use plan::{build_plan, executor_for};
pub use run_store::{RunPage, RunStore};
