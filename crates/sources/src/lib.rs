// SPDX-License-Identifier: MIT

//! Source manager: registers and materialises job
//! definitions from `local`, `git`, and `oci` sources, walks a source's
//! tree for job definitions, and loads its alias declarations.

pub mod discovery;
pub mod error;
pub mod git;
pub mod local;
pub mod oci;
pub mod store;

pub use discovery::{discover, load_root_aliases, DiscoveryError};
pub use error::SourceError;
pub use git::{materialize_git, GitAllow};
pub use local::register_local;
pub use oci::{materialize_oci, OciMaterialization};
pub use store::SourceStore;
