//! Service runtime for localup.
//!
//! A [`Runtime`] turns [`Recipe`]s into registered, addressable
//! [`Service`]s. Two backends implement it:
//!
//! - [`Standalone`] runs services as local processes. It creates a working
//!   directory per instance, provisions identities and generates configs by
//!   running the target binary's own `setup` subcommand.
//! - [`Compose`] describes services as containers and writes a compose file.
//!
//! Both resolve ports through [`port_convention`] and placeholders through
//! [`render()`], so a configuration rendered for one backend is valid for the
//! other.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use localup_runtime::{Recipe, Runtime, Standalone};
//! use std::path::Path;
//!
//! # fn run() -> Result<(), localup_runtime::RuntimeError> {
//! let mut runtime = Standalone::new("/tmp/localup", Path::new("/src"));
//!
//! let api = runtime.add_service(
//!     &Recipe::new("satellite-api")
//!         .with_command(["satellite", "run", "api"])
//!         .with_label("storj"),
//! )?;
//! let node = runtime.add_service(
//!     &Recipe::new("storagenode")
//!         .with_command(["storagenode", "run"])
//!         .with_label("storj"),
//! )?;
//! runtime.add_flag(
//!     &node,
//!     "--storage2.trust.sources=${satellite-api.var:nodeId}@${satellite-api.host:external}:${satellite-api.port:public}",
//! )?;
//! assert_eq!(runtime.port(&api, "public")?, 7777);
//!
//! runtime.write()?;
//! # Ok(())
//! # }
//! ```

pub mod compose;
pub mod error;
pub mod grant;
pub mod identity;
pub mod instance;
pub mod layout;
pub mod port;
pub mod recipe;
pub mod render;
pub mod runtime;
pub mod service;
pub mod setup;
pub mod standalone;

pub use compose::{Compose, ComposeProject, ComposeService};
pub use error::RuntimeError;
pub use grant::{AccessGrantSource, StaticAccessGrants};
pub use identity::{IdentityProvisioner, Provisioned, RootCredentials, RootIdentity};
pub use instance::ServiceInstance;
pub use layout::InstanceLayout;
pub use port::{HostKind, port_convention};
pub use recipe::{Recipe, Stack};
pub use render::render;
pub use runtime::{Runtime, Variables};
pub use service::Service;
pub use standalone::Standalone;
