use std::collections::BTreeMap;

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;
use crate::port::{HostKind, port_convention};
use crate::recipe::{Recipe, Stack};
use crate::render;
use crate::service::Service;

/// Reserved variable: directory holding the instance's identity files.
pub const VAR_IDENTITY_DIR: &str = "identityDir";
/// Reserved variable: API key issued by the root satellite.
pub const VAR_ACCESS_GRANT: &str = "accessGrant";
/// Reserved variable: hex node id derived from the instance's CA certificate.
pub const VAR_NODE_ID: &str = "nodeId";

/// Per-service-name variable table: service name -> variable name -> value.
pub type Variables = BTreeMap<String, BTreeMap<String, String>>;

/// Execution backend turning recipes into addressable services.
///
/// Every backend resolves ports through [`port_convention`], so a config
/// rendered for one backend stays valid under the other. Registration is
/// sequential: `add_service` takes `&mut self` and blocks on any external
/// process it runs.
pub trait Runtime {
    /// Register a new instance of `recipe.name`, with the next free index.
    fn add_service(&mut self, recipe: &Recipe) -> Result<ServiceInstance, RuntimeError>;

    /// Registered services, in registration order.
    fn services(&self) -> &[Service];

    fn service_mut(&mut self, instance: &ServiceInstance) -> Option<&mut Service>;

    /// Resolve a named variable for an instance. Unknown keys resolve to "".
    fn get(&self, instance: &ServiceInstance, key: &str) -> Result<String, RuntimeError>;

    fn host(&self, instance: &ServiceInstance, kind: HostKind) -> String;

    fn port(&self, instance: &ServiceInstance, kind: &str) -> Result<u16, RuntimeError> {
        port_convention(instance, kind)
    }

    /// Apply a new recipe set to an already populated runtime.
    fn reload(&mut self, stack: &Stack) -> Result<(), RuntimeError>;

    fn service(&self, instance: &ServiceInstance) -> Option<&Service> {
        self.services().iter().find(|s| s.id() == instance)
    }

    /// Number of registered instances sharing `name` (an `/index` suffix is ignored).
    fn service_count(&self, name: &str) -> usize {
        let name = ServiceInstance::base_name(name);
        self.services().iter().filter(|s| s.id().name == name).count()
    }

    /// Render `template` against this runtime's current state.
    fn render(&self, instance: &ServiceInstance, template: &str) -> Result<String, RuntimeError> {
        render::render(self, instance, template)
    }

    fn add_flag(&mut self, instance: &ServiceInstance, flag: &str) -> Result<(), RuntimeError> {
        let flag = self.render(instance, flag)?;
        registered(self, instance)?.add_flag(flag);
        Ok(())
    }

    fn add_config(
        &mut self,
        instance: &ServiceInstance,
        key: &str,
        value: &str,
    ) -> Result<(), RuntimeError> {
        let value = self.render(instance, value)?;
        registered(self, instance)?.add_config(key, &value);
        Ok(())
    }

    fn add_environment(
        &mut self,
        instance: &ServiceInstance,
        key: &str,
        value: &str,
    ) -> Result<(), RuntimeError> {
        let value = self.render(instance, value)?;
        registered(self, instance)?.add_environment(key, value);
        Ok(())
    }
}

fn registered<'a, R: Runtime + ?Sized>(
    runtime: &'a mut R,
    instance: &ServiceInstance,
) -> Result<&'a mut Service, RuntimeError> {
    runtime
        .service_mut(instance)
        .ok_or_else(|| RuntimeError::ServiceNotFound(instance.to_string()))
}

/// Copy the recipe's command, flags, environment and config into `service`,
/// rendering every value against the service's own identity.
pub(crate) fn init_from_recipe<R: Runtime + ?Sized>(
    runtime: &R,
    service: &mut Service,
    recipe: &Recipe,
) -> Result<(), RuntimeError> {
    let id = service.id().clone();
    service.command = recipe.command.clone();
    service.image = recipe.image.clone();
    for flag in &recipe.flags {
        service.add_flag(runtime.render(&id, flag)?);
    }
    for (key, value) in &recipe.environment {
        service.add_environment(key.clone(), runtime.render(&id, value)?);
    }
    for (key, value) in &recipe.config {
        service.add_config(key, &runtime.render(&id, value)?);
    }
    Ok(())
}
