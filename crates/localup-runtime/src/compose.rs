use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::grant::{AccessGrantSource, resolve_access_grant};
use crate::identity::{DEFAULT_ROOT_SERVICE, RootIdentity};
use crate::instance::ServiceInstance;
use crate::port::{HostKind, PORT_CONSOLE, PORT_DEBUG, PORT_PRIVATE, PORT_PUBLIC};
use crate::recipe::{LABEL_STORJ, Recipe, Stack};
use crate::runtime::{
    Runtime, VAR_ACCESS_GRANT, VAR_IDENTITY_DIR, VAR_NODE_ID, Variables, init_from_recipe,
};
use crate::service::Service;

/// Base directory of identities inside the containers.
const CONTAINER_IDENTITY_ROOT: &str = "/var/lib/storj/identities";
const CONTAINER_WORK_DIR: &str = "/var/lib/storj";

/// Runtime describing services as containers of a compose project.
///
/// Nothing is executed: `add_service` only records the rendered service, and
/// [`Compose::project`] turns the registry into a compose file. Containers
/// reach each other by container name; the host reaches them through
/// published ports on `localhost`. Ports follow the same convention as the
/// standalone runtime.
pub struct Compose {
    services: Vec<Service>,
    variables: Variables,
    root: Option<RootIdentity>,
    grants: Option<Arc<dyn AccessGrantSource>>,
}

impl Default for Compose {
    fn default() -> Self {
        Self::new()
    }
}

impl Compose {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            variables: container_variables(),
            root: None,
            grants: None,
        }
    }

    /// Root credentials are baked into the image; they are only used here to
    /// derive the root node id.
    pub fn with_root_identity(mut self, root: RootIdentity) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_access_grants(mut self, source: Arc<dyn AccessGrantSource>) -> Self {
        self.grants = Some(source);
        self
    }

    pub fn set_variable(&mut self, service: &str, key: &str, value: impl Into<String>) {
        self.variables
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    fn root_instance(&self) -> ServiceInstance {
        self.root
            .as_ref()
            .map(RootIdentity::instance)
            .unwrap_or_else(|| ServiceInstance::new(DEFAULT_ROOT_SERVICE, 0))
    }

    /// Build the compose project for the current registry.
    pub fn project(&self) -> ComposeProject {
        let mut project = ComposeProject::default();
        for service in &self.services {
            let id = service.id();
            let ports = [PORT_PUBLIC, PORT_PRIVATE, PORT_CONSOLE, PORT_DEBUG]
                .iter()
                .filter_map(|kind| self.port(id, kind).ok())
                .map(|port| format!("{port}:{port}"))
                .collect();
            project.services.insert(
                container_name(id),
                ComposeService {
                    image: service.image.clone(),
                    command: service.argv(),
                    environment: service.environment.clone(),
                    ports,
                    labels: service.labels().to_vec(),
                },
            );
        }
        project
    }
}

/// Container (and internal host) name: `name` for index 0, `name<index+1>` after.
pub fn container_name(instance: &ServiceInstance) -> String {
    if instance.instance == 0 {
        instance.name.clone()
    } else {
        format!("{}{}", instance.name, instance.instance + 1)
    }
}

impl Runtime for Compose {
    fn add_service(&mut self, recipe: &Recipe) -> Result<ServiceInstance, RuntimeError> {
        let name = ServiceInstance::base_name(&recipe.name);
        let id = ServiceInstance::new(name, self.service_count(name));
        let mut service = Service::new(
            id.clone(),
            PathBuf::from(CONTAINER_WORK_DIR),
            recipe.labels.clone(),
        );
        init_from_recipe(&*self, &mut service, recipe)?;
        if recipe.has_label(LABEL_STORJ) {
            service.add_flag(format!("--identity-dir={}", identity_dir(&id)));
        }
        tracing::info!(service = %id, container = %container_name(&id), "Container registered");
        self.services.push(service);
        Ok(id)
    }

    fn services(&self) -> &[Service] {
        &self.services
    }

    fn service_mut(&mut self, instance: &ServiceInstance) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.id() == instance)
    }

    fn get(&self, instance: &ServiceInstance, key: &str) -> Result<String, RuntimeError> {
        match key {
            VAR_IDENTITY_DIR => Ok(identity_dir(instance)),
            VAR_NODE_ID => Ok(self
                .root
                .as_ref()
                .filter(|root| root.instance() == *instance)
                .map(|root| hex::encode(Sha256::digest(&root.credentials.ca_cert)))
                .unwrap_or_default()),
            VAR_ACCESS_GRANT => {
                resolve_access_grant(self, self.grants.as_deref(), &self.root_instance())
            }
            _ => Ok(self
                .variables
                .get(&instance.name)
                .and_then(|vars| vars.get(key))
                .cloned()
                .unwrap_or_default()),
        }
    }

    fn host(&self, instance: &ServiceInstance, kind: HostKind) -> String {
        match kind {
            HostKind::Internal => container_name(instance),
            HostKind::External => "localhost".to_string(),
        }
    }

    /// Drop services whose name left the stack and add the ones that joined.
    fn reload(&mut self, stack: &Stack) -> Result<(), RuntimeError> {
        let before = self.services.len();
        self.services
            .retain(|s| stack.services.iter().any(|r| ServiceInstance::base_name(&r.name) == s.id().name));
        let removed = before - self.services.len();

        let existing: BTreeSet<String> =
            self.services.iter().map(|s| s.id().name.clone()).collect();
        let mut added = 0;
        for recipe in &stack.services {
            if !existing.contains(ServiceInstance::base_name(&recipe.name)) {
                self.add_service(recipe)?;
                added += 1;
            }
        }
        tracing::info!(added, removed, "Compose runtime reloaded");
        Ok(())
    }
}

fn identity_dir(instance: &ServiceInstance) -> String {
    format!("{CONTAINER_IDENTITY_ROOT}/{}/{}", instance.name, instance.instance)
}

fn container_variables() -> Variables {
    let mut vars = Variables::new();
    vars.insert(
        "cockroach".into(),
        BTreeMap::from([
            (
                "main".to_string(),
                "cockroach://root@cockroach:26257/master?sslmode=disable".to_string(),
            ),
            (
                "metainfo".to_string(),
                "cockroach://root@cockroach:26257/metainfo?sslmode=disable".to_string(),
            ),
            ("dir".to_string(), "/cockroach/cockroach-data".to_string()),
        ]),
    );
    vars.insert(
        "redis".into(),
        BTreeMap::from([("url".to_string(), "redis://redis:6379".to_string())]),
    );
    vars.insert(
        "storagenode".into(),
        BTreeMap::from([("staticDir".to_string(), "/var/lib/storj/web/storagenode".to_string())]),
    );
    vars.insert(
        "satellite-api".into(),
        BTreeMap::from([
            (
                "mailTemplateDir".to_string(),
                "/var/lib/storj/storj/web/satellite/static/emails".to_string(),
            ),
            ("staticDir".to_string(), "/var/lib/storj/storj/web/satellite".to_string()),
        ]),
    );
    vars.insert(
        "linksharing".into(),
        BTreeMap::from([
            ("webDir".to_string(), "/var/lib/storj/pkg/linksharing/web".to_string()),
            (
                "staticDir".to_string(),
                "/var/lib/storj/pkg/linksharing/web/static".to_string(),
            ),
        ]),
    );
    vars
}

/// The subset of the compose file format this tool reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeProject {
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl ComposeProject {
    pub fn from_yaml_str(content: &str) -> Result<Self, RuntimeError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, RuntimeError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), RuntimeError> {
        std::fs::write(path, self.to_yaml()?)?;
        tracing::info!(path = %path.display(), services = self.services.len(), "Compose file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_are_stable() {
        assert_eq!(container_name(&ServiceInstance::new("storagenode", 0)), "storagenode");
        assert_eq!(container_name(&ServiceInstance::new("storagenode", 2)), "storagenode3");
    }

    #[test]
    fn hosts_distinguish_internal_and_external() {
        let mut rt = Compose::new();
        let id = rt.add_service(&Recipe::new("storagenode")).unwrap();
        assert_eq!(rt.host(&id, HostKind::Internal), "storagenode");
        assert_eq!(rt.host(&id, HostKind::External), "localhost");
    }

    #[test]
    fn renders_flags_with_container_addresses() {
        let mut rt = Compose::new();
        rt.add_service(&Recipe::new("satellite-api")).unwrap();
        let recipe = Recipe::new("storagenode")
            .with_label("storj")
            .with_flag("--storage2.trust.sources=${satellite-api.var:nodeId}@${satellite-api.host:internal}:${satellite-api.port:public}");
        let id = rt.add_service(&recipe).unwrap();
        let service = rt.service(&id).unwrap();
        assert_eq!(
            service.flags(),
            [
                "--storage2.trust.sources=@satellite-api:7777",
                "--identity-dir=/var/lib/storj/identities/storagenode/0"
            ]
        );
    }

    #[test]
    fn reload_adds_and_removes_by_name() {
        let mut rt = Compose::new();
        rt.add_service(&Recipe::new("redis")).unwrap();
        rt.add_service(&Recipe::new("storagenode")).unwrap();
        rt.add_service(&Recipe::new("storagenode")).unwrap();

        let stack = Stack {
            services: vec![Recipe::new("storagenode"), Recipe::new("cockroach")],
        };
        rt.reload(&stack).unwrap();

        let ids: Vec<String> = rt.services().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["storagenode/0", "storagenode/1", "cockroach/0"]);
    }

    #[test]
    fn reload_adds_every_copy_of_a_new_recipe() {
        let mut rt = Compose::new();
        rt.add_service(&Recipe::new("redis")).unwrap();

        let stack = Stack {
            services: vec![
                Recipe::new("redis"),
                Recipe::new("storagenode"),
                Recipe::new("storagenode"),
                Recipe::new("storagenode"),
            ],
        };
        rt.reload(&stack).unwrap();

        let ids: Vec<String> = rt.services().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(
            ids,
            vec!["redis/0", "storagenode/0", "storagenode/1", "storagenode/2"]
        );

        let mut fresh = Compose::new();
        for recipe in &stack.services {
            fresh.add_service(recipe).unwrap();
        }
        let fresh_nodes = fresh.services().iter().filter(|s| s.id().name == "storagenode").count();
        assert_eq!(rt.service_count("storagenode"), fresh_nodes);
    }

    #[test]
    fn project_publishes_conventional_ports() {
        let mut rt = Compose::new();
        let mut recipe = Recipe::new("redis").with_command(["redis-server"]);
        recipe.image = Some("redis:7".into());
        rt.add_service(&recipe).unwrap();

        let project = rt.project();
        let redis = &project.services["redis"];
        assert_eq!(redis.image.as_deref(), Some("redis:7"));
        assert_eq!(redis.command, vec!["redis-server"]);
        assert_eq!(redis.ports, vec!["6379:6379"]);

        let yaml = project.to_yaml().unwrap();
        assert_eq!(ComposeProject::from_yaml_str(&yaml).unwrap(), project);
    }

    #[test]
    fn root_node_id_comes_from_configured_credentials() {
        let creds = crate::identity::RootCredentials {
            ca_cert: b"abc".to_vec(),
            ca_key: vec![],
            identity_cert: vec![],
            identity_key: vec![],
        };
        let rt = Compose::new().with_root_identity(RootIdentity::new("satellite-api", creds));
        let root = ServiceInstance::new("satellite-api", 0);
        assert_eq!(
            rt.get(&root, VAR_NODE_ID).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(rt.get(&ServiceInstance::new("storagenode", 0), VAR_NODE_ID).unwrap(), "");
    }
}
