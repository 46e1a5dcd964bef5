use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::grant::{AccessGrantSource, resolve_access_grant};
use crate::identity::{DEFAULT_ROOT_SERVICE, IdentityProvisioner, RootIdentity};
use crate::instance::ServiceInstance;
use crate::layout::InstanceLayout;
use crate::port::HostKind;
use crate::recipe::{LABEL_STORJ, Recipe, Stack};
use crate::runtime::{
    Runtime, VAR_ACCESS_GRANT, VAR_IDENTITY_DIR, VAR_NODE_ID, Variables, init_from_recipe,
};
use crate::service::Service;
use crate::setup::ConfigGenerator;

/// Runtime starting services as plain local processes, without isolation.
///
/// Every instance gets `{dir}/{name}/{index}` as its working directory. With
/// `clean` set (the default) that directory is wiped before it is recreated,
/// so identities and generated configs start fresh on every run; the root
/// identity, if configured, is written back byte for byte.
///
/// All hosts resolve to `localhost`; ports follow the shared convention.
pub struct Standalone {
    dir: PathBuf,
    services: Vec<Service>,
    variables: Variables,
    clean: bool,
    provisioner: IdentityProvisioner,
    grants: Option<Arc<dyn AccessGrantSource>>,
}

impl Standalone {
    pub fn new(dir: impl Into<PathBuf>, project_dir: &Path) -> Self {
        let dir = dir.into();
        let variables = default_variables(&dir, project_dir);
        Self {
            dir,
            services: Vec::new(),
            variables,
            clean: true,
            provisioner: IdentityProvisioner::default(),
            grants: None,
        }
    }

    /// Keep existing working directories instead of wiping them.
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_root_identity(mut self, root: RootIdentity) -> Self {
        self.provisioner = IdentityProvisioner::new(Some(root));
        self
    }

    pub fn with_access_grants(mut self, source: Arc<dyn AccessGrantSource>) -> Self {
        self.grants = Some(source);
        self
    }

    /// Override or add a variable in the per-service table.
    pub fn set_variable(&mut self, service: &str, key: &str, value: impl Into<String>) {
        self.variables
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn layout(&self, instance: &ServiceInstance) -> InstanceLayout {
        InstanceLayout::new(&self.dir, instance)
    }

    fn root_instance(&self) -> ServiceInstance {
        self.provisioner
            .root()
            .map(RootIdentity::instance)
            .unwrap_or_else(|| ServiceInstance::new(DEFAULT_ROOT_SERVICE, 0))
    }

    /// Persist every service: its config lines to `config.yaml` and a
    /// `run.sh` launcher when it has a command.
    pub fn write(&self) -> Result<(), RuntimeError> {
        for service in &self.services {
            let layout = self.layout(service.id());
            layout.init()?;
            if !service.config().is_empty() {
                let mut content = service.config().join("\n");
                content.push('\n');
                std::fs::write(layout.config_path(), content)?;
            }
            if service.command.is_empty() {
                continue;
            }
            let launcher = layout.launcher_path();
            std::fs::write(&launcher, launcher_script(service))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))?;
            }
            tracing::debug!(service = %service.id(), path = %launcher.display(), "Launcher written");
        }
        tracing::info!(dir = %self.dir.display(), services = self.services.len(), "Standalone runtime written");
        Ok(())
    }
}

impl Runtime for Standalone {
    fn add_service(&mut self, recipe: &Recipe) -> Result<ServiceInstance, RuntimeError> {
        let name = ServiceInstance::base_name(&recipe.name);
        let id = ServiceInstance::new(name, self.service_count(name));
        let layout = self.layout(&id);
        if self.clean {
            layout.clean()?;
        }
        layout.init()?;

        let mut service = Service::new(id.clone(), layout.dir().to_path_buf(), recipe.labels.clone());
        let storj = recipe.has_label(LABEL_STORJ);
        if storj {
            self.provisioner.provision(&id, &layout)?;
            if let Some(program) = recipe.command.first() {
                service.set_config(ConfigGenerator::new(program).generate(&id, &layout)?);
            }
        }

        init_from_recipe(&*self, &mut service, recipe)?;
        if storj {
            service.add_flag(format!("--config-dir={}", layout.dir().display()));
        }

        tracing::info!(service = %id, dir = %layout.dir().display(), "Service registered");
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
            VAR_IDENTITY_DIR => Ok(self.layout(instance).dir().display().to_string()),
            VAR_NODE_ID => {
                let layout = self.layout(instance);
                if layout.ca_cert_path().exists() {
                    layout.node_id()
                } else {
                    Ok(String::new())
                }
            }
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

    fn host(&self, _instance: &ServiceInstance, _kind: HostKind) -> String {
        "localhost".to_string()
    }

    fn reload(&mut self, _stack: &Stack) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotImplemented("reload"))
    }
}

/// Built-in variables for a cluster rooted at `dir`, with sources checked out
/// under `project_dir`.
pub fn default_variables(dir: &Path, project_dir: &Path) -> Variables {
    let path = |p: PathBuf| p.display().to_string();
    let mut vars = Variables::new();
    vars.insert(
        "cockroach".into(),
        BTreeMap::from([
            (
                "main".to_string(),
                "cockroach://root@localhost:26257/master?sslmode=disable".to_string(),
            ),
            (
                "metainfo".to_string(),
                "cockroach://root@localhost:26257/metainfo?sslmode=disable".to_string(),
            ),
            ("dir".to_string(), path(dir.join("cockroach").join("0").join("data"))),
        ]),
    );
    vars.insert(
        "storagenode".into(),
        BTreeMap::from([(
            "staticDir".to_string(),
            path(project_dir.join("storj/web/storagenode")),
        )]),
    );
    vars.insert(
        "redis".into(),
        BTreeMap::from([("url".to_string(), "redis://localhost:6379".to_string())]),
    );
    vars.insert(
        "satellite-api".into(),
        BTreeMap::from([
            (
                "mailTemplateDir".to_string(),
                path(project_dir.join("storj/web/satellite/static/emails")),
            ),
            ("staticDir".to_string(), path(project_dir.join("storj/web/satellite"))),
        ]),
    );
    vars.insert(
        "linksharing".into(),
        BTreeMap::from([
            (
                "webDir".to_string(),
                path(project_dir.join("gateway-mt/pkg/linksharing/web")),
            ),
            (
                "staticDir".to_string(),
                path(project_dir.join("gateway-mt/pkg/linksharing/web/static")),
            ),
        ]),
    );
    vars
}

fn launcher_script(service: &Service) -> String {
    let mut script = String::from("#!/usr/bin/env sh\n");
    script.push_str(&format!(
        "cd {} || exit 1\n",
        shell_quote(&service.dir().display().to_string())
    ));
    for (key, value) in &service.environment {
        script.push_str(&format!("export {key}={}\n", shell_quote(value)));
    }
    let argv: Vec<String> = service.argv().iter().map(|a| shell_quote(a)).collect();
    script.push_str(&format!("exec {}\n", argv.join(" ")));
    script
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn default_variables_use_root_and_project_dirs() {
        let vars = default_variables(Path::new("/up"), Path::new("/src"));
        assert_eq!(vars["cockroach"]["dir"], "/up/cockroach/0/data");
        assert_eq!(vars["satellite-api"]["staticDir"], "/src/storj/web/satellite");
        assert_eq!(vars["redis"]["url"], "redis://localhost:6379");
    }

    #[test]
    fn launcher_exports_environment_and_execs_argv() {
        let mut service = Service::new(
            ServiceInstance::new("storagenode", 0),
            PathBuf::from("/up/storagenode/0"),
            vec![],
        );
        service.command = vec!["storagenode".into(), "run".into()];
        service.add_flag("--log.level=debug");
        service.add_environment("STORJ_ROLE", "storage node");

        let script = launcher_script(&service);
        assert_eq!(
            script,
            "#!/usr/bin/env sh\n\
             cd '/up/storagenode/0' || exit 1\n\
             export STORJ_ROLE='storage node'\n\
             exec 'storagenode' 'run' '--log.level=debug'\n"
        );
    }
}
