use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;
use crate::runtime::Runtime;

/// `${[target.]kind:arg}` where target is `name` or `name/index`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?:([A-Za-z0-9_-]+(?:/[0-9]+)?)\.)?(host|port|var):([A-Za-z0-9_.-]+)\}")
        .expect("placeholder pattern is valid")
});

/// Substitute placeholders in `template` using `runtime`'s resolvers.
///
/// | placeholder                         | resolves to                               |
/// |-------------------------------------|-------------------------------------------|
/// | `${host:internal}`                  | `host(instance, internal)`                |
/// | `${port:public}`                    | `port(instance, "public")`                |
/// | `${var:identityDir}`                | `get(instance, "identityDir")`            |
/// | `${satellite-api/0.port:public}`    | the same lookups against another instance |
///
/// A bare target name means index 0. Nothing is cached: every call reads the
/// runtime's current state.
pub fn render<R: Runtime + ?Sized>(
    runtime: &R,
    instance: &ServiceInstance,
    template: &str,
) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).ok_or_else(|| RuntimeError::Template(template.into()))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&resolve(runtime, instance, &caps)?);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn resolve<R: Runtime + ?Sized>(
    runtime: &R,
    instance: &ServiceInstance,
    caps: &Captures<'_>,
) -> Result<String, RuntimeError> {
    let target = match caps.get(1) {
        Some(t) => t.as_str().parse::<ServiceInstance>()?,
        None => instance.clone(),
    };
    let arg = &caps[3];
    match &caps[2] {
        "host" => Ok(runtime.host(&target, arg.parse()?)),
        "port" => Ok(runtime.port(&target, arg)?.to_string()),
        "var" => runtime.get(&target, arg),
        other => Err(RuntimeError::Template(format!("unknown placeholder kind: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use super::*;
    use crate::port::HostKind;
    use crate::recipe::{Recipe, Stack};
    use crate::service::Service;

    /// Minimal runtime whose variable table can change between renders.
    struct TableRuntime {
        vars: HashMap<String, String>,
        lookups: Cell<usize>,
    }

    impl Runtime for TableRuntime {
        fn add_service(&mut self, _recipe: &Recipe) -> Result<ServiceInstance, RuntimeError> {
            Err(RuntimeError::NotImplemented("add_service"))
        }
        fn services(&self) -> &[Service] {
            &[]
        }
        fn service_mut(&mut self, _instance: &ServiceInstance) -> Option<&mut Service> {
            None
        }
        fn get(&self, instance: &ServiceInstance, key: &str) -> Result<String, RuntimeError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self
                .vars
                .get(&format!("{}.{key}", instance.name))
                .cloned()
                .unwrap_or_default())
        }
        fn host(&self, instance: &ServiceInstance, kind: HostKind) -> String {
            format!("{}-{kind}", instance.name)
        }
        fn reload(&mut self, _stack: &Stack) -> Result<(), RuntimeError> {
            Err(RuntimeError::NotImplemented("reload"))
        }
    }

    fn runtime() -> TableRuntime {
        let mut vars = HashMap::new();
        vars.insert("cockroach.main".into(), "cockroach://root@db:26257/master".into());
        TableRuntime {
            vars,
            lookups: Cell::new(0),
        }
    }

    #[test]
    fn plain_text_is_unchanged() {
        let rt = runtime();
        let id = ServiceInstance::new("storagenode", 0);
        assert_eq!(render(&rt, &id, "--log.level=debug").unwrap(), "--log.level=debug");
        assert_eq!(render(&rt, &id, "${unknown:thing}").unwrap(), "${unknown:thing}");
    }

    #[test]
    fn resolves_own_host_and_port() {
        let rt = runtime();
        let id = ServiceInstance::new("storagenode", 1);
        let out = render(&rt, &id, "--server.address=${host:internal}:${port:public}").unwrap();
        assert_eq!(out, "--server.address=storagenode-internal:30011");
    }

    #[test]
    fn resolves_cross_service_references() {
        let rt = runtime();
        let node = ServiceInstance::new("storagenode", 2);
        let out = render(
            &rt,
            &node,
            "${satellite-api.host:external}:${satellite-api/0.port:public} ${cockroach.var:main}",
        )
        .unwrap();
        assert_eq!(
            out,
            "satellite-api-external:7777 cockroach://root@db:26257/master"
        );
    }

    #[test]
    fn unknown_port_and_host_kinds_are_errors() {
        let rt = runtime();
        let id = ServiceInstance::new("redis", 0);
        assert!(matches!(
            render(&rt, &id, "${port:debug}").unwrap_err(),
            RuntimeError::PortUnknown { .. }
        ));
        assert!(matches!(
            render(&rt, &id, "${host:sideways}").unwrap_err(),
            RuntimeError::Template(_)
        ));
    }

    #[test]
    fn rendering_observes_state_changes() {
        let mut rt = runtime();
        let id = ServiceInstance::new("redis", 0);
        assert_eq!(render(&rt, &id, "${var:url}").unwrap(), "");
        rt.vars.insert("redis.url".into(), "redis://localhost:6379".into());
        assert_eq!(render(&rt, &id, "${var:url}").unwrap(), "redis://localhost:6379");
        assert_eq!(rt.lookups.get(), 2);
    }
}
