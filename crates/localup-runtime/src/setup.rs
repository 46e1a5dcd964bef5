use std::path::Path;
use std::process::Command;

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;
use crate::layout::InstanceLayout;

/// Runs a target binary's own `setup` subcommand to produce a baseline config.
pub struct ConfigGenerator<'a> {
    program: &'a str,
}

impl<'a> ConfigGenerator<'a> {
    pub fn new(program: &'a str) -> Self {
        Self { program }
    }

    /// Generate `config.yaml` for `instance` unless it already exists.
    ///
    /// Returns the config lines with every generated default commented out,
    /// or the existing file's lines untouched when generation was skipped.
    pub fn generate(
        &self,
        instance: &ServiceInstance,
        layout: &InstanceLayout,
    ) -> Result<Vec<String>, RuntimeError> {
        let config_path = layout.config_path();
        if config_path.exists() {
            tracing::debug!(%instance, path = %config_path.display(), "Config exists, skipping setup");
            return read_lines(&config_path);
        }

        let dir = layout.dir().display().to_string();
        let mut cmd = Command::new(self.program);
        cmd.arg("setup").arg(format!("--config-dir={dir}"));
        if instance.name == "storagenode" {
            cmd.arg("--identity-dir").arg(&dir);
        }

        tracing::info!(%instance, program = self.program, "Running setup");
        let output = cmd.output()?;
        if !output.status.success() {
            // stdout first, then stderr; the streams are captured separately
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            tracing::error!(%instance, status = %output.status, output = %combined, "Setup failed");
            return Err(RuntimeError::SetupFailed {
                service: instance.to_string(),
                status: output.status.to_string(),
                output: combined,
            });
        }

        let mut lines = read_lines(&config_path)?;
        comment_out_defaults(&mut lines);
        Ok(lines)
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, RuntimeError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuntimeError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Turn every active line into a comment so only explicit settings apply.
///
/// Blank lines and lines already starting with `#` are kept as they are.
pub fn comment_out_defaults(lines: &mut [String]) {
    for line in lines.iter_mut() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            *line = format!("#{trimmed}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_out_active_lines_only() {
        let mut lines: Vec<String> = vec![
            "addr: 1.2.3.4".into(),
            "# already commented".into(),
            "".into(),
            "   ".into(),
            "  nested: value  ".into(),
        ];
        comment_out_defaults(&mut lines);
        assert_eq!(
            lines,
            vec!["#addr: 1.2.3.4", "# already commented", "", "   ", "#nested: value"]
        );
    }

    #[test]
    fn existing_config_is_loaded_without_running_setup() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ServiceInstance::new("satellite-api", 0);
        let layout = InstanceLayout::new(tmp.path(), &id);
        layout.init().unwrap();
        std::fs::write(layout.config_path(), "log.level: debug\n").unwrap();

        let lines = ConfigGenerator::new("/nonexistent/satellite")
            .generate(&id, &layout)
            .unwrap();
        assert_eq!(lines, vec!["log.level: debug"]);
    }

    #[test]
    fn reading_config_drops_the_final_line_break() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "a: 1\r\n\nb: 2\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["a: 1", "", "b: 2"]);
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ServiceInstance::new("satellite-api", 0);
        let layout = InstanceLayout::new(tmp.path(), &id);
        layout.init().unwrap();

        let err = ConfigGenerator::new("/nonexistent/satellite")
            .generate(&id, &layout)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Io(_)));
    }
}
