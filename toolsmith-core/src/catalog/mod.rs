//! YAML definition source
//!
//! Layout of a definition directory:
//!
//! ```text
//! tool_defs/
//!   _aliases.yaml          alias -> target map
//!   _servers/<ns>.yaml     external server launch configs
//!   <ns>/<tool-name>.yaml  one tool definition each
//! ```
//!
//! The directory is read wholesale at startup and rewritten one file at a
//! time by registry mutations.

mod stub;

pub use stub::{STUB_MARKER, StubFile, StubGenerator};
pub(crate) use stub::env_var_name;

use crate::error::{Result, ToolsmithError};
use crate::proxy::ExternalServerConfig;
use crate::registry::{ToolAlias, ToolDefinition};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory holding external server configs
pub const SERVERS_DIR: &str = "_servers";

/// File holding the alias map
pub const ALIASES_FILE: &str = "_aliases.yaml";

/// Everything read from a definition directory
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub definitions: Vec<ToolDefinition>,
    pub aliases: Vec<ToolAlias>,
    pub servers: BTreeMap<String, ExternalServerConfig>,
    /// Non-fatal findings such as a name that does not match its path
    pub warnings: Vec<String>,
    /// Files that could not be parsed
    pub errors: Vec<String>,
}

/// Definition directory on disk
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.root.join(SERVERS_DIR)
    }

    /// Create the directory and its `_servers/` subdirectory
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.servers_dir())?;
        Ok(())
    }

    /// File that holds the definition called `name`.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` when the name has no namespace.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        match name.split_once('.') {
            Some((namespace, tool)) if !namespace.is_empty() && !tool.is_empty() => {
                Ok(self.root.join(namespace).join(format!("{}.yaml", tool)))
            }
            _ => Err(ToolsmithError::InvalidSchema(vec![format!(
                "Tool name must include namespace: 'namespace.tool-name', got '{}'",
                name
            )])),
        }
    }

    /// Tool name a definition file is expected to declare
    pub fn name_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let file = parts.pop()?;
        parts.push(file.strip_suffix(".yaml")?.to_string());
        Some(parts.join("."))
    }

    /// Read every definition, alias and server config.
    ///
    /// A missing directory yields an empty snapshot. Unparseable files are
    /// reported in `errors` and skipped.
    pub fn load(&self) -> Result<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::default();
        if !self.root.is_dir() {
            debug!(path = %self.root.display(), "Definition directory absent");
            return Ok(snapshot);
        }

        let mut files = Vec::new();
        collect_yaml_files(&self.root, &mut files)?;
        files.sort();

        for path in files {
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            if relative.starts_with(SERVERS_DIR) || relative == Path::new(ALIASES_FILE) {
                continue;
            }
            let Some(expected) = self.name_for(&path) else {
                continue;
            };

            let text = fs::read_to_string(&path)?;
            let mut definition: ToolDefinition = match serde_yaml::from_str(&text) {
                Ok(definition) => definition,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable definition");
                    snapshot
                        .errors
                        .push(format!("{}: {}", relative.display(), e));
                    continue;
                }
            };

            if definition.name.is_empty() {
                definition.name = expected;
            } else if definition.name != expected {
                snapshot.warnings.push(format!(
                    "{}: Tool name mismatch: '{}' != '{}'",
                    relative.display(),
                    definition.name,
                    expected
                ));
            }
            snapshot.definitions.push(definition);
        }

        snapshot.aliases = self.load_aliases()?;
        snapshot.servers = self.load_servers(&mut snapshot.errors)?;

        debug!(
            definitions = snapshot.definitions.len(),
            aliases = snapshot.aliases.len(),
            servers = snapshot.servers.len(),
            "Catalog loaded"
        );
        Ok(snapshot)
    }

    fn load_aliases(&self) -> Result<Vec<ToolAlias>> {
        let path = self.root.join(ALIASES_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        let map: Option<BTreeMap<String, String>> = serde_yaml::from_str(&text)?;
        Ok(map
            .unwrap_or_default()
            .into_iter()
            .map(|(alias, target)| ToolAlias::new(alias, target))
            .collect())
    }

    fn load_servers(
        &self,
        errors: &mut Vec<String>,
    ) -> Result<BTreeMap<String, ExternalServerConfig>> {
        let mut servers = BTreeMap::new();
        for namespace in self.server_names()? {
            let path = self.servers_dir().join(format!("{}.yaml", namespace));
            let text = fs::read_to_string(&path)?;
            match serde_yaml::from_str::<ExternalServerConfig>(&text) {
                Ok(mut config) => {
                    config.namespace = namespace.clone();
                    servers.insert(namespace, config);
                }
                Err(e) => errors.push(format!("{}/{}.yaml: {}", SERVERS_DIR, namespace, e)),
            }
        }
        Ok(servers)
    }

    /// Only the server configs
    pub fn servers(&self) -> Result<BTreeMap<String, ExternalServerConfig>> {
        let mut errors = Vec::new();
        let servers = self.load_servers(&mut errors)?;
        for error in errors {
            warn!(error = %error, "Skipping unreadable server config");
        }
        Ok(servers)
    }

    /// Write (or overwrite) the file for `definition`
    pub fn save_definition(&self, definition: &ToolDefinition) -> Result<PathBuf> {
        let path = self.path_for(&definition.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_yaml::to_string(definition)?)?;
        debug!(tool = %definition.name, path = %path.display(), "Definition saved");
        Ok(path)
    }

    /// Delete the file for `name`; returns whether it existed
    pub fn delete_definition(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!(tool = %name, "Definition file deleted");
        Ok(true)
    }

    /// Rewrite `_aliases.yaml`; removes the file when there are no aliases
    pub fn save_aliases(&self, aliases: &[ToolAlias]) -> Result<()> {
        let path = self.root.join(ALIASES_FILE);
        if aliases.is_empty() {
            if path.is_file() {
                fs::remove_file(&path)?;
            }
            return Ok(());
        }
        let map: BTreeMap<&str, &str> = aliases
            .iter()
            .map(|a| (a.alias.as_str(), a.target.as_str()))
            .collect();
        fs::create_dir_all(&self.root)?;
        fs::write(&path, serde_yaml::to_string(&map)?)?;
        Ok(())
    }

    /// Write `_servers/<namespace>.yaml`
    pub fn save_server(&self, config: &ExternalServerConfig) -> Result<PathBuf> {
        let dir = self.servers_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.yaml", config.namespace));
        fs::write(&path, serde_yaml::to_string(config)?)?;
        Ok(path)
    }

    /// Delete `_servers/<namespace>.yaml`; returns whether it existed
    pub fn delete_server(&self, namespace: &str) -> Result<bool> {
        let path = self.servers_dir().join(format!("{}.yaml", namespace));
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Namespaces with a server config, sorted
    pub fn server_names(&self) -> Result<Vec<String>> {
        let dir = self.servers_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "yaml") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParamType, ToolParameter};

    fn catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path().join("tool_defs"));
        (dir, catalog)
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let (_dir, catalog) = catalog();
        let snapshot = catalog.load().unwrap();
        assert!(snapshot.definitions.is_empty());
        assert!(snapshot.servers.is_empty());
    }

    #[test]
    fn test_name_path_mapping() {
        let (_dir, catalog) = catalog();
        let path = catalog.path_for("git.update-prs").unwrap();
        assert!(path.ends_with("git/update-prs.yaml"));
        assert_eq!(catalog.name_for(&path).as_deref(), Some("git.update-prs"));
        assert!(catalog.path_for("nonamespace").is_err());
    }

    #[test]
    fn test_save_then_load_definition() {
        let (_dir, catalog) = catalog();
        let def = ToolDefinition::new("demo.echo", "Echo")
            .with_module("tools/demo/echo.sh")
            .with_function("echo")
            .with_parameter(ToolParameter::required("message", ParamType::String, "Text"));

        catalog.save_definition(&def).unwrap();
        let snapshot = catalog.load().unwrap();
        assert_eq!(snapshot.definitions, vec![def]);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn test_missing_name_filled_and_mismatch_warned() {
        let (_dir, catalog) = catalog();
        let ns = catalog.root().join("notes");
        fs::create_dir_all(&ns).unwrap();
        fs::write(ns.join("todo.yaml"), "description: Track todos\nmodule: x\nfunction: todo\n")
            .unwrap();
        fs::write(ns.join("other.yaml"), "name: notes.renamed\ndescription: d\n").unwrap();

        let snapshot = catalog.load().unwrap();
        let names: Vec<_> = snapshot.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["notes.renamed", "notes.todo"]);
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.warnings[0].contains("'notes.renamed' != 'notes.other'"));
    }

    #[test]
    fn test_unparseable_file_reported() {
        let (_dir, catalog) = catalog();
        let ns = catalog.root().join("bad");
        fs::create_dir_all(&ns).unwrap();
        fs::write(ns.join("broken.yaml"), "parameters: {not: [a list").unwrap();

        let snapshot = catalog.load().unwrap();
        assert!(snapshot.definitions.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
    }

    #[test]
    fn test_aliases_roundtrip_and_cleanup() {
        let (_dir, catalog) = catalog();
        catalog
            .save_aliases(&[ToolAlias::new("demo.say", "demo.echo")])
            .unwrap();
        let snapshot = catalog.load().unwrap();
        assert_eq!(snapshot.aliases, vec![ToolAlias::new("demo.say", "demo.echo")]);
        assert!(snapshot.definitions.is_empty());

        catalog.save_aliases(&[]).unwrap();
        assert!(!catalog.root().join(ALIASES_FILE).exists());
    }

    #[test]
    fn test_servers_are_not_definitions() {
        let (_dir, catalog) = catalog();
        let config = ExternalServerConfig::new("github", "npx").with_args(["-y", "server-github"]);
        catalog.save_server(&config).unwrap();

        let snapshot = catalog.load().unwrap();
        assert!(snapshot.definitions.is_empty());
        assert_eq!(snapshot.servers["github"], config);
        assert_eq!(catalog.server_names().unwrap(), vec!["github".to_string()]);

        assert!(catalog.delete_server("github").unwrap());
        assert!(!catalog.delete_server("github").unwrap());
    }

    #[test]
    fn test_delete_definition() {
        let (_dir, catalog) = catalog();
        catalog
            .save_definition(&ToolDefinition::new("demo.gone", "bye"))
            .unwrap();
        assert!(catalog.delete_definition("demo.gone").unwrap());
        assert!(!catalog.delete_definition("demo.gone").unwrap());
    }
}
