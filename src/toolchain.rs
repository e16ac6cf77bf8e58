use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// Replaced by the absolute path of the source file
pub const INPUT_PLACEHOLDER: &str = "%INPUT%";
/// Replaced by the absolute path of the compiled artifact
pub const OUTPUT_PLACEHOLDER: &str = "%OUTPUT%";
/// Replaced by the absolute path of the workspace directory
pub const DIR_PLACEHOLDER: &str = "%DIR%";

/// File name of the compiled artifact inside a workspace
pub const EXECUTABLE_NAME: &str = "main.out";

/// Compile and run command templates for one language
///
/// Command templates are argv vectors; the placeholders above are expanded
/// per token, so paths containing spaces stay a single argument.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolchainDescriptor {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Name the submitted source is saved under. Toolchains that derive the
    /// entry point from the file name (`Main.java`) require the submission
    /// to use that name.
    pub file_name: String,
    #[serde(default)]
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
    /// Whether the address-space limit applies to the run step
    #[serde(default = "default_memory_limit")]
    pub memory_limit: bool,
}

fn default_memory_limit() -> bool {
    true
}

impl ToolchainDescriptor {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("toolchain name must not be empty");
        }
        if self.file_name.is_empty()
            || self.file_name.contains('/')
            || self.file_name.contains('\\')
            || self.file_name == "."
            || self.file_name == ".."
        {
            bail!(
                "toolchain {}: invalid source file name {:?}",
                self.name,
                self.file_name
            );
        }
        if self.file_name == EXECUTABLE_NAME {
            bail!(
                "toolchain {}: source file name clashes with {EXECUTABLE_NAME}",
                self.name
            );
        }
        if self.run.is_empty() {
            bail!("toolchain {}: run command is empty", self.name);
        }
        if matches!(&self.compile, Some(compile) if compile.is_empty()) {
            bail!("toolchain {}: compile command is empty", self.name);
        }
        Ok(())
    }
}

/// Expands the workspace placeholders in every token of `template`
pub fn render_command(
    template: &[String],
    source: &Path,
    executable: &Path,
    dir: &Path,
) -> Vec<String> {
    let source = source.to_string_lossy();
    let executable = executable.to_string_lossy();
    let dir = dir.to_string_lossy();
    let mapping = [
        (INPUT_PLACEHOLDER, source.as_ref()),
        (OUTPUT_PLACEHOLDER, executable.as_ref()),
        (DIR_PLACEHOLDER, dir.as_ref()),
    ];

    template
        .iter()
        .map(|token| {
            let mut t = token.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}

/// Built-in toolchains: Python (run only), Java and C++
pub fn builtin_toolchains() -> Vec<ToolchainDescriptor> {
    let argv = |tokens: &[&str]| tokens.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![
        ToolchainDescriptor {
            name: "python".to_string(),
            aliases: vec!["py".to_string(), "python3".to_string()],
            file_name: "main.py".to_string(),
            compile: None,
            run: argv(&["python3", INPUT_PLACEHOLDER]),
            memory_limit: true,
        },
        ToolchainDescriptor {
            name: "java".to_string(),
            aliases: Vec::new(),
            file_name: "Main.java".to_string(),
            compile: Some(argv(&["javac", "-d", DIR_PLACEHOLDER, INPUT_PLACEHOLDER])),
            run: argv(&["java", "-cp", DIR_PLACEHOLDER, "Main"]),
            // The JVM reserves far more address space than it touches
            memory_limit: false,
        },
        ToolchainDescriptor {
            name: "cpp".to_string(),
            aliases: vec!["c++".to_string()],
            file_name: "main.cpp".to_string(),
            compile: Some(argv(&[
                "g++",
                INPUT_PLACEHOLDER,
                "-o",
                OUTPUT_PLACEHOLDER,
            ])),
            run: argv(&[OUTPUT_PLACEHOLDER]),
            memory_limit: true,
        },
    ]
}

/// Read-only map from language identifiers to toolchains
#[derive(Debug)]
pub struct ToolchainRegistry {
    toolchains: Vec<Arc<ToolchainDescriptor>>,
    index: HashMap<String, usize>,
}

impl ToolchainRegistry {
    /// Builds a registry from exactly the given descriptors
    pub fn new(toolchains: Vec<ToolchainDescriptor>) -> Result<Self> {
        let mut registry = Self {
            toolchains: Vec::with_capacity(toolchains.len()),
            index: HashMap::new(),
        };

        for toolchain in toolchains {
            toolchain.validate()?;
            let slot = registry.toolchains.len();
            for key in std::iter::once(&toolchain.name).chain(toolchain.aliases.iter()) {
                let key = key.to_lowercase();
                if registry.index.insert(key.clone(), slot).is_some() {
                    bail!("language identifier {key:?} is defined more than once");
                }
            }
            registry.toolchains.push(Arc::new(toolchain));
        }

        log::info!(
            "Toolchain registry ready with {} languages",
            registry.toolchains.len()
        );
        Ok(registry)
    }

    /// The built-in toolchains, with configured entries replacing a built-in
    /// of the same name or adding a new language
    pub fn with_overrides(overrides: Vec<ToolchainDescriptor>) -> Result<Self> {
        let mut toolchains = builtin_toolchains();
        for toolchain in overrides {
            match toolchains
                .iter_mut()
                .find(|t| t.name.eq_ignore_ascii_case(&toolchain.name))
            {
                Some(existing) => *existing = toolchain,
                None => toolchains.push(toolchain),
            }
        }
        Self::new(toolchains)
    }

    /// Case-insensitive lookup by name or alias
    pub fn lookup(&self, language: &str) -> Result<Arc<ToolchainDescriptor>, JudgeError> {
        self.index
            .get(&language.to_lowercase())
            .map(|&slot| Arc::clone(&self.toolchains[slot]))
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.toolchains.iter().map(|t| t.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ToolchainRegistry::with_overrides(Vec::new()).unwrap();
        for name in ["python", "PYTHON", "Python", "java", "JAVA", "cpp", "CPP"] {
            assert!(registry.lookup(name).is_ok(), "{name} should resolve");
        }
    }

    #[test]
    fn test_cpp_aliases_resolve_to_one_descriptor() {
        let registry = ToolchainRegistry::with_overrides(Vec::new()).unwrap();
        let cpp = registry.lookup("cpp").unwrap();
        let cxx = registry.lookup("C++").unwrap();
        assert!(Arc::ptr_eq(&cpp, &cxx));
        assert_eq!(cpp.name, "cpp");
    }

    #[test]
    fn test_unknown_language_is_rejected() {
        let registry = ToolchainRegistry::with_overrides(Vec::new()).unwrap();
        match registry.lookup("brainfuck") {
            Err(JudgeError::UnsupportedLanguage(lang)) => assert_eq!(lang, "brainfuck"),
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn test_override_replaces_builtin() {
        let custom = ToolchainDescriptor {
            name: "Python".to_string(),
            aliases: vec!["py".to_string()],
            file_name: "solution.py".to_string(),
            compile: None,
            run: vec!["/usr/bin/python3".to_string(), INPUT_PLACEHOLDER.to_string()],
            memory_limit: true,
        };
        let registry = ToolchainRegistry::with_overrides(vec![custom.clone()]).unwrap();
        assert_eq!(*registry.lookup("python").unwrap(), custom);
        assert!(registry.lookup("python3").is_err());
        assert_eq!(registry.names().count(), 3);
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let clash = ToolchainDescriptor {
            name: "gcc".to_string(),
            aliases: vec!["C++".to_string()],
            file_name: "main.c".to_string(),
            compile: Some(vec!["gcc".to_string(), INPUT_PLACEHOLDER.to_string()]),
            run: vec![OUTPUT_PLACEHOLDER.to_string()],
            memory_limit: true,
        };
        assert!(ToolchainRegistry::with_overrides(vec![clash]).is_err());
    }

    #[test]
    fn test_invalid_file_name_is_rejected() {
        let mut bad = builtin_toolchains().remove(0);
        bad.file_name = "../escape.py".to_string();
        assert!(ToolchainRegistry::new(vec![bad]).is_err());
    }

    #[test]
    fn test_render_command_expands_every_placeholder() {
        let dir = PathBuf::from("/tmp/judgebox-abc");
        let java = builtin_toolchains().remove(1);
        let compile = render_command(
            java.compile.as_ref().unwrap(),
            &dir.join(&java.file_name),
            &dir.join(EXECUTABLE_NAME),
            &dir,
        );
        assert_eq!(
            compile,
            vec![
                "javac",
                "-d",
                "/tmp/judgebox-abc",
                "/tmp/judgebox-abc/Main.java"
            ]
        );

        let cpp = builtin_toolchains().remove(2);
        let run = render_command(
            &cpp.run,
            &dir.join(&cpp.file_name),
            &dir.join(EXECUTABLE_NAME),
            &dir,
        );
        assert_eq!(run, vec!["/tmp/judgebox-abc/main.out"]);
    }
}
