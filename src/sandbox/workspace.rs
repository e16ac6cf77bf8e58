use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::toolchain::{EXECUTABLE_NAME, ToolchainDescriptor, render_command};

const WORKSPACE_PREFIX: &str = "judgebox-";

/// Exclusive directory holding one invocation's source and artifacts
///
/// The directory is removed when the value is dropped, including during
/// unwinding. [`Workspace::close`] does the same but reports failures.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source: PathBuf,
    executable: PathBuf,
}

impl Workspace {
    /// Creates a uniquely named directory under `root` and writes the source
    /// into it under the toolchain's expected file name
    pub fn create(
        root: &Path,
        toolchain: &ToolchainDescriptor,
        source_code: &str,
    ) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)?;

        let source = dir.path().join(&toolchain.file_name);
        fs::write(&source, source_code)?;
        let executable = dir.path().join(EXECUTABLE_NAME);

        log::debug!(
            "Created workspace {} for {}",
            dir.path().display(),
            toolchain.name
        );
        Ok(Self {
            dir,
            source,
            executable,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Expands a command template against this workspace's paths
    pub fn render(&self, template: &[String]) -> Vec<String> {
        render_command(template, &self.source, &self.executable, self.path())
    }

    /// Removes the directory and everything in it
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        log::debug!("Removed workspace {}", path.display());
        Ok(())
    }
}
