use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub index_path: PathBuf,
    pub log_dir: PathBuf,
    pub config_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let mut paths = Self::from_root(&project_root);

        if let Ok(dir) = env::var("CXR_DATA_DIR") {
            paths.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("CXR_INDEX_PATH") {
            paths.index_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CXR_CONFIG_PATH") {
            paths.config_path = PathBuf::from(path);
        }

        paths.ensure_dirs();
        paths
    }

    /// Layout rooted at `root` without consulting the environment.
    pub fn from_root(root: &Path) -> Self {
        AppPaths {
            project_root: root.to_path_buf(),
            data_dir: root.join("data"),
            index_path: root.join("vector_db").join("canvasxpress_rag.db"),
            log_dir: root.join("logs"),
            config_path: root.join("config.yml"),
            secrets_path: root.join("secrets.yaml"),
        }
    }

    pub fn ensure_dirs(&self) {
        let _ = fs::create_dir_all(&self.log_dir);
        if let Some(parent) = self.index_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("CXR_ROOT") {
        return PathBuf::from(root);
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if cwd.join("config.yml").exists() || cwd.join("data").is_dir() {
        return cwd;
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    cwd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_root_lays_out_files_under_root() {
        let paths = AppPaths::from_root(Path::new("/srv/cxr"));
        assert_eq!(paths.data_dir, PathBuf::from("/srv/cxr/data"));
        assert_eq!(
            paths.index_path,
            PathBuf::from("/srv/cxr/vector_db/canvasxpress_rag.db")
        );
        assert_eq!(paths.config_path, PathBuf::from("/srv/cxr/config.yml"));
    }
}
