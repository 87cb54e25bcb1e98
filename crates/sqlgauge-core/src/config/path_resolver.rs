use std::path::{Path, PathBuf};

/// Resolves paths found in a config file against the file's directory.
#[derive(Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    pub fn new(config_path: &Path) -> Self {
        let base_dir = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Self { base_dir }
    }

    pub fn resolve(&self, p: &Path) -> PathBuf {
        // sqlite special names are not files
        if p.as_os_str().is_empty() || p.is_absolute() || p == Path::new(":memory:") {
            return p.to_path_buf();
        }
        self.join_clean(p)
    }

    fn join_clean(&self, rel: &Path) -> PathBuf {
        let joined = self.base_dir.join(rel);

        let mut out = PathBuf::new();
        for c in joined.components() {
            use std::path::Component::*;
            match c {
                CurDir => {}
                // `..` cancels a normal segment, stops at the root and is
                // kept when nothing precedes it
                ParentDir => match out.components().next_back() {
                    Some(Normal(_)) => {
                        out.pop();
                    }
                    Some(RootDir) | Some(Prefix(_)) => {}
                    _ => out.push(".."),
                },
                RootDir | Prefix(_) | Normal(_) => out.push(c.as_os_str()),
            }
        }
        if out.as_os_str().is_empty() {
            out.push(".");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_relative_to_config_dir() {
        let r = PathResolver::new(Path::new("conf/sqlgauge.yaml"));
        assert_eq!(r.resolve(Path::new("t2s.db")), PathBuf::from("conf/t2s.db"));
        assert_eq!(r.resolve(Path::new("../t2s.db")), PathBuf::from("t2s.db"));
        assert_eq!(r.resolve(Path::new("/abs/t2s.db")), PathBuf::from("/abs/t2s.db"));
        assert_eq!(r.resolve(Path::new(":memory:")), PathBuf::from(":memory:"));
    }

    #[test]
    fn test_leading_parent_dirs_are_kept() {
        let r = PathResolver::new(Path::new("sqlgauge.yaml"));
        assert_eq!(
            r.resolve(Path::new("../shared/t2s.db")),
            PathBuf::from("../shared/t2s.db")
        );
        let r = PathResolver::new(Path::new("conf/sqlgauge.yaml"));
        assert_eq!(
            r.resolve(Path::new("../../data/t2s.db")),
            PathBuf::from("../data/t2s.db")
        );
        let r = PathResolver::new(Path::new("/etc/sqlgauge.yaml"));
        assert_eq!(r.resolve(Path::new("../../t2s.db")), PathBuf::from("/t2s.db"));
    }
}
