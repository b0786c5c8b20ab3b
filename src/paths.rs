use crate::search::SearchResult;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Output layout for downloaded files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Mirror the repository/path hierarchy under the output root.
    Structured,
    /// Collapse everything into the output root under composite names.
    Flat,
}

/// Replaces path separators and anything outside `[A-Za-z0-9._-]` with `_`,
/// then trims leading/trailing underscores and dots. Idempotent.
pub fn sanitize_part(part: &str) -> String {
    let mapped: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches(|c| c == '_' || c == '.').to_string()
}

/// Computes a unique, filesystem-safe destination for each search result.
/// Collisions within a run get a numeric disambiguator before the
/// extension; the claimed-name set resets per run.
pub struct PathResolver {
    root: PathBuf,
    mode: OutputMode,
    claimed: HashSet<PathBuf>,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, mode: OutputMode) -> Self {
        PathResolver {
            root: root.into(),
            mode,
            claimed: HashSet::new(),
        }
    }

    pub fn resolve(&mut self, result: &SearchResult) -> PathBuf {
        let candidate = match self.mode {
            OutputMode::Structured => self.structured(result),
            OutputMode::Flat => self.flat(result),
        };
        let unique = self.disambiguate(candidate);
        self.claimed.insert(unique.clone());
        unique
    }

    fn structured(&self, result: &SearchResult) -> PathBuf {
        let mut path = self.root.join(sanitize_part(&result.repository_full_name));
        // Keep the repo-relative layout as given, but never let a hostile
        // path climb out of the output root.
        for segment in result
            .file_path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        {
            path.push(segment);
        }
        path
    }

    fn flat(&self, result: &SearchResult) -> PathBuf {
        let mut parts: Vec<String> = result
            .repository_full_name
            .split('/')
            .map(sanitize_part)
            .collect();
        parts.extend(result.file_path.split('/').map(sanitize_part));
        parts.retain(|p| !p.is_empty());
        self.root.join(parts.join("_"))
    }

    fn disambiguate(&self, candidate: PathBuf) -> PathBuf {
        if !self.claimed.contains(&candidate) {
            return candidate;
        }
        for n in 1.. {
            let next = numbered(&candidate, n);
            if !self.claimed.contains(&next) {
                return next;
            }
        }
        unreachable!()
    }
}

/// `deploy/app.yaml` + 2 -> `deploy/app_2.yaml`.
fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{}_{}.{}", stem, n, ext)),
        None => path.with_file_name(format!("{}_{}", stem, n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(repo: &str, path: &str) -> SearchResult {
        SearchResult {
            repository_full_name: repo.to_string(),
            file_path: path.to_string(),
            content_url: "https://example.invalid/item".to_string(),
        }
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_part("kube/config: v1"), "kube_config__v1");
        assert_eq!(sanitize_part(r"a\b?c*d"), "a_b_c_d");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["_.weird name!.yaml_", "deploy/app.yaml", "...", "plain"] {
            let once = sanitize_part(raw);
            assert_eq!(sanitize_part(&once), once);
        }
    }

    #[test]
    fn structured_mirrors_the_repo_layout() {
        let mut resolver = PathResolver::new("/out", OutputMode::Structured);
        let path = resolver.resolve(&result("octo/infra", "deploy/base/app.yaml"));
        assert_eq!(path, PathBuf::from("/out/octo_infra/deploy/base/app.yaml"));
    }

    #[test]
    fn structured_ignores_traversal_segments() {
        let mut resolver = PathResolver::new("/out", OutputMode::Structured);
        let path = resolver.resolve(&result("octo/infra", "../../etc/passwd"));
        assert_eq!(path, PathBuf::from("/out/octo_infra/etc/passwd"));
    }

    #[test]
    fn flat_collapses_into_composite_names() {
        let mut resolver = PathResolver::new("/out", OutputMode::Flat);
        let path = resolver.resolve(&result("octo/infra", "deploy/base/app.yaml"));
        assert_eq!(path, PathBuf::from("/out/octo_infra_deploy_base_app.yaml"));
    }

    #[test]
    fn distinct_results_get_distinct_paths_in_both_modes() {
        for mode in [OutputMode::Structured, OutputMode::Flat] {
            let mut resolver = PathResolver::new("/out", mode);
            let a = resolver.resolve(&result("octo/infra", "deploy/app.yaml"));
            let b = resolver.resolve(&result("octo/infra", "deploy/app.yml"));
            let c = resolver.resolve(&result("octo/other", "deploy/app.yaml"));
            assert_ne!(a, b);
            assert_ne!(a, c);
            assert_ne!(b, c);
        }
    }

    #[test]
    fn flat_collisions_are_numbered_before_the_extension() {
        let mut resolver = PathResolver::new("/out", OutputMode::Flat);
        // Different raw paths that sanitize to the same flat name.
        let a = resolver.resolve(&result("octo/infra", "deploy app.yaml"));
        let b = resolver.resolve(&result("octo/infra", "deploy_app.yaml"));
        let c = resolver.resolve(&result("octo/infra", "deploy?app.yaml"));
        assert_eq!(a, PathBuf::from("/out/octo_infra_deploy_app.yaml"));
        assert_eq!(b, PathBuf::from("/out/octo_infra_deploy_app_1.yaml"));
        assert_eq!(c, PathBuf::from("/out/octo_infra_deploy_app_2.yaml"));
    }

    #[test]
    fn modes_produce_different_paths_for_the_same_result() {
        let item = result("octo/infra", "deploy/app.yaml");
        let mut structured = PathResolver::new("/out", OutputMode::Structured);
        let mut flat = PathResolver::new("/out", OutputMode::Flat);
        assert_ne!(structured.resolve(&item), flat.resolve(&item));
    }
}
