//! Project-context boosting.
//!
//! Probes the project root once for well-known manifest files, extracts at
//! most one language and one framework signal plus auxiliary tags, and
//! multiplies the match score of artifacts that mention any of them. With
//! no manifest present, boosting is a no-op.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

use crate::models::ArtifactView;

/// Hard ceiling on the boost multiplier, regardless of configuration.
pub const MAX_BOOST: f64 = 1.2;

/// Signals detected from the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub language: Option<String>,
    pub framework: Option<String>,
    pub tags: Vec<String>,
}

/// Multiplies match scores for artifacts relevant to the current project.
///
/// Detection is lazy and cached for the lifetime of the booster instance;
/// the filesystem is probed at most once.
pub struct ContextBooster {
    root: PathBuf,
    multiplier: f64,
    detected: OnceLock<Option<ProjectContext>>,
}

impl ContextBooster {
    pub fn new(root: impl Into<PathBuf>, multiplier: f64) -> Self {
        Self {
            root: root.into(),
            multiplier: multiplier.clamp(1.0, MAX_BOOST),
            detected: OnceLock::new(),
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn context(&self) -> &Option<ProjectContext> {
        self.detected.get_or_init(|| {
            let detected = detect_project(&self.root);
            debug!("project context detection: {:?}", detected);
            detected
        })
    }

    /// Boost factor for one artifact, in `[1.0, 1.2]`.
    ///
    /// Checks the artifact's combined text for the detected language,
    /// framework, or any auxiliary tag, in that priority order; the first
    /// match short-circuits.
    pub fn boost(&self, artifact: &ArtifactView) -> f64 {
        let Some(context) = self.context() else {
            return 1.0;
        };

        let text = format!("{} {}", artifact.name, artifact.combined_text()).to_lowercase();

        if let Some(language) = &context.language {
            if text.contains(language.as_str()) {
                return self.multiplier;
            }
        }
        if let Some(framework) = &context.framework {
            if text.contains(framework.as_str()) {
                return self.multiplier;
            }
        }
        for tag in &context.tags {
            if text.contains(tag.as_str()) {
                return self.multiplier;
            }
        }

        1.0
    }
}

/// Probe the fixed manifest priority list and build a context from the
/// first hit. Unreadable files are skipped, not errors.
fn detect_project(root: &Path) -> Option<ProjectContext> {
    if let Some(context) = detect_node(root) {
        return Some(context);
    }
    if let Some(context) = detect_python(root) {
        return Some(context);
    }
    if let Some(context) = detect_rust(root) {
        return Some(context);
    }
    if let Some(context) = detect_go(root) {
        return Some(context);
    }
    if let Some(context) = detect_java(root) {
        return Some(context);
    }
    if root.join(".vscode/settings.json").exists() {
        return Some(ProjectContext {
            language: None,
            framework: None,
            tags: vec!["vscode".to_string()],
        });
    }
    None
}

fn detect_node(root: &Path) -> Option<ProjectContext> {
    let manifest = root.join("package.json");
    if !manifest.exists() {
        return None;
    }

    let mut language = "javascript".to_string();
    let mut framework = None;
    let mut tags = vec!["node".to_string()];

    if let Ok(raw) = fs::read_to_string(&manifest) {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
            let mut dependencies: Vec<String> = Vec::new();
            for key in ["dependencies", "devDependencies"] {
                if let Some(map) = json.get(key).and_then(|d| d.as_object()) {
                    dependencies.extend(map.keys().cloned());
                }
            }
            if dependencies.iter().any(|d| d == "typescript") {
                language = "typescript".to_string();
            }
            framework = ["react", "vue", "angular", "svelte", "next", "express", "fastify"]
                .iter()
                .find(|f| dependencies.iter().any(|d| d == *f))
                .map(|f| f.to_string());
        }
    }

    if root.join("yarn.lock").exists() {
        tags.push("yarn".to_string());
    } else if root.join("pnpm-lock.yaml").exists() {
        tags.push("pnpm".to_string());
    } else {
        tags.push("npm".to_string());
    }

    Some(ProjectContext {
        language: Some(language),
        framework,
        tags,
    })
}

fn detect_python(root: &Path) -> Option<ProjectContext> {
    let source = if root.join("pyproject.toml").exists() {
        root.join("pyproject.toml")
    } else if root.join("requirements.txt").exists() {
        root.join("requirements.txt")
    } else {
        return None;
    };

    let raw = fs::read_to_string(&source).unwrap_or_default().to_lowercase();
    let framework = ["django", "flask", "fastapi"]
        .iter()
        .find(|f| raw.contains(*f))
        .map(|f| f.to_string());

    let mut tags = vec!["python".to_string()];
    if root.join("poetry.lock").exists() {
        tags.push("poetry".to_string());
    } else {
        tags.push("pip".to_string());
    }

    Some(ProjectContext {
        language: Some("python".to_string()),
        framework,
        tags,
    })
}

fn detect_rust(root: &Path) -> Option<ProjectContext> {
    let manifest = root.join("Cargo.toml");
    if !manifest.exists() {
        return None;
    }

    let raw = fs::read_to_string(&manifest).unwrap_or_default().to_lowercase();
    let framework = ["axum", "actix", "rocket", "tauri"]
        .iter()
        .find(|f| raw.contains(*f))
        .map(|f| f.to_string());

    Some(ProjectContext {
        language: Some("rust".to_string()),
        framework,
        tags: vec!["cargo".to_string()],
    })
}

fn detect_go(root: &Path) -> Option<ProjectContext> {
    let manifest = root.join("go.mod");
    if !manifest.exists() {
        return None;
    }

    let raw = fs::read_to_string(&manifest).unwrap_or_default().to_lowercase();
    let framework = ["gin", "echo", "fiber"]
        .iter()
        .find(|f| raw.contains(*f))
        .map(|f| f.to_string());

    Some(ProjectContext {
        language: Some("go".to_string()),
        framework,
        tags: vec!["golang".to_string()],
    })
}

fn detect_java(root: &Path) -> Option<ProjectContext> {
    let (source, build_tag) = if root.join("pom.xml").exists() {
        (root.join("pom.xml"), "maven")
    } else if root.join("build.gradle").exists() {
        (root.join("build.gradle"), "gradle")
    } else {
        return None;
    };

    let raw = fs::read_to_string(&source).unwrap_or_default().to_lowercase();
    let framework = if raw.contains("spring") {
        Some("spring".to_string())
    } else {
        None
    };

    Some(ProjectContext {
        language: Some("java".to_string()),
        framework,
        tags: vec![build_tag.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn artifact(name: &str, description: &str, tags: &[&str]) -> ArtifactView {
        ArtifactView::new(
            name,
            name,
            "skill",
            None,
            Some(description.to_string()),
            tags.iter().map(|t| t.to_string()).collect(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_no_manifest_is_noop() {
        let tmp = TempDir::new().unwrap();
        let booster = ContextBooster::new(tmp.path(), 1.1);
        let a = artifact("rust-helper", "rust tooling", &["rust"]);
        assert_eq!(booster.boost(&a), 1.0);
    }

    #[test]
    fn test_node_project_boosts_matching_artifact() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("package.json"),
            r#"{"dependencies": {"react": "^18.0.0"}}"#,
        )
        .unwrap();

        let booster = ContextBooster::new(tmp.path(), 1.1);
        let react = artifact("react-helper", "component scaffolding for react", &[]);
        let python = artifact("py-helper", "python utilities", &["python"]);

        assert_eq!(booster.boost(&react), 1.1);
        assert_eq!(booster.boost(&python), 1.0);
    }

    #[test]
    fn test_typescript_detected_from_dependencies() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("package.json"),
            r#"{"devDependencies": {"typescript": "^5.0.0"}}"#,
        )
        .unwrap();

        let booster = ContextBooster::new(tmp.path(), 1.1);
        let ts = artifact("ts-lint", "typescript linting rules", &[]);
        assert_eq!(booster.boost(&ts), 1.1);
    }

    #[test]
    fn test_rust_project_detected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\n\n[dependencies]\naxum = \"0.8\"\n",
        )
        .unwrap();

        let booster = ContextBooster::new(tmp.path(), 1.15);
        assert_eq!(
            booster.boost(&artifact("web-helper", "axum route scaffolding", &[])),
            1.15
        );
        assert_eq!(
            booster.boost(&artifact("crate-helper", "rust crate publishing", &[])),
            1.15
        );
    }

    #[test]
    fn test_multiplier_clamped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("go.mod"), "module example.com/demo\n").unwrap();

        let booster = ContextBooster::new(tmp.path(), 3.0);
        assert_eq!(booster.multiplier(), MAX_BOOST);
        let a = artifact("go-helper", "go tooling", &[]);
        assert!(booster.boost(&a) <= MAX_BOOST);

        let low = ContextBooster::new(tmp.path(), 0.5);
        assert_eq!(low.multiplier(), 1.0);
    }

    #[test]
    fn test_editor_marker_yields_tag_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".vscode")).unwrap();
        std::fs::write(tmp.path().join(".vscode/settings.json"), "{}").unwrap();

        let booster = ContextBooster::new(tmp.path(), 1.1);
        assert_eq!(
            booster.boost(&artifact("vscode-snippets", "editor snippets for vscode", &[])),
            1.1
        );
        assert_eq!(booster.boost(&artifact("pdf-skill", "pdf tools", &[])), 1.0);
    }

    #[test]
    fn test_node_takes_priority_over_rust() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("package.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();

        let booster = ContextBooster::new(tmp.path(), 1.1);
        // javascript wins the probe; a rust-only artifact gets no boost.
        assert_eq!(
            booster.boost(&artifact("rust-helper", "rust tooling", &[])),
            1.0
        );
        assert_eq!(
            booster.boost(&artifact("js-helper", "javascript tooling", &[])),
            1.1
        );
    }
}
