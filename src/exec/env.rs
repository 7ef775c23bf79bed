/// Child environment construction.
///
/// The child starts from an empty environment; only the configured
/// preserve list is copied from the host, plus a few interpreter settings.
use crate::config::settings::EvaluatorConfig;
use std::path::Path;

/// Variables forced for every child.
const FORCED: [(&str, &str); 3] = [
    ("PYTHONDONTWRITEBYTECODE", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONHASHSEED", "0"),
];

pub fn child_environment(config: &EvaluatorConfig, scratch: &Path) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = config
        .preserve_env
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
        .collect();

    for (name, value) in FORCED {
        env.retain(|(existing, _)| existing != name);
        env.push((name.to_string(), value.to_string()));
    }

    env.retain(|(existing, _)| existing != "HOME" && existing != "TMPDIR");
    let scratch = scratch.to_string_lossy().to_string();
    env.push(("HOME".to_string(), scratch.clone()));
    env.push(("TMPDIR".to_string(), scratch));
    env
}
