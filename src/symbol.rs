//! CLI-facing symbol strategy: applies `--force-branch`/`--force-tag`/
//! `--exclude` overrides (forced classification rules) before handing off to
//! [`cvs2dvcs_state::Manager::classify_symbols`] for the unanimous/majority
//! rules and parent selection (rules 2-4, implemented in
//! `internal/state/src/symbol.rs`).

use cvs2dvcs_state::{symbol::Kind, Manager};

use crate::config::Config;

/// Applies every forced classification from the configuration. Later flags
/// win if a name is named more than once (e.g. both `--force-branch` and
/// `--exclude`): `--exclude` is applied last, so it always takes priority,
/// matching the intuition that an explicit exclusion should never be
/// silently overridden by a less specific force.
pub(crate) async fn apply_overrides(state: &Manager, config: &Config) {
    for name in &config.force_branch {
        state.force_symbol(name.as_bytes(), Kind::Branch).await;
    }

    for name in &config.force_tag {
        state.force_symbol(name.as_bytes(), Kind::Tag).await;
    }

    for name in &config.exclude {
        state.force_symbol(name.as_bytes(), Kind::Excluded).await;
    }
}

/// Resolves every symbol not already forced, returning the names classified
/// ambiguously (equal branch/tag votes) for the run's warning summary.
pub(crate) async fn classify(state: &Manager, strict: bool) -> Vec<Vec<u8>> {
    let ambiguous = state.classify_symbols(strict).await;

    for name in &ambiguous {
        log::warn!(
            "symbol {:?} has conflicting branch/tag usage across files; defaulting to branch",
            String::from_utf8_lossy(name)
        );
    }

    ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_overrides_exclude_wins_over_force_branch() {
        let state = Manager::new();
        let config = Config {
            root: "/dev/null".into(),
            tmpdir: std::env::temp_dir(),
            start: None,
            end: None,
            encoding: "latin1".into(),
            force_branch: vec!["vendor".into()],
            force_tag: vec![],
            exclude: vec!["vendor".into()],
            rename: Default::default(),
            commit_threshold: std::time::Duration::from_secs(300),
            strict: false,
            ignore_errors: false,
            jobs: 1,
            head_branch: "main".into(),
            output: crate::config::Backend::Git,
            cache_bytes: cvs2dvcs_state::cache::DEFAULT_CAPACITY_BYTES,
            prune_empty_dirs: true,
        };

        apply_overrides(&state, &config).await;

        assert_eq!(state.get_symbol_kind(b"vendor").await, Some(Kind::Excluded));
    }
}
