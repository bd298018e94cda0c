// Local crates
use crate::{
    error::BridgeError,
    store::{client::LogStore, models::Kind},
};

// External crates
use glob::Pattern;
use std::io::{self, Write};
use tracing::{debug, info, instrument};

/// Glob metacharacters recognised in requested stream names.
const GLOB_METACHARACTERS: [char; 2] = ['*', '?'];

/// Whether `name` is a pattern (contains `*` or `?`) rather than a literal stream name.
pub fn is_pattern(name: &str) -> bool {
    name.contains(GLOB_METACHARACTERS)
}

/// Compile a requested name into a shell-style matcher.
///
/// Only `*` and `?` are special, brackets are matched literally.
pub fn compile_pattern(name: &str) -> Result<Pattern, BridgeError> {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            _ => escaped.push(c),
        }
    }

    Pattern::new(&escaped).map_err(|e| BridgeError::InvalidPattern {
        pattern: name.to_string(),
        reason: e.to_string(),
    })
}

/// Discover every stream the store holds, in listing order. Keys of any other kind are
/// skipped.
#[instrument(name = "stream_bridge_discovery::streams", target = "discovery::resolver", skip_all, level = "debug")]
pub async fn discover_streams<S: LogStore>(store: &mut S) -> Result<Vec<String>, BridgeError> {
    let keys = store.list_keys().await?;
    let kinds = store.kinds_of(&keys).await?;

    let streams: Vec<String> = keys
        .into_iter()
        .zip(kinds)
        .filter(|(_, kind)| *kind == Kind::Stream)
        .map(|(key, _)| key)
        .collect();

    debug!(stream_count = streams.len(), "Discovered streams in store");
    Ok(streams)
}

/// Expand requested names into the concrete streams to act on.
///
/// Literal names are kept as given. When at least one pattern is requested the store is
/// enumerated once and every discovered stream matching a pattern is added. The result is
/// deduplicated and emitted in the order names were first encountered, walking `requested`
/// left to right. Fails with [`BridgeError::NoStreamsFound`] when nothing is left.
#[instrument(name = "stream_bridge_discovery::resolve", target = "discovery::resolver", skip_all, level = "debug")]
pub async fn resolve_streams<S: LogStore>(
    store: &mut S,
    requested: &[String],
) -> Result<Vec<String>, BridgeError> {
    let patterns: Vec<Option<Pattern>> = requested
        .iter()
        .map(|name| is_pattern(name).then(|| compile_pattern(name)).transpose())
        .collect::<Result<_, _>>()?;

    let discovered = if patterns.iter().any(Option::is_some) {
        discover_streams(store).await?
    } else {
        Vec::new()
    };

    let mut resolved: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !resolved.iter().any(|existing| existing == name) {
            resolved.push(name.to_string());
        }
    };

    for (name, pattern) in requested.iter().zip(&patterns) {
        match pattern {
            None => push(name.as_str()),
            Some(pattern) => discovered
                .iter()
                .filter(|stream| pattern.matches(stream))
                .for_each(|stream| push(stream.as_str())),
        }
    }

    if resolved.is_empty() {
        info!(requested = ?requested, "No streams matched the requested names");
        return Err(BridgeError::NoStreamsFound);
    }

    info!(streams = ?resolved, "Resolved streams to act on");
    Ok(resolved)
}

/// Print the resolved scope to the diagnostic channel so an operator can confirm it.
pub fn report_scope<W: Write>(out: &mut W, streams: &[String]) -> io::Result<()> {
    writeln!(out, "Monitoring following streams:")?;
    for stream in streams {
        writeln!(out, "{stream}")?;
    }
    out.flush()
}

/// Column width needed to show every resolved stream name in full.
pub fn stream_name_width(streams: &[String]) -> usize {
    streams
        .iter()
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_store::InMemoryStore;
    use rstest::rstest;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn store_with(streams: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for stream in streams {
            store.create_stream(stream).unwrap();
        }
        store
    }

    #[rstest]
    #[case("orders*", &["orders", "orders-eu"])]
    #[case("orders-??", &["orders-eu"])]
    #[case("*-eu", &["orders-eu", "audit-eu"])]
    #[case("*", &["orders", "orders-eu", "audit-eu", "a[1]"])]
    #[case("a[1?", &["a[1]"])]
    #[case("nothing*", &[])]
    fn should_match_shell_glob_semantics(#[case] pattern: &str, #[case] expected: &[&str]) {
        let pattern = compile_pattern(pattern).unwrap();
        let existing = ["orders", "orders-eu", "audit-eu", "a[1]"];

        let matched: Vec<_> = existing
            .iter()
            .copied()
            .filter(|name| pattern.matches(name))
            .collect();

        assert_eq!(matched, expected);
    }

    #[rstest]
    #[case("orders", false)]
    #[case("orders*", true)]
    #[case("order?", true)]
    #[case("a[1]", false)]
    fn should_detect_patterns(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_pattern(name), expected);
    }

    #[tokio::test]
    async fn should_expand_pattern_against_discovered_streams() {
        // given
        let mut store = store_with(&["orders", "orders-eu", "payments"]);

        // when
        let resolved = resolve_streams(&mut store, &names(&["orders*"])).await.unwrap();

        // then
        assert_eq!(resolved, names(&["orders", "orders-eu"]));
    }

    #[tokio::test]
    async fn should_ignore_keys_that_are_not_streams() {
        let mut store = store_with(&["events"]);
        store.create_key("events-count", Kind::String).unwrap();
        store.create_key("events-queue", Kind::List).unwrap();

        let resolved = resolve_streams(&mut store, &names(&["events*"])).await.unwrap();

        assert_eq!(resolved, names(&["events"]));
    }

    #[tokio::test]
    async fn should_union_literals_and_patterns_without_duplicates() {
        let mut store = store_with(&["a1", "a2", "b1"]);

        let resolved = resolve_streams(&mut store, &names(&["b1", "a*", "a1", "b?"]))
            .await
            .unwrap();

        assert_eq!(resolved, names(&["b1", "a1", "a2"]));
    }

    #[tokio::test]
    async fn should_not_enumerate_store_for_literal_names() {
        let mut store = InMemoryStore::new();

        let resolved = resolve_streams(&mut store, &names(&["not-yet-created"]))
            .await
            .unwrap();

        assert_eq!(resolved, names(&["not-yet-created"]));
        assert_eq!(store.stats().unwrap().list_keys, 0);
    }

    #[tokio::test]
    async fn should_fail_when_nothing_resolves() {
        let mut store = store_with(&["orders"]);

        let empty = resolve_streams(&mut store, &[]).await;
        let unmatched = resolve_streams(&mut store, &names(&["payments*"])).await;

        assert!(matches!(empty, Err(BridgeError::NoStreamsFound)));
        assert!(matches!(unmatched, Err(BridgeError::NoStreamsFound)));
    }

    #[test]
    fn should_report_scope_one_name_per_line() {
        let mut out = Vec::new();

        report_scope(&mut out, &names(&["a", "b"])).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Monitoring following streams:\na\nb\n"
        );
    }

    #[test]
    fn should_size_column_to_longest_name() {
        assert_eq!(stream_name_width(&names(&["x", "orders-eu", "ab"])), 9);
        assert_eq!(stream_name_width(&[]), 0);
    }
}
