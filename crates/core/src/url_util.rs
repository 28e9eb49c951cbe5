// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URL-origin normalization used by the reaper to decide whether an attach
//! process belongs to this instance: ensure scheme, treat `localhost` and
//! `127.0.0.1` as equal, compare origins.

/// Normalize a URL (or bare host:port) down to a comparable origin string
/// `scheme://host:port`, with `localhost` folded to `127.0.0.1`.
pub fn normalize_origin(raw: &str) -> Option<String> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let without_scheme = with_scheme.splitn(2, "://").nth(1)?;
    let scheme = with_scheme.splitn(2, "://").next()?;
    let authority = without_scheme.split(['/', '?', '#']).next()?;
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
        _ => (authority, None),
    };

    let host = if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1"
    } else {
        host
    };

    Some(match port {
        Some(p) => format!("{scheme}://{host}:{p}"),
        None => format!("{scheme}://{host}"),
    })
}

/// True iff both URLs normalize to the same origin.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (normalize_origin(a), normalize_origin(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_and_loopback_are_the_same_origin() {
        assert!(same_origin("http://localhost:4096", "http://127.0.0.1:4096"));
    }

    #[test]
    fn different_ports_are_different_origins() {
        assert!(!same_origin("http://localhost:4097", "http://127.0.0.1:4096"));
    }

    #[test]
    fn missing_scheme_defaults_to_http() {
        assert_eq!(
            normalize_origin("127.0.0.1:4096"),
            normalize_origin("http://127.0.0.1:4096")
        );
    }

    #[test]
    fn host_case_is_insensitive_for_localhost() {
        assert!(same_origin("http://LOCALHOST:4096", "http://127.0.0.1:4096"));
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-z0-9.:/]{1,40}") {
            if let Some(first) = normalize_origin(&s) {
                let second = normalize_origin(&first);
                proptest::prop_assert_eq!(Some(first), second);
            }
        }
    }
}
