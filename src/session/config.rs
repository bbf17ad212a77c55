//! Config-script line transforms for multi-remote profiles.
//!
//! Engines scan `remote` directives sequentially and can stall for minutes
//! on a long list of dead servers. Collapsing the list to one randomly
//! chosen remote before handing the script over sidesteps the scan.

use crate::session::types::{SessionError, SessionErrorKind};
use rand::Rng;

fn is_remote_directive(line: &str) -> bool {
    line.trim().to_lowercase().starts_with("remote ")
}

/// Count the `remote` server directives in a config script.
pub fn count_remotes(config: &str) -> usize {
    config.lines().filter(|l| is_remote_directive(l)).count()
}

/// Collapse all `remote` directives to a single randomly chosen one.
///
/// The chosen line is picked uniformly from the full collected list and
/// placed at the position of the first remote directive; all other lines
/// keep their original relative order. With a single remote this is a
/// content no-op. Lines are rejoined with `\n`; a trailing newline is not
/// preserved.
///
/// A script with no remote directives at all is rejected with
/// [`SessionErrorKind::InvalidConfig`] – there is nothing to connect to.
pub fn randomize_remote(config: Option<&str>) -> Result<Option<String>, SessionError> {
    let Some(config) = config else {
        return Ok(None);
    };

    let mut remotes: Vec<&str> = Vec::new();
    let mut out: Vec<&str> = Vec::new();
    let mut slot: Option<usize> = None;

    for line in config.lines() {
        if is_remote_directive(line) {
            if slot.is_none() {
                slot = Some(out.len());
                out.push("");
            }
            remotes.push(line);
        } else {
            out.push(line);
        }
    }

    if remotes.is_empty() {
        return Err(SessionError::new(
            SessionErrorKind::InvalidConfig,
            "config has no remote directives",
        ));
    }

    let chosen = remotes[rand::thread_rng().gen_range(0..remotes.len())];
    if let Some(i) = slot {
        out[i] = chosen;
    }
    Ok(Some(out.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_REMOTE: &str = "client\n\
        dev tun\n\
        remote alpha.example.com 1194\n\
        remote beta.example.com 1194\n\
        remote gamma.example.com 443 tcp\n\
        resolv-retry infinite\n\
        cipher AES-256-GCM";

    // ── count_remotes ────────────────────────────────────────────

    #[test]
    fn count_remotes_basic() {
        assert_eq!(count_remotes(MULTI_REMOTE), 3);
        assert_eq!(count_remotes("client\ndev tun"), 0);
    }

    #[test]
    fn count_remotes_case_insensitive() {
        assert_eq!(count_remotes("Remote a 1194\nREMOTE b 1194"), 2);
    }

    #[test]
    fn count_remotes_requires_directive_word() {
        // "remote-cert-tls" and "remote-random" are different directives
        assert_eq!(count_remotes("remote-cert-tls server\nremote-random"), 0);
    }

    // ── randomize_remote ─────────────────────────────────────────

    #[test]
    fn randomize_none_passthrough() {
        assert_eq!(randomize_remote(None).unwrap(), None);
    }

    #[test]
    fn randomize_collapses_to_one_remote() {
        let out = randomize_remote(Some(MULTI_REMOTE)).unwrap().unwrap();
        assert_eq!(count_remotes(&out), 1);
    }

    #[test]
    fn randomize_keeps_first_remote_position() {
        let out = randomize_remote(Some(MULTI_REMOTE)).unwrap().unwrap();
        let lines: Vec<&str> = out.lines().collect();
        // first remote directive was line index 2
        assert!(is_remote_directive(lines[2]));
        assert_eq!(lines[0], "client");
        assert_eq!(lines[1], "dev tun");
        assert_eq!(lines[3], "resolv-retry infinite");
        assert_eq!(lines[4], "cipher AES-256-GCM");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn randomize_chooses_from_original_remotes() {
        for _ in 0..20 {
            let out = randomize_remote(Some(MULTI_REMOTE)).unwrap().unwrap();
            let remote = out.lines().find(|l| is_remote_directive(l)).unwrap();
            assert!(MULTI_REMOTE.lines().any(|l| l == remote));
        }
    }

    #[test]
    fn randomize_eventually_picks_every_remote() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let out = randomize_remote(Some(MULTI_REMOTE)).unwrap().unwrap();
            let remote = out.lines().find(|l| is_remote_directive(l)).unwrap().to_string();
            seen.insert(remote);
        }
        // inclusive selection must be able to reach the last entry too
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn randomize_single_remote_is_noop() {
        let cfg = "client\nremote only.example.com 1194\ndev tun";
        let out = randomize_remote(Some(cfg)).unwrap().unwrap();
        assert_eq!(out, cfg);
    }

    #[test]
    fn randomize_no_remotes_is_invalid_config() {
        let err = randomize_remote(Some("client\ndev tun")).unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::InvalidConfig);
    }

    #[test]
    fn randomize_mixed_case_directive() {
        let cfg = "client\nRemote a.example.com 1194\nremote b.example.com 1194";
        let out = randomize_remote(Some(cfg)).unwrap().unwrap();
        assert_eq!(count_remotes(&out), 1);
        let lines: Vec<&str> = out.lines().collect();
        assert!(is_remote_directive(lines[1]));
    }
}
