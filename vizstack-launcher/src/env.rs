//! Environment sanitization for launched processes, mirroring
//! `sanitisedEnv` in the original implementation: VirtualGL's
//! `librrfaker.so` `LD_PRELOAD` entry must not leak into jobs the broker
//! starts on a user's behalf.

const PRELOAD_SUFFIX: &str = "/librrfaker.so";

/// Strip `librrfaker.so` (bare or path-qualified) out of an `LD_PRELOAD`
/// value. Matches the original's quirk of appending a trailing `:` after
/// every kept entry rather than joining with one.
pub fn sanitize_ld_preload(value: &str) -> String {
    let mut sanitized = String::new();
    for item in value.split(':') {
        let kept = if item == "librrfaker.so" {
            ""
        } else if item.ends_with(PRELOAD_SUFFIX) {
            ""
        } else {
            item
        };
        if !kept.is_empty() {
            sanitized.push_str(kept);
            sanitized.push(':');
        }
    }
    sanitized
}

/// Returns the current process environment with `LD_PRELOAD` sanitized,
/// suitable for passing to a launched child.
pub fn sanitized_env() -> Vec<(String, String)> {
    std::env::vars()
        .map(|(k, v)| {
            if k == "LD_PRELOAD" {
                (k, sanitize_ld_preload(&v))
            } else {
                (k, v)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_bare_librrfaker() {
        assert_eq!(sanitize_ld_preload("librrfaker.so"), "");
    }

    #[test]
    fn drops_path_qualified_librrfaker() {
        assert_eq!(sanitize_ld_preload("/usr/lib/librrfaker.so"), "");
    }

    #[test]
    fn keeps_other_entries() {
        assert_eq!(sanitize_ld_preload("/usr/lib/libfoo.so:librrfaker.so:/usr/lib/libbar.so"), "/usr/lib/libfoo.so:/usr/lib/libbar.so:");
    }
}
