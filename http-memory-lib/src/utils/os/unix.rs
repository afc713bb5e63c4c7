use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft limit of open file descriptors towards `target`,
/// capped by the hard limit. Returns the soft limit in effect afterwards.
///
/// Each pool slot keeps its own connection pool open for the whole run,
/// and the lifecycle server holds one descriptor per accepted connection.
pub fn raise_nofile(target: rlim_t) -> std::io::Result<rlim_t> {
    use std::{io, mem};

    // SAFETY: `lim` is a plain C struct, fully written by getrlimit
    // before it is read, and only passed by pointer to libc calls.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let wanted = target.min(lim.rlim_max);
        if lim.rlim_cur >= wanted {
            tracing::debug!(
                current = lim.rlim_cur,
                wanted,
                "nofile limit already sufficient",
            );
            return Ok(lim.rlim_cur);
        }

        let previous = lim.rlim_cur;
        lim.rlim_cur = wanted;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::info!(previous, applied = wanted, "raised nofile soft limit");
        Ok(wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_nofile_never_lowers_current_limit() {
        let current = raise_nofile(0).unwrap();
        assert_eq!(current, raise_nofile(0).unwrap());
        assert!(raise_nofile(current).unwrap() >= current);
    }
}
