use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft limit of open file descriptors up to `target`,
/// bounded by the hard limit. Each in-flight send owns a socket.
pub fn raise_nofile(target: rlim_t) -> std::io::Result<()> {
    use std::{io, mem};

    // SAFETY: `lim` is a plain C struct fully written by `getrlimit`
    // before it is read.
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
                "ulimit: current nofile limit suffices",
            );
            return Ok(());
        }

        let previous = lim.rlim_cur;
        lim.rlim_cur = wanted;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::info!(previous, current = wanted, "ulimit: raised nofile soft limit");
    }

    Ok(())
}
