use std::io::{self, Write};

/// Redirects the process-wide stdout and stderr descriptors to the null
/// device for as long as the guard is alive.
///
/// Native inference runtimes write straight to fd 1/2, bypassing Rust's
/// buffered handles, so the redirection happens at the descriptor level.
/// Dropping the guard restores the saved descriptors on every exit path.
pub struct OutputGuard {
    #[cfg(unix)]
    saved: [libc::c_int; 2],
}

impl OutputGuard {
    pub fn silence() -> io::Result<Self> {
        flush_std_streams();
        #[cfg(unix)]
        {
            // SAFETY: only standard descriptors and ones opened here are touched.
            let saved = unsafe { unix::redirect_to_null()? };
            Ok(Self { saved })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        flush_std_streams();
        #[cfg(unix)]
        {
            // SAFETY: `saved` holds descriptors duplicated in `silence`.
            unsafe { unix::restore(&self.saved) };
        }
    }
}

/// Runs `f` with stdout/stderr silenced when `silence` is set.
///
/// If the redirection itself fails, `f` still runs with output visible.
pub fn with_silenced_output<T>(silence: bool, f: impl FnOnce() -> T) -> T {
    let _guard = if silence {
        match OutputGuard::silence() {
            Ok(guard) => Some(guard),
            Err(e) => {
                log::warn!("Could not silence output during initialization: {e}");
                None
            }
        }
    } else {
        None
    };
    f()
}

fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(unix)]
mod unix {
    use std::io;

    const STD_FDS: [libc::c_int; 2] = [libc::STDOUT_FILENO, libc::STDERR_FILENO];

    pub(super) unsafe fn redirect_to_null() -> io::Result<[libc::c_int; 2]> {
        let saved = [libc::dup(STD_FDS[0]), libc::dup(STD_FDS[1])];
        if saved.iter().any(|fd| *fd < 0) {
            let err = io::Error::last_os_error();
            close_all(&saved);
            return Err(err);
        }

        let null = libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_WRONLY);
        if null < 0 {
            let err = io::Error::last_os_error();
            close_all(&saved);
            return Err(err);
        }

        let redirected = STD_FDS.iter().all(|fd| libc::dup2(null, *fd) >= 0);
        let err = io::Error::last_os_error();
        libc::close(null);
        if !redirected {
            restore(&saved);
            return Err(err);
        }
        Ok(saved)
    }

    pub(super) unsafe fn restore(saved: &[libc::c_int; 2]) {
        for (fd, saved_fd) in STD_FDS.iter().zip(saved.iter()) {
            libc::dup2(*saved_fd, *fd);
        }
        close_all(saved);
    }

    unsafe fn close_all(fds: &[libc::c_int]) {
        for fd in fds {
            if *fd >= 0 {
                libc::close(*fd);
            }
        }
    }
}
