//! Bounded zero-copy file-to-file transfer.
//!
//! On Linux each call is one `sendfile(2)`; elsewhere, or when the kernel
//! refuses the descriptors, a plain read/write copy moves the same chunk.

use std::fs::File;
use std::io::{self, Read};

/// Moves at most `len` bytes from the current position of `src` to the
/// current position of `dst`. Returns the number of bytes moved, `0` at EOF.
#[cfg(target_os = "linux")]
pub(crate) fn send_chunk(src: &File, dst: &File, len: usize) -> io::Result<usize> {
    use std::os::fd::AsRawFd;

    loop {
        // SAFETY: both descriptors come from live `&File` borrows. A null
        // offset makes the kernel use and advance the source position.
        let result =
            unsafe { libc::sendfile(dst.as_raw_fd(), src.as_raw_fd(), std::ptr::null_mut(), len) };
        if result >= 0 {
            return Ok(result as usize);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EINVAL) | Some(libc::ENOSYS) => return copy_chunk(src, dst, len),
            _ => return Err(err),
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn send_chunk(src: &File, dst: &File, len: usize) -> io::Result<usize> {
    copy_chunk(src, dst, len)
}

fn copy_chunk(src: &File, dst: &File, len: usize) -> io::Result<usize> {
    let mut reader = src.take(len as u64);
    let mut writer = dst;
    let copied = io::copy(&mut reader, &mut writer)?;
    Ok(copied as usize)
}
