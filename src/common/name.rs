//! Best-effort discovery of the filename recorded in a framed header.

use std::path::{Path, PathBuf};

/// Name written to the header when nothing better can be found.
pub const FALLBACK_NAME: &str = "stdin";

/// Something that may know what the input is called.
pub trait NameSource {
    fn name(&self) -> Option<String>;
}

impl<F: Fn() -> Option<String>> NameSource for F {
    fn name(&self) -> Option<String> {
        self()
    }
}

/// A path supplied by the user; only its final component is used.
pub struct PathName(pub PathBuf);

impl NameSource for PathName {
    fn name(&self) -> Option<String> {
        base_name(&self.0)
    }
}

/// Resolves stdin back to the file it was redirected from via
/// `/proc/self/fd/0`. Terminals, pipes and sockets have no useful name.
pub struct StdinLink;

#[cfg(target_os = "linux")]
impl NameSource for StdinLink {
    fn name(&self) -> Option<String> {
        use std::os::unix::fs::FileTypeExt;

        const FD0: &str = "/proc/self/fd/0";
        let meta = std::fs::metadata(FD0).ok()?;
        if meta.file_type().is_char_device() {
            return None;
        }
        let target = std::fs::read_link(FD0).ok()?;
        base_name(&target).filter(|name| !is_pseudo_name(name))
    }
}

#[cfg(not(target_os = "linux"))]
impl NameSource for StdinLink {
    fn name(&self) -> Option<String> {
        None
    }
}

/// First name any source produces, else [`FALLBACK_NAME`].
pub fn resolve_name(sources: &[&dyn NameSource]) -> String {
    sources
        .iter()
        .find_map(|source| source.name())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Final path component as a non-empty string.
pub fn base_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    if name.is_empty() { None } else { Some(name) }
}

// Link targets the kernel reports for anonymous fds, e.g. "pipe:[4026]".
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn is_pseudo_name(name: &str) -> bool {
    ["pipe:", "socket:", "anon_inode:"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}
