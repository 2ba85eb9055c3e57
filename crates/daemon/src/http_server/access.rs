//! Path allow-list for the gateway handlers mounted on the API service.
//!
//! The API service also answers `/ipfs/...` requests so the bundled web UI
//! can load. Unless the daemon runs with `--unrestricted-api`, only the
//! web UI's own paths are reachable there. This is a coarse path filter:
//! it is NOT authentication and offers no protection for the command
//! surface itself. Keep the API address on a loopback interface.

/// Content paths of the bundled web UI, in order of preference.
pub const WEBUI_PATHS: &[&str] = &["/ipfs/QmR9MzChjp1MdFWik7NjEjqKQMzVmBkdK3dz14A6B5Cupm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    unrestricted: bool,
}

impl AccessPolicy {
    pub fn new(unrestricted: bool) -> Self {
        Self { unrestricted }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    pub fn allows(&self, path: &str) -> bool {
        self.unrestricted || WEBUI_PATHS.iter().any(|allowed| path.starts_with(allowed))
    }
}
