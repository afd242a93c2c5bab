//! Host navigation hook

/// Path the application falls back to when the session ends
pub const ROOT_PATH: &str = "/";

/// Lets the client move the host application to another location.
///
/// In a browser this is a full page navigation; a CLI can print a notice.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}
