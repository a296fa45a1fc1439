//! Resolution results.

use crate::policy::Decorator;
use crate::routing::entry::RouteEntry;
use crate::routing::headers::RequestHeaders;

/// What the router decided for a request.
#[derive(Debug)]
pub enum Route {
    /// Answer with a redirect instead of forwarding.
    Redirect(RedirectEntry),
    /// Forward upstream.
    Entry(RouteEntry),
}

impl Route {
    pub fn redirect_entry(&self) -> Option<&RedirectEntry> {
        match self {
            Route::Redirect(redirect) => Some(redirect),
            Route::Entry(_) => None,
        }
    }

    pub fn route_entry(&self) -> Option<&RouteEntry> {
        match self {
            Route::Entry(entry) => Some(entry),
            Route::Redirect(_) => None,
        }
    }

    pub fn decorator(&self) -> Option<&Decorator> {
        self.route_entry().and_then(RouteEntry::decorator)
    }
}

/// A redirect target, computed from the request on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectEntry {
    host_redirect: Option<String>,
    path_redirect: Option<String>,
    https_redirect: bool,
}

impl RedirectEntry {
    pub fn new(host_redirect: Option<String>, path_redirect: Option<String>, https_redirect: bool) -> Self {
        Self {
            host_redirect,
            path_redirect,
            https_redirect,
        }
    }

    /// Same host and path over https.
    pub fn https_upgrade() -> Self {
        Self::new(None, None, true)
    }

    pub fn host_redirect(&self) -> Option<&str> {
        self.host_redirect.as_deref()
    }

    pub fn path_redirect(&self) -> Option<&str> {
        self.path_redirect.as_deref()
    }

    pub fn https_redirect(&self) -> bool {
        self.https_redirect
    }

    /// Absolute URL to send in `Location`.
    pub fn new_path(&self, headers: &RequestHeaders) -> String {
        let scheme = if self.https_redirect {
            "https"
        } else {
            headers.forwarded_proto()
        };
        let host = self.host_redirect.as_deref().unwrap_or(headers.authority());
        let path = self.path_redirect.as_deref().unwrap_or(headers.path());
        format!("{scheme}://{host}{path}")
    }
}
