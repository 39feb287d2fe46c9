//! Error page rendering.
//!
//! Custom pages are loaded once from a directory of `{status}.html`
//! files; everything else gets a small generated HTML page.

use bytes::Bytes;
use http::StatusCode;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::Response;

/// Cache of custom error pages loaded at startup.
#[derive(Clone, Default)]
pub struct ErrorPages {
    pages: Arc<HashMap<u16, Bytes>>,
}

impl ErrorPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load error pages from a directory.
    ///
    /// Only files named `{status_code}.html` with a 4xx or 5xx code are
    /// picked up. A missing or unreadable directory yields an empty cache.
    pub fn from_directory(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref();

        if !path.is_dir() {
            warn!(dir = %path.display(), "error pages directory not found");
            return Self::new();
        }

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to read error pages directory");
                return Self::new();
            }
        };

        let mut pages = HashMap::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }

            let code = match file_path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u16>().ok())
            {
                Some(code) if (400..600).contains(&code) => code,
                _ => continue,
            };

            match std::fs::read(&file_path) {
                Ok(content) => {
                    debug!(file = %file_path.display(), bytes = content.len(), "loaded error page");
                    pages.insert(code, Bytes::from(content));
                }
                Err(e) => warn!(file = %file_path.display(), error = %e, "failed to read error page"),
            }
        }

        if !pages.is_empty() {
            let mut codes: Vec<_> = pages.keys().copied().collect();
            codes.sort_unstable();
            info!(count = pages.len(), codes = ?codes, "loaded custom error pages");
        }

        Self {
            pages: Arc::new(pages),
        }
    }

    #[inline]
    pub fn get(&self, status: StatusCode) -> Option<&Bytes> {
        self.pages.get(&status.as_u16())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Error response for `status`.
    ///
    /// Clients that accept HTML get the custom page when one is loaded.
    pub fn render(&self, status: StatusCode, description: Option<&str>, html: bool) -> Response {
        let body = match self.get(status) {
            Some(page) if html => page.clone(),
            _ => Bytes::from(default_page(status, description)),
        };
        Response::builder().status(status).html().body(body).build()
    }
}

impl std::fmt::Debug for ErrorPages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<_> = self.pages.keys().collect();
        codes.sort_unstable();
        f.debug_struct("ErrorPages").field("codes", &codes).finish()
    }
}

/// Human readable reason phrase, "Error" for unknown codes.
pub fn status_reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

fn default_description(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "The browser (or proxy) sent a request that this server could not understand.",
        401 => "The server could not verify that you are authorized to access the URL requested.",
        403 => "You don't have the permission to access the requested resource.",
        404 => {
            "The requested URL was not found on the server. If you entered the URL manually \
             please check your spelling and try again."
        }
        405 => "The method is not allowed for the requested URL.",
        500 => {
            "The server encountered an internal error and was unable to complete your request. \
             Either the server is overloaded or there is an error in the application."
        }
        _ => "",
    }
}

fn default_page(status: StatusCode, description: Option<&str>) -> String {
    let reason = status_reason_phrase(status);
    let description = description.unwrap_or_else(|| default_description(status));
    format!(
        "<!doctype html>\n<html lang=en>\n<title>{} {}</title>\n<h1>{}</h1>\n<p>{}</p>\n",
        status.as_u16(),
        reason,
        reason,
        escape_html(description)
    )
}

/// Minimal HTML escaping for text placed into generated pages.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
