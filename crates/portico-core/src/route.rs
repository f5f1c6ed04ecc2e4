//! Request classification.
//!
//! Every inbound path is classified before anything else happens. Priority:
//!
//! 1. `/api` is the key-exchange handshake; `/api/<name>` and `/api_<name>`
//!    are encrypted channel calls.
//! 2. `/static_<route>/<file>`, `/plugin_<view|download>/<id>` and
//!    `/utils_<file>` are asset requests.
//! 3. Everything else goes through the page pipeline.

/// How a hosted plugin file is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDisposition {
    /// Inline, with a guessed content type.
    View,
    /// As an attachment under its registered name.
    Download,
}

impl FileDisposition {
    fn parse(method: &str) -> Option<Self> {
        match method {
            "view" => Some(FileDisposition::View),
            "download" => Some(FileDisposition::Download),
            _ => None,
        }
    }
}

/// What an inbound path asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    /// `POST /api`: bootstrap a session key.
    Handshake,
    /// `POST /api/<name>`: call a sub-API through the encrypted channel.
    Channel { api: &'a str },
    /// `/static_<route>/<file>`: a file from a route's `static` directory.
    StaticAsset { route: &'a str, file: &'a str },
    /// `/plugin_<method>/<file_id>`: a file hosted by a plugin.
    PluginFile {
        disposition: Option<FileDisposition>,
        file_id: &'a str,
    },
    /// `/utils_<file>`: a bundled or generated utility script.
    Utility { file: &'a str },
    /// An asset prefix with a path that cannot name a file.
    Malformed,
    /// Anything else.
    Page { path: &'a str },
}

impl<'a> RequestTarget<'a> {
    /// Classify a request path (without query string).
    pub fn classify(path: &'a str) -> Self {
        if path == "/api" {
            return RequestTarget::Handshake;
        }
        if let Some(api) = path
            .strip_prefix("/api/")
            .or_else(|| path.strip_prefix("/api_"))
        {
            return RequestTarget::Channel { api };
        }

        if let Some(rest) = path.strip_prefix("/static_") {
            return match rest.rsplit_once('/') {
                Some((route, file)) if !route.is_empty() && !file.is_empty() => {
                    RequestTarget::StaticAsset { route, file }
                }
                _ => RequestTarget::Malformed,
            };
        }

        if let Some(rest) = path.strip_prefix("/plugin_") {
            return match rest.split_once('/') {
                Some((method, file_id)) if !file_id.is_empty() => RequestTarget::PluginFile {
                    disposition: FileDisposition::parse(method),
                    file_id,
                },
                _ => RequestTarget::Malformed,
            };
        }

        if let Some(file) = path.strip_prefix("/utils_") {
            return if file.is_empty() {
                RequestTarget::Malformed
            } else {
                RequestTarget::Utility { file }
            };
        }

        RequestTarget::Page { path }
    }

    /// Whether this target belongs to the API surface.
    pub fn is_api(&self) -> bool {
        matches!(self, RequestTarget::Handshake | RequestTarget::Channel { .. })
    }
}

/// Check that a client-supplied relative path stays inside its base directory.
///
/// Rejects empty paths, absolute paths, backslashes and any `.` or `..`
/// component.
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}
