//! Mapping between directories on disk and URL prefixes.

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

use crate::build_map::{file_extension, is_script_extension};
use crate::error::BuildError;
use crate::pipeline::ExtensionMap;
use crate::resolver::PROXY_MARKER;

/// A directory served under a URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub dir: PathBuf,
    pub url: String,
}

impl Mount {
    pub fn new(dir: impl Into<PathBuf>, url: impl AsRef<str>) -> Self {
        Self {
            dir: dir.into().clean(),
            url: normalize_url_prefix(url.as_ref()),
        }
    }

    fn strip_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        if self.url == "/" {
            return url.strip_prefix('/');
        }
        let rest = url.strip_prefix(self.url.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    fn join_url(&self, relative: &str) -> String {
        if self.url == "/" {
            format!("/{relative}")
        } else {
            format!("{}/{relative}", self.url)
        }
    }
}

fn normalize_url_prefix(url: &str) -> String {
    let trimmed = url.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// A request URL mapped back to the file that builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Requested URL without query or fragment.
    pub url: String,
    pub source: PathBuf,
    /// Output extension to serve.
    pub extension: String,
    /// The URL asked for a `.proxy.js` wrapper of the output.
    pub proxy: bool,
}

/// All mounts of a server plus the plugin extension map.
#[derive(Debug, Clone)]
pub struct MountTable {
    mounts: Vec<Mount>,
    extensions: ExtensionMap,
}

impl MountTable {
    pub fn new(mut mounts: Vec<Mount>, extensions: ExtensionMap) -> Self {
        // Most specific URL prefix first.
        mounts.sort_by(|a, b| b.url.len().cmp(&a.url.len()));
        Self { mounts, extensions }
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    /// URL of `path` as it sits on disk, without extension rewriting.
    pub fn url_for_path(&self, path: &Path) -> Option<String> {
        let path = path.clean();
        let mount = self
            .mounts
            .iter()
            .filter(|m| path.starts_with(&m.dir))
            .max_by_key(|m| m.dir.components().count())?;

        let relative = path.strip_prefix(&mount.dir).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(mount.join_url(&segments.join("/")))
    }

    /// File path for a URL without query, proxy marker or extension rewriting.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        self.mounts.iter().find_map(|mount| {
            let relative = mount.strip_url(url)?;
            let relative = Path::new(relative);
            if relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
            {
                return None;
            }
            Some(mount.dir.join(relative))
        })
    }

    /// URL a source file is primarily served under, after extension rewriting.
    pub fn url_for_source(&self, path: &Path) -> Option<String> {
        let url = self.url_for_path(path)?;
        let Some(extension) = file_extension(path) else {
            return Some(url);
        };
        let output = self.extensions.primary_output(&extension);
        Some(replace_extension(&url, &extension, &output))
    }

    /// Every URL a source file can be requested under, proxies included.
    pub fn urls_for_source(&self, path: &Path) -> Vec<String> {
        let Some(url) = self.url_for_path(path) else {
            return Vec::new();
        };
        let Some(extension) = file_extension(path) else {
            return vec![url];
        };

        let mut urls = Vec::new();
        for output in self.extensions.outputs_for(&extension) {
            let output_url = replace_extension(&url, &extension, &output);
            if !is_script_extension(&output) {
                urls.push(format!("{output_url}{PROXY_MARKER}"));
            }
            urls.push(output_url);
        }
        urls
    }

    /// Find the single source file that serves `url`.
    pub fn locate(&self, url: &str) -> Result<RequestTarget, BuildError> {
        let clean = strip_query(url);
        let clean = if clean.ends_with('/') {
            format!("{clean}index.html")
        } else {
            clean.to_string()
        };

        let (base, proxy) = match clean.strip_suffix(PROXY_MARKER) {
            Some(base) if file_extension(Path::new(base)).is_some() => (base, true),
            _ => (clean.as_str(), false),
        };

        let requested = self
            .path_for_url(base)
            .ok_or_else(|| BuildError::NotFound(clean.clone()))?;
        let extension = file_extension(&requested).unwrap_or_default();

        let mut candidates = Vec::new();
        if requested.is_file() && self.extensions.outputs_for(&extension).contains(&extension) {
            candidates.push(requested.clone());
        }
        for input in self.extensions.inputs_for(&extension) {
            let candidate = requested.with_extension(input.trim_start_matches('.'));
            if candidate != requested && candidate.is_file() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        match candidates.len() {
            0 => Err(BuildError::NotFound(clean)),
            1 => Ok(RequestTarget {
                url: clean,
                source: candidates.remove(0),
                extension,
                proxy,
            }),
            _ => Err(BuildError::UrlCollision {
                url: clean,
                candidates,
            }),
        }
    }
}

/// `url` without `?query` or `#fragment`.
pub fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn replace_extension(url: &str, from: &str, to: &str) -> String {
    match url.strip_suffix(from) {
        Some(stem) => format!("{stem}{to}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ResolveSpec;

    fn table(mounts: Vec<Mount>) -> MountTable {
        MountTable::new(mounts, ExtensionMap::default())
    }

    #[test]
    fn test_normalize_url_prefix() {
        assert_eq!(normalize_url_prefix("/"), "/");
        assert_eq!(normalize_url_prefix(""), "/");
        assert_eq!(normalize_url_prefix("static/"), "/static");
        assert_eq!(normalize_url_prefix("/_dist_/"), "/_dist_");
    }

    #[test]
    fn test_url_for_path_prefers_deepest_mount() {
        let table = table(vec![
            Mount::new("/p", "/"),
            Mount::new("/p/src", "/_dist_"),
        ]);

        assert_eq!(
            table.url_for_path(Path::new("/p/src/app.js")).as_deref(),
            Some("/_dist_/app.js")
        );
        assert_eq!(
            table.url_for_path(Path::new("/p/index.html")).as_deref(),
            Some("/index.html")
        );
        assert_eq!(table.url_for_path(Path::new("/elsewhere/a.js")), None);
    }

    #[test]
    fn test_path_for_url() {
        let table = table(vec![
            Mount::new("/p/public", "/"),
            Mount::new("/p/src", "/_dist_"),
        ]);

        assert_eq!(
            table.path_for_url("/_dist_/a/b.js"),
            Some(PathBuf::from("/p/src/a/b.js"))
        );
        assert_eq!(
            table.path_for_url("/favicon.ico"),
            Some(PathBuf::from("/p/public/favicon.ico"))
        );
        assert_eq!(table.path_for_url("/_dist_/../secret"), None);
    }

    #[test]
    fn test_prefix_must_end_on_segment() {
        let table = table(vec![Mount::new("/p/src", "/src")]);
        assert_eq!(table.path_for_url("/srcfoo/a.js"), None);
    }

    #[test]
    fn test_urls_for_source_include_proxy() {
        let extensions = ExtensionMap::from_specs([ResolveSpec::new([".scss"], [".css"])]);
        let table = MountTable::new(vec![Mount::new("/p", "/")], extensions);

        assert_eq!(
            table.urls_for_source(Path::new("/p/a.scss")),
            vec!["/a.css.proxy.js".to_string(), "/a.css".to_string()]
        );
        assert_eq!(
            table.urls_for_source(Path::new("/p/a.js")),
            vec!["/a.js".to_string()]
        );
        assert_eq!(
            table.url_for_source(Path::new("/p/a.scss")).as_deref(),
            Some("/a.css")
        );
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("/a.js?mtime=1"), "/a.js");
        assert_eq!(strip_query("/a.js"), "/a.js");
    }
}
