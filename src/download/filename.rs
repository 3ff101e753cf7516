//! Filename derivation for transfer requests.
//!
//! A request's destination name is the final segment of the URL path. The
//! segment is percent-decoded, then characters that cannot appear in a single
//! path component are replaced with `_` so the name can never escape the
//! managed output directory.

use url::Url;

use super::error::DownloadError;

/// Derives the destination filename for `url`.
///
/// The query string and fragment are ignored.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] when the URL cannot be parsed or its
/// path does not end in a usable segment (`https://host/dir/`, `.`, `..`).
///
/// # Example
///
/// ```
/// use bulkfetch_core::derive_filename;
///
/// let name = derive_filename("https://example.com/forecast/2023/a-t3.nc?x=1").unwrap();
/// assert_eq!(name, "a-t3.nc");
/// ```
pub fn derive_filename(url: &str) -> Result<String, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url, "unparsable"))?;

    let last = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| DownloadError::invalid_url(url, "no final path segment"))?;

    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let name = sanitize_filename(&decoded);

    if name.is_empty() || name == "." || name == ".." {
        return Err(DownloadError::invalid_url(url, "final path segment is not a file name"));
    }
    Ok(name)
}

/// Replaces path separators, reserved characters and control characters with `_`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::FailureKind;

    #[test]
    fn test_derive_filename_takes_last_segment() {
        let name =
            derive_filename("https://mnemosyne.example.org/somisana/algoa-bay/202307/a-t3.nc")
                .unwrap();
        assert_eq!(name, "a-t3.nc");
    }

    #[test]
    fn test_derive_filename_ignores_query_and_fragment() {
        let name = derive_filename("https://example.com/data/file.nc?token=abc#frag").unwrap();
        assert_eq!(name, "file.nc");
    }

    #[test]
    fn test_derive_filename_decodes_percent_escapes() {
        let name = derive_filename("https://example.com/data/my%20file.nc").unwrap();
        assert_eq!(name, "my file.nc");
    }

    #[test]
    fn test_derive_filename_encoded_separator_cannot_escape_dir() {
        let name = derive_filename("https://example.com/data/..%2F..%2Fetc%2Fpasswd").unwrap();
        assert!(!name.contains('/'), "separator survived: {name}");
        assert_eq!(name, ".._.._etc_passwd");
    }

    #[test]
    fn test_derive_filename_rejects_trailing_slash() {
        let err = derive_filename("https://example.com/data/").unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidUrl);
    }

    #[test]
    fn test_derive_filename_rejects_bare_host() {
        let err = derive_filename("https://example.com").unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidUrl);
    }

    #[test]
    fn test_derive_filename_rejects_dot_dot() {
        // Encoded dot segments are normalized away by the parser.
        let err = derive_filename("https://example.com/data/%2E%2E").unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidUrl);
    }

    #[test]
    fn test_derive_filename_rejects_garbage() {
        let err = derive_filename("not a url").unwrap_err();
        assert!(err.to_string().contains("unparsable"));
    }

    #[test]
    fn test_sanitize_filename_replaces_reserved_chars() {
        assert_eq!(sanitize_filename("a/b\\c:d*e"), "a_b_c_d_e");
        assert_eq!(sanitize_filename("ok-name.nc"), "ok-name.nc");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }
}
