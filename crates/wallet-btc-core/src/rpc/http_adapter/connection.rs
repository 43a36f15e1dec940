use std::path::Path;

use reqwest::Url;

use crate::error::CoreError;

pub(crate) fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
    cookie_file: Option<&Path>,
) -> Result<Option<(String, String)>, CoreError> {
    match (user, pass) {
        (Some(u), Some(p)) => return Ok(Some((u.to_owned(), p.to_owned()))),
        (Some(_), None) | (None, Some(_)) => {
            return Err(CoreError::Param(
                "both rpc user and rpc pass must be set together".to_owned(),
            ));
        }
        (None, None) => {}
    }

    let Some(cookie_file) = cookie_file else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(cookie_file).map_err(|e| {
        CoreError::Param(format!(
            "failed to read rpc cookie file {}: {e}",
            cookie_file.display()
        ))
    })?;
    let line = content
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| {
            CoreError::Param(format!("rpc cookie file {} is empty", cookie_file.display()))
        })?;

    match line.split_once(':') {
        Some((u, p)) if !u.is_empty() && !p.is_empty() => Ok(Some((u.to_owned(), p.to_owned()))),
        _ => Err(CoreError::Param(format!(
            "rpc cookie file {} must contain non-empty `username:password`",
            cookie_file.display()
        ))),
    }
}

/// Validate an HTTP(S) endpoint URL, returning it without a trailing slash.
pub(crate) fn parse_http_url(url: &str) -> Result<String, CoreError> {
    let parsed = Url::parse(url).map_err(|e| {
        CoreError::Param(format!("invalid url `{url}`: expected HTTP(S) URL ({e})"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.trim_end_matches('/').to_owned()),
        other => Err(CoreError::Param(format!(
            "unsupported url scheme `{other}`; expected http or https"
        ))),
    }
}
