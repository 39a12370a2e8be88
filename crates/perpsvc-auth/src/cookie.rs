//! Minimal cookie helpers for the session and nonce cookies.

/// Attributes shared by every cookie we set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieOptions {
    /// Add the `Secure` attribute (HTTPS deployments).
    pub secure: bool,
}

/// `name=value; Path=/; HttpOnly; SameSite=Lax; Max-Age=N`.
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, opts: CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if opts.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Expire a cookie immediately.
pub fn clear_cookie(name: &str, opts: CookieOptions) -> String {
    set_cookie(name, "", 0, opts)
}

/// Find a cookie value in a `Cookie` request header.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_cookie_attributes() {
        let c = set_cookie("login_nonce", "abc", 600, CookieOptions::default());
        assert_eq!(c, "login_nonce=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=600");

        let c = set_cookie("app_session", "t", 10, CookieOptions { secure: true });
        assert!(c.ends_with("; Secure"));
    }

    #[test]
    fn test_clear_cookie() {
        assert!(clear_cookie("app_session", CookieOptions::default()).contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let header = "theme=dark; login_nonce=XYZ123; app_session=aa.bb";
        assert_eq!(read_cookie(header, "login_nonce"), Some("XYZ123"));
        assert_eq!(read_cookie(header, "app_session"), Some("aa.bb"));
        assert_eq!(read_cookie(header, "missing"), None);
    }
}
