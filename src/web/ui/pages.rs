//! HTML page and chrome fragments.
//!
//! Everything the proxy serves on its own behalf: the landing page, the
//! exit-confirmation interstitial, the injected head/body/form chrome, the
//! robots.txt body and the embedded favicon. All fragments ship inside the
//! binary.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;

use crate::sanitize::html::escape;

/// Injected right after `<head>`: forces UTF-8, legacy IE rendering mode and
/// a no-referrer policy on the rewritten document.
pub const HEAD_CHROME: &str = r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">
<meta http-equiv="X-UA-Compatible" content="IE=edge">
<meta name="referrer" content="no-referrer">
"#;

const PAGE_START: &str = r#"<!doctype html>
<html>
<head>
<title>MortyProxy</title>
<meta name="viewport" content="width=device-width, initial-scale=1 , maximum-scale=1.0, user-scalable=1" />
<style>
html { height: 100%; }
body { min-height : 100%; display: flex; flex-direction:column; font-family: 'Garamond', 'Georgia', serif; text-align: center; color: #444; background: #FAFAFA; margin: 0; padding: 0; font-size: 1.1em; }
input { border: 1px solid #888; padding: 0.3em; color: #444; background: #FFF; font-size: 1.1em; }
input[placeholder] { width:80%; }
a { text-decoration: none; #2980b9; }
h1, h2 { font-weight: 200; margin-bottom: 2rem; }
h1 { font-size: 3em; }
.container { flex:1; min-height: 100%; margin-bottom: 1em; }
.footer { margin: 1em; }
.footer p { font-size: 0.8em; }
</style>
</head>
<body>
	<div class="container">
		<h1>MortyProxy</h1>
"#;

const PAGE_END: &str = r#"
	</div>
	<div class="footer">
		<p>Morty rewrites web pages to exclude malicious HTML tags and CSS/HTML attributes. It also replaces external resource references to prevent third-party information leaks.<br />
		<a href="https://github.com/asciimoo/morty">view on github</a>
		</p>
	</div>
</body>
</html>"#;

/// Body of `GET /robots.txt`.
pub const ROBOTS_BODY: &str = "User-Agent: *\nDisallow: /\n";

const FAVICON_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAABAAAAAQEAYAAABPYyMiAAAABmJLR0T///////8JWPfcAAAACXBIWXMAAABIAAAASABGyWs+AAAAF0lEQVRIx2NgGAWjYBSMglEwCkbBSAcACBAAAeaR9cIAAAAASUVORK5CYII=";

/// The embedded 16x16 favicon PNG.
pub static FAVICON_BYTES: LazyLock<Vec<u8>> = LazyLock::new(|| {
    BASE64_STANDARD
        .decode(FAVICON_BASE64)
        .expect("embedded favicon is valid base64")
});

/// Renders the landing page, optionally with an error banner.
///
/// The URL form is only offered when no HMAC key is configured, because a
/// keyed instance cannot open arbitrary URLs.
#[must_use]
pub fn main_page(error: Option<&str>, has_key: bool, url_param: &str) -> String {
    let mut page = String::from(PAGE_START);
    if let Some(message) = error {
        page.push_str("<h2>Error: ");
        page.push_str(&escape(message));
        page.push_str("</h2>");
    }
    if has_key {
        page.push_str("<h3>Warning! This instance does not support direct URL opening.</h3>");
    } else {
        page.push_str(&format!(
            r#"
	<form action="post">
	Visit url: <input placeholder="https://url.." name="{url_param}" autofocus />
	<input type="submit" value="go" />
	</form>"#
        ));
    }
    page.push_str(PAGE_END);
    page
}

/// Renders the exit-confirmation interstitial linking, unproxied, to a
/// target the proxy refuses to fetch.
#[must_use]
pub fn exit_page(target: &str) -> String {
    let escaped = escape(target);
    format!(
        "{PAGE_START}<h2>You are about to exit MortyProxy</h2>\
         <p>Following</p><p><a href=\"{escaped}\" rel=\"noreferrer\">{escaped}</a></p>\
         <p>the content of this URL will be <b>NOT</b> sanitized.</p>{PAGE_END}"
    )
}

/// Renders the proxy header bar injected before `</body>`.
#[must_use]
pub fn body_chrome(base_url: &str, has_key: bool, url_param: &str) -> String {
    let escaped = escape(base_url);
    let readonly = if has_key { "readonly=\"true\"" } else { "" };
    format!(
        r#"
<input type="checkbox" id="mortytoggle" autocomplete="off" />
<div id="mortyheader">
  <form method="get">
    <label for="mortytoggle">hide</label>
    <span><a href="/">Morty Proxy</a></span>
    <input type="url" value="{escaped}" name="{url_param}" {readonly} />
    This is a <a href="https://github.com/asciimoo/morty">proxified and sanitized</a> view of the page, visit <a href="{escaped}" rel="noreferrer">original site</a>.
  </form>
</div>
<style>
body{{ position: absolute !important; top: 42px !important; left: 0 !important; right: 0 !important; bottom: 0 !important; }}
#mortyheader {{ position: fixed; margin: 0; box-sizing: border-box; -webkit-box-sizing: border-box; top: 0; left: 0; right: 0; z-index: 2147483647 !important; font-size: 12px; line-height: normal; border-width: 0px 0px 2px 0; border-style: solid; border-color: #AAAAAA; background: #FFF; padding: 4px; color: #444; height: 42px; }}
#mortyheader * {{ padding: 0; margin: 0; }}
#mortyheader p {{ padding: 0 0 0.7em 0; display: block; }}
#mortyheader a {{ color: #3498db; font-weight: bold; display: inline; }}
#mortyheader label {{ text-align: right; cursor: pointer; position: fixed; right: 4px; top: 4px; display: block; color: #444; }}
#mortyheader > form > span {{ font-size: 24px; font-weight: bold; margin-right: 20px; margin-left: 20px; }}
input[type=checkbox]#mortytoggle {{ display: none; }}
input[type=checkbox]#mortytoggle:checked ~ div {{ display: none; visibility: hidden; }}
#mortyheader input[type=url] {{ width: 50%; padding: 4px; font-size: 16px; }}
</style>
"#
    )
}

/// Renders the hidden-field pair appended after a `<form>` start tag.
#[must_use]
pub fn form_extension(
    action_url: &str,
    hash: Option<&str>,
    url_param: &str,
    hash_param: &str,
) -> String {
    let mut fields = format!(
        "<input type=\"hidden\" name=\"{url_param}\" value=\"{}\" />",
        escape(action_url)
    );
    if let Some(hash) = hash {
        fields.push_str(&format!(
            "<input type=\"hidden\" name=\"{hash_param}\" value=\"{hash}\" />"
        ));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_page_form_without_key() {
        let page = main_page(None, false, "mortyurl");
        assert!(page.contains("name=\"mortyurl\""));
        assert!(!page.contains("Warning!"));
    }

    #[test]
    fn test_main_page_warning_with_key() {
        let page = main_page(None, true, "mortyurl");
        assert!(page.contains("Warning! This instance does not support direct URL opening."));
        assert!(!page.contains("Visit url:"));
    }

    #[test]
    fn test_main_page_error_is_escaped() {
        let page = main_page(Some("bad <thing>"), false, "mortyurl");
        assert!(page.contains("Error: bad &lt;thing&gt;"));
        assert!(!page.contains("bad <thing>"));
    }

    #[test]
    fn test_exit_page_escapes_target() {
        let page = exit_page("unsafe://x/\"><script>");
        assert!(!page.contains("\"><script>"));
        assert!(page.contains("rel=\"noreferrer\""));
        assert!(page.contains("<b>NOT</b> sanitized"));
    }

    #[test]
    fn test_body_chrome_readonly_depends_on_key() {
        let with_key = body_chrome("http://x.com/", true, "mortyurl");
        assert!(with_key.contains("readonly=\"true\""));
        assert_eq!(with_key.matches("id=\"mortyheader\"").count(), 1);

        let without_key = body_chrome("http://x.com/", false, "mortyurl");
        assert!(!without_key.contains("readonly"));
    }

    #[test]
    fn test_form_extension_fields() {
        let plain = form_extension("http://x.com/a", None, "mortyurl", "mortyhash");
        assert_eq!(
            plain,
            "<input type=\"hidden\" name=\"mortyurl\" value=\"http://x.com/a\" />"
        );

        let signed = form_extension("http://x.com/a", Some("abcd"), "mortyurl", "mortyhash");
        assert!(signed.contains("name=\"mortyhash\" value=\"abcd\""));
    }

    #[test]
    fn test_favicon_decodes() {
        assert!(FAVICON_BYTES.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
