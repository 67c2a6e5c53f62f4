//! Streaming HTML sanitization.
//!
//! A single pass over the `html5ever` tokenizer that allow-lists elements
//! and attributes, skips unsafe subtrees, rewrites every outbound reference
//! through the proxifier, and injects the proxy chrome. The tokenizer
//! entity-decodes text and attribute values, so text is re-escaped on the
//! way out and the output never depends on byte fidelity of the input.

use std::cell::RefCell;
use std::fmt::Write as _;

use html5ever::Attribute;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Doctype, EndTag, StartTag, Tag, Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts, TokenizerResult,
};
use tracing::debug;

use crate::sanitize::css::rewrite_css;
use crate::sanitize::proxify::{RequestContext, proxify_uri};
use crate::security::sign;
use crate::web::ui::pages;

/// Elements whose presence in the output could execute code or load plugin
/// content. Their entire subtree is skipped.
const UNSAFE_ELEMENTS: &[&str] = &["applet", "canvas", "embed", "math", "script", "svg"];

const SAFE_ATTRIBUTES: &[&str] = &[
    "abbr",
    "accesskey",
    "align",
    "alt",
    "as",
    "autocomplete",
    "charset",
    "checked",
    "class",
    "content",
    "contenteditable",
    "contextmenu",
    "dir",
    "for",
    "height",
    "hidden",
    "hreflang",
    "id",
    "lang",
    "media",
    "method",
    "name",
    "nowrap",
    "placeholder",
    "property",
    "rel",
    "spellcheck",
    "tabindex",
    "target",
    "title",
    "translate",
    "type",
    "value",
    "width",
];

const LINK_REL_SAFE_VALUES: &[&str] = &[
    "alternate",
    "archives",
    "author",
    "copyright",
    "first",
    "help",
    "icon",
    "index",
    "last",
    "license",
    "manifest",
    "next",
    "pingback",
    "prev",
    "publisher",
    "search",
    "shortcut icon",
    "stylesheet",
    "up",
];

// X-UA-Compatible is part of the injected head chrome, so it is not needed
// here.
const META_HTTP_EQUIV_SAFE_VALUES: &[&str] = &["date", "last-modified", "refresh", "content-language"];

/// Cap on `<noscript>` re-sanitization nesting.
const MAX_NOSCRIPT_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    InStyle,
    InNoscript,
}

/// Minimal HTML escaping for text nodes and attribute values.
pub(crate) fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Sanitizes an HTML document, returning the rewritten markup.
///
/// `ctx.base_url` may be rewritten by a `<base href>` tag along the way, and
/// `ctx.body_injected` records whether the body chrome was emitted; the
/// caller must emit it afterwards when it was not.
pub fn sanitize_html(ctx: &mut RequestContext<'_>, html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 256);
    sanitize_into(ctx, &mut out, html, 0);
    out
}

fn sanitize_into(ctx: &mut RequestContext<'_>, out: &mut String, html: &str, depth: usize) {
    if depth > MAX_NOSCRIPT_DEPTH {
        debug!("noscript nesting exceeds depth cap, dropping content");
        return;
    }

    let sink = SanitizeSink {
        ctx: RefCell::new(ctx),
        out: RefCell::new(String::new()),
        state: RefCell::new(State::Default),
        unsafe_stack: RefCell::new(Vec::new()),
        depth,
    };
    let tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let input = BufferQueue::default();
    input.push_back(html.into());

    loop {
        match tokenizer.feed(&input) {
            TokenizerResult::Done => break,
            TokenizerResult::Script(_) => {}
        }
    }
    tokenizer.end();

    out.push_str(&tokenizer.sink.out.into_inner());
}

/// Tokenizer state to enter after a start tag, mirroring the standard
/// raw-text element set. Without this the contents of `<script>` or
/// `<style>` would be tokenized as markup.
fn raw_text_result(name: &str) -> TokenSinkResult<()> {
    match name {
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "style" | "noscript" | "iframe" | "noembed" | "noframes" | "xmp" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        _ => TokenSinkResult::Continue,
    }
}

fn attr_value<'t>(attrs: &'t [Attribute], name: &str) -> Option<&'t str> {
    attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

/// Emits a single sanitized attribute: allow-listed names are escaped and
/// kept, `src`/`href`/`action` are proxified, `style` runs through the CSS
/// rewriter, everything else is dropped.
fn write_attr(ctx: &RequestContext<'_>, out: &mut String, name: &str, value: &str) {
    if SAFE_ATTRIBUTES.contains(&name) {
        let _ = write!(out, " {}=\"{}\"", name, escape(value));
        return;
    }
    match name {
        "src" | "href" | "action" => match proxify_uri(ctx, value.as_bytes()) {
            Ok(uri) => {
                let _ = write!(out, " {name}=\"{uri}\"");
            }
            Err(e) => {
                debug!(url = %value, error = %e, "cannot proxify uri");
            }
        },
        "style" => {
            let mut buf = Vec::new();
            rewrite_css(ctx, &mut buf, value.as_bytes());
            let _ = write!(out, " style=\"{}\"", escape(&String::from_utf8_lossy(&buf)));
        }
        _ => {}
    }
}

fn write_attrs(ctx: &RequestContext<'_>, out: &mut String, attrs: &[Attribute]) {
    for attr in attrs {
        write_attr(ctx, out, &attr.name.local, &attr.value);
    }
}

/// Emits a `<link>` unless its `rel` is outside the safe set or it preloads
/// a script.
fn write_link_tag(ctx: &RequestContext<'_>, out: &mut String, attrs: &[Attribute]) {
    for attr in attrs {
        match &*attr.name.local {
            "rel" if !LINK_REL_SAFE_VALUES.contains(&&*attr.value) => return,
            "as" if &*attr.value == "script" => return,
            _ => {}
        }
    }
    out.push_str("<link");
    write_attrs(ctx, out, attrs);
    out.push('>');
}

/// Emits a `<meta>` unless it declares a charset or an http-equiv outside
/// the safe set. `http-equiv="refresh"` gets its `url=` target proxified.
fn write_meta_tag(ctx: &RequestContext<'_>, out: &mut String, attrs: &[Attribute]) {
    let mut http_equiv: Option<String> = None;
    let mut content = "";

    for attr in attrs {
        match &*attr.name.local {
            "http-equiv" => {
                let lowered = attr.value.to_ascii_lowercase();
                if !META_HTTP_EQUIV_SAFE_VALUES.contains(&lowered.as_str()) {
                    return;
                }
                http_equiv = Some(lowered);
            }
            "content" => content = &attr.value,
            "charset" => return,
            _ => {}
        }
    }

    out.push_str("<meta");
    let lowered_content = content.to_ascii_lowercase();
    if http_equiv.as_deref() == Some("refresh") && lowered_content.contains("url=") {
        let url_index = lowered_content.find("url=").unwrap_or(0);
        let mut target = &content[url_index + 4..];
        let bytes = target.as_bytes();
        if bytes.len() >= 2
            && (bytes[0] == b'\'' || bytes[0] == b'"')
            && bytes[bytes.len() - 1] == bytes[0]
        {
            target = &target[1..target.len() - 1];
        }
        if let Ok(uri) = proxify_uri(ctx, target.as_bytes()) {
            let _ = write!(
                out,
                " http-equiv=\"refresh\" content=\"{}url={}\"",
                escape(&content[..url_index]),
                uri
            );
        }
    } else {
        if let Some(he) = &http_equiv {
            let _ = write!(out, " http-equiv=\"{he}\"");
        }
        write_attrs(ctx, out, attrs);
    }
    out.push('>');
}

struct SanitizeSink<'r, 'c> {
    ctx: RefCell<&'r mut RequestContext<'c>>,
    out: RefCell<String>,
    state: RefCell<State>,
    unsafe_stack: RefCell<Vec<String>>,
    depth: usize,
}

impl SanitizeSink<'_, '_> {
    fn process_start_tag(&self, tag: &Tag) -> TokenSinkResult<()> {
        let name: &str = &tag.name;

        if UNSAFE_ELEMENTS.contains(&name) {
            if tag.self_closing {
                return TokenSinkResult::Continue;
            }
            self.unsafe_stack.borrow_mut().push(name.to_string());
            return raw_text_result(name);
        }

        if name == "base" {
            if let Some(href) = attr_value(&tag.attrs, "href") {
                let mut ctx = self.ctx.borrow_mut();
                if let Ok(resolved) = ctx.base_url.join(href) {
                    ctx.base_url = resolved;
                }
            }
            return TokenSinkResult::Continue;
        }

        if name == "noscript" {
            *self.state.borrow_mut() = State::InNoscript;
            return TokenSinkResult::RawData(RawKind::Rawtext);
        }

        if name == "link" {
            let ctx = self.ctx.borrow();
            write_link_tag(&**ctx, &mut self.out.borrow_mut(), &tag.attrs);
            return TokenSinkResult::Continue;
        }

        if name == "meta" {
            let ctx = self.ctx.borrow();
            write_meta_tag(&**ctx, &mut self.out.borrow_mut(), &tag.attrs);
            return TokenSinkResult::Continue;
        }

        {
            let ctx = self.ctx.borrow();
            let mut out = self.out.borrow_mut();
            out.push('<');
            out.push_str(name);
            write_attrs(&**ctx, &mut out, &tag.attrs);
            if tag.self_closing {
                out.push_str(" />");
            } else {
                out.push('>');
            }
            if name == "head" {
                out.push_str(pages::HEAD_CHROME);
            }
        }

        if tag.self_closing {
            return TokenSinkResult::Continue;
        }

        if name == "style" {
            *self.state.borrow_mut() = State::InStyle;
        }

        if name == "form" {
            self.write_form_extension(&tag.attrs);
        }

        raw_text_result(name)
    }

    /// Hidden-field pair carrying the form's resolved action URL (and its
    /// signature when a key is configured), so submissions re-enter the
    /// proxy with a valid signature.
    fn write_form_extension(&self, attrs: &[Attribute]) {
        let ctx = self.ctx.borrow();
        let form_url = attr_value(attrs, "action")
            .and_then(|action| ctx.base_url.join(action).ok())
            .unwrap_or_else(|| ctx.base_url.clone());
        let url = form_url.to_string();
        let hash = ctx.key.map(|key| sign::hash(url.as_bytes(), key));
        let fragment = pages::form_extension(&url, hash.as_deref(), ctx.url_param, ctx.hash_param);
        self.out.borrow_mut().push_str(&fragment);
    }

    fn process_end_tag(&self, tag: &Tag) {
        match &*tag.name {
            "body" => {
                {
                    let mut ctx = self.ctx.borrow_mut();
                    if !ctx.body_injected {
                        let chrome = pages::body_chrome(
                            ctx.base_url.as_str(),
                            ctx.key.is_some(),
                            ctx.url_param,
                        );
                        self.out.borrow_mut().push_str(&chrome);
                        ctx.body_injected = true;
                    }
                }
                self.out.borrow_mut().push_str("</body>");
            }
            "style" => {
                *self.state.borrow_mut() = State::Default;
                self.out.borrow_mut().push_str("</style>");
            }
            "noscript" => {
                *self.state.borrow_mut() = State::Default;
            }
            name => {
                let _ = write!(self.out.borrow_mut(), "</{name}>");
            }
        }
    }

    fn process_text(&self, text: &str) {
        let state = *self.state.borrow();
        match state {
            State::Default => self.out.borrow_mut().push_str(&escape(text)),
            State::InStyle => {
                let mut buf = Vec::new();
                {
                    let ctx = self.ctx.borrow();
                    rewrite_css(&**ctx, &mut buf, text.as_bytes());
                }
                self.out
                    .borrow_mut()
                    .push_str(&String::from_utf8_lossy(&buf));
            }
            State::InNoscript => {
                // User agents with scripting disabled render this, so it is
                // sanitized as HTML in its own right.
                let mut inner = String::new();
                {
                    let mut ctx = self.ctx.borrow_mut();
                    sanitize_into(&mut **ctx, &mut inner, text, self.depth + 1);
                }
                self.out.borrow_mut().push_str(&inner);
            }
        }
    }

    fn write_doctype(&self, doctype: &Doctype) {
        let mut out = self.out.borrow_mut();
        out.push_str("<!DOCTYPE ");
        if let Some(name) = &doctype.name {
            out.push_str(name);
        }
        if let Some(public_id) = &doctype.public_id {
            let _ = write!(out, " PUBLIC \"{public_id}\"");
            if let Some(system_id) = &doctype.system_id {
                let _ = write!(out, " \"{system_id}\"");
            }
        } else if let Some(system_id) = &doctype.system_id {
            let _ = write!(out, " SYSTEM \"{system_id}\"");
        }
        out.push('>');
    }

    /// Inside an unsafe subtree every token is dropped; nested unsafe start
    /// tags deepen the stack, the matching end tag pops it.
    fn process_unsafe_token(&self, token: Token) -> TokenSinkResult<()> {
        if let Token::TagToken(tag) = token {
            match tag.kind {
                StartTag => {
                    let name: &str = &tag.name;
                    if UNSAFE_ELEMENTS.contains(&name) && !tag.self_closing {
                        self.unsafe_stack.borrow_mut().push(name.to_string());
                    }
                    if !tag.self_closing {
                        return raw_text_result(name);
                    }
                }
                EndTag => {
                    let mut stack = self.unsafe_stack.borrow_mut();
                    if stack.last().is_some_and(|top| *top == *tag.name) {
                        stack.pop();
                    }
                }
            }
        }
        TokenSinkResult::Continue
    }
}

impl TokenSink for SanitizeSink<'_, '_> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if !self.unsafe_stack.borrow().is_empty() {
            return self.process_unsafe_token(token);
        }

        match token {
            Token::TagToken(tag) => match tag.kind {
                StartTag => self.process_start_tag(&tag),
                EndTag => {
                    self.process_end_tag(&tag);
                    TokenSinkResult::Continue
                }
            },
            Token::CharacterTokens(text) => {
                self.process_text(&text);
                TokenSinkResult::Continue
            }
            Token::CommentToken(_) => TokenSinkResult::Continue,
            Token::DoctypeToken(doctype) => {
                self.write_doctype(&doctype);
                TokenSinkResult::Continue
            }
            Token::NullCharacterToken | Token::EOFToken => TokenSinkResult::Continue,
            Token::ParseError(err) => {
                debug!(error = %err, "html tokenizer error");
                TokenSinkResult::Continue
            }
        }
    }
}
