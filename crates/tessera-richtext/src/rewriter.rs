//! Selector-driven HTML tag rewriter.
//!
//! An [`HtmlRewriter`] holds rules keyed by element name. Each rule has a
//! selector (`a`, `a[href]`, `a[linktype="page"]`) and an action:
//!
//! - [`RewriteAction::Attributes`] replaces the opening tag's attributes and
//!   leaves content and closing tag alone.
//! - [`RewriteAction::Element`] consumes the whole element, content included,
//!   and replaces it with whatever the rewriter returns.
//!
//! The input is scanned once, left to right, with a single regex matching any
//! registered element name. Element rewrites recurse to collect content up to
//! the matching closing tag, counting same-named descendants so they are not
//! mistaken for the terminator.
//!
//! Rule priority per element: `[attr=value]` > `[attr]` > bare name. Ties go to
//! the rule registered first.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

use crate::html::{Markup, escape, format_attrs, unescape};

/// Attributes of a tag, in source order, already unescaped.
pub type Attributes = IndexMap<String, String>;

static ELEMENT_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w-]+)$").expect("static pattern"));
static ELEMENT_WITH_ATTR_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w-]+)\[([\w-]+)\]$").expect("static pattern"));
static ELEMENT_WITH_ATTR_EXACT_SELECTORS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^([\w-]+)\[([\w-]+)='(.*)'\]$").expect("static pattern"),
        Regex::new(r#"^([\w-]+)\[([\w-]+)="(.*)"\]$"#).expect("static pattern"),
        Regex::new(r"^([\w-]+)\[([\w-]+)=([\w-]+)\]$").expect("static pattern"),
    ]
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)="([^"]*)"|([\w-]+)='([^']*)'|([\w-]+)=([\w-]+)"#)
        .expect("static pattern")
});

/// Rewrites an element's opening tag attributes.
pub trait AttributeRewriter: Send + Sync {
    fn rewrite_attributes(&self, name: &str, attrs: &Attributes) -> Attributes;
}

/// Rewrites a whole element given its (already rewritten) content.
pub trait ElementRewriter: Send + Sync {
    fn rewrite_element(&self, name: &str, attrs: &Attributes, content: Markup) -> Rewritten;
}

/// Output of an element rewrite. Plain text is escaped before being emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewritten {
    Safe(Markup),
    Text(String),
}

impl From<Markup> for Rewritten {
    fn from(m: Markup) -> Self {
        Rewritten::Safe(m)
    }
}

impl From<String> for Rewritten {
    fn from(s: String) -> Self {
        Rewritten::Text(s)
    }
}

impl Rewritten {
    fn into_markup(self) -> Markup {
        match self {
            Rewritten::Safe(m) => m,
            Rewritten::Text(s) => Markup::safe(escape(&s)),
        }
    }
}

/// What a matching rule does.
#[derive(Clone)]
pub enum RewriteAction {
    Attributes(Arc<dyn AttributeRewriter>),
    Element(Arc<dyn ElementRewriter>),
}

impl std::fmt::Debug for RewriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteAction::Attributes(_) => f.write_str("RewriteAction::Attributes(..)"),
            RewriteAction::Element(_) => f.write_str("RewriteAction::Element(..)"),
        }
    }
}

/// Attribute condition of a selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// `name`
    Element,
    /// `name[attr]`
    WithAttribute(String),
    /// `name[attr=value]`
    WithAttributeValue(String, String),
}

impl Selector {
    fn priority(&self) -> u8 {
        match self {
            Selector::WithAttributeValue(..) => 0,
            Selector::WithAttribute(_) => 1,
            Selector::Element => 2,
        }
    }

    fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Selector::Element => true,
            Selector::WithAttribute(attr) => attrs.contains_key(attr),
            Selector::WithAttributeValue(attr, value) => attrs.get(attr) == Some(value),
        }
    }
}

/// Parse a selector string into `(element name, selector)`.
pub fn parse_selector(selector: &str) -> Option<(String, Selector)> {
    if let Some(caps) = ELEMENT_SELECTOR.captures(selector) {
        return Some((caps[1].to_string(), Selector::Element));
    }
    if let Some(caps) = ELEMENT_WITH_ATTR_SELECTOR.captures(selector) {
        return Some((caps[1].to_string(), Selector::WithAttribute(caps[2].to_string())));
    }
    for re in ELEMENT_WITH_ATTR_EXACT_SELECTORS.iter() {
        if let Some(caps) = re.captures(selector) {
            return Some((
                caps[1].to_string(),
                Selector::WithAttributeValue(caps[2].to_string(), caps[3].to_string()),
            ));
        }
    }
    None
}

#[derive(Clone, Debug)]
struct Rule {
    selector: Selector,
    action: RewriteAction,
}

/// A compiled set of rewrite rules.
#[derive(Clone, Default)]
pub struct HtmlRewriter {
    rules_by_element: IndexMap<String, Vec<Rule>>,
    /// `<(names)(attrs)>|</(names)>`, rebuilt whenever the rule set changes.
    tag_re: Option<Regex>,
}

impl HtmlRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(selector, action)` pairs.
    pub fn with_rules<S: AsRef<str>>(rules: impl IntoIterator<Item = (S, RewriteAction)>) -> Self {
        let mut rewriter = Self::new();
        rewriter.add_rules(rules);
        rewriter
    }

    pub fn add_rules<S: AsRef<str>>(&mut self, rules: impl IntoIterator<Item = (S, RewriteAction)>) {
        for (selector, action) in rules {
            self.add_rule(selector.as_ref(), action);
        }
    }

    /// Register one rule. Unsupported selectors are logged and ignored.
    pub fn add_rule(&mut self, selector: &str, action: RewriteAction) -> bool {
        let Some((name, selector)) = parse_selector(selector) else {
            warn!("Unsupported selector format: {:?}", selector);
            return false;
        };
        let rules = self.rules_by_element.entry(name).or_default();
        rules.push(Rule { selector, action });
        // stable: equal priorities keep registration order
        rules.sort_by_key(|r| r.selector.priority());
        self.compile();
        true
    }

    pub fn is_empty(&self) -> bool {
        self.rules_by_element.is_empty()
    }

    fn compile(&mut self) {
        let names = self
            .rules_by_element
            .keys()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"<({names})(\b[^>]*)>|</({names})>");
        self.tag_re = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("failed to compile rewriter pattern: {}", e);
                None
            }
        };
    }

    /// Rewrite a string of HTML according to the configured rules.
    pub fn rewrite(&self, html: &str) -> Markup {
        self.rewrite_from(html, 0, None).0
    }

    /// Rewrite from `start` until end of input or an unbalanced `</until_tag>`.
    ///
    /// Returns the rewritten HTML and the offset just past whatever was
    /// consumed (the closing tag, if one terminated the scan).
    fn rewrite_from(&self, html: &str, start: usize, until_tag: Option<&str>) -> (Markup, usize) {
        let Some(tag_re) = self.tag_re.as_ref() else {
            return (Markup::safe(&html[start..]), html.len());
        };

        let mut position = start;
        let mut result = String::new();
        // pending same-named opening tags to skip before the real terminator
        let mut ignored_closing_tag_count = 0usize;

        loop {
            let Some((caps, whole)) = tag_re
                .captures_at(html, position)
                .and_then(|caps| {
                    let whole = caps.get(0)?;
                    Some((caps, whole))
                })
            else {
                if let Some(tag) = until_tag {
                    warn!("Reached end of string without encountering closing {:?} tag", tag);
                }
                result.push_str(&html[position..]);
                return (Markup::safe(result), html.len());
            };
            result.push_str(&html[position..whole.start()]);
            position = whole.end();
            let tag = whole.as_str();

            if let Some(closing) = caps.get(3) {
                let closing_name = closing.as_str();
                if until_tag != Some(closing_name) {
                    result.push_str(tag);
                    continue;
                }
                if ignored_closing_tag_count > 0 {
                    ignored_closing_tag_count -= 1;
                    result.push_str(tag);
                    continue;
                }
                return (Markup::safe(result), position);
            }

            let tag_name = &caps[1];
            let mut attr_string = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let is_self_closing = attr_string.ends_with('/');
            if is_self_closing {
                attr_string = &attr_string[..attr_string.len() - 1];
            }
            let attrs = unpack_attr_string(attr_string);

            let rule = self
                .rules_by_element
                .get(tag_name)
                .and_then(|rules| rules.iter().find(|r| r.selector.matches(&attrs)));

            let bumps_nesting = until_tag == Some(tag_name) && !is_self_closing;

            match rule.map(|r| &r.action) {
                None => {
                    result.push_str(tag);
                    if bumps_nesting {
                        ignored_closing_tag_count += 1;
                    }
                }
                Some(RewriteAction::Attributes(rewriter)) => {
                    let new_attrs = rewriter.rewrite_attributes(tag_name, &attrs);
                    result.push_str(&build_tag(tag_name, &new_attrs, is_self_closing));
                    if bumps_nesting {
                        ignored_closing_tag_count += 1;
                    }
                }
                Some(RewriteAction::Element(rewriter)) => {
                    let rewritten = if is_self_closing {
                        rewriter.rewrite_element(tag_name, &attrs, Markup::new())
                    } else {
                        let (content, next) = self.rewrite_from(html, position, Some(tag_name));
                        position = next;
                        rewriter.rewrite_element(tag_name, &attrs, content)
                    };
                    result.push_str(rewritten.into_markup().as_str());
                }
            }
        }
    }
}

fn build_tag(name: &str, attrs: &Attributes, self_closing: bool) -> String {
    let close = if self_closing { "/>" } else { ">" };
    if attrs.is_empty() {
        format!("<{name}{close}")
    } else {
        format!("<{} {}{}", name, format_attrs(attrs), close)
    }
}

/// Unpack a string of HTML attributes into unescaped name/value pairs.
///
/// Accepts double-quoted, single-quoted and bare (`[\w-]+`) values.
pub fn unpack_attr_string(attr_string: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for caps in ATTRIBUTE.captures_iter(attr_string) {
        let (name, value) = if let (Some(n), Some(v)) = (caps.get(1), caps.get(2)) {
            (n, v)
        } else if let (Some(n), Some(v)) = (caps.get(3), caps.get(4)) {
            (n, v)
        } else if let (Some(n), Some(v)) = (caps.get(5), caps.get(6)) {
            (n, v)
        } else {
            continue;
        };
        attributes.insert(name.as_str().to_string(), unescape(value.as_str()));
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl ElementRewriter for Upper {
        fn rewrite_element(&self, name: &str, _attrs: &Attributes, content: Markup) -> Rewritten {
            Rewritten::Safe(Markup::safe(format!("<{name}>{}</{name}>", content.as_str().to_uppercase())))
        }
    }

    struct Tagged(&'static str);

    impl ElementRewriter for Tagged {
        fn rewrite_element(&self, _name: &str, _attrs: &Attributes, content: Markup) -> Rewritten {
            Rewritten::Safe(Markup::safe(format!("[{}:{}]", self.0, content)))
        }
    }

    struct PlainText;

    impl ElementRewriter for PlainText {
        fn rewrite_element(&self, _name: &str, _attrs: &Attributes, _content: Markup) -> Rewritten {
            Rewritten::Text("<unsafe>".to_string())
        }
    }

    struct Href(&'static str);

    impl AttributeRewriter for Href {
        fn rewrite_attributes(&self, _name: &str, _attrs: &Attributes) -> Attributes {
            let mut out = Attributes::new();
            out.insert("href".into(), self.0.into());
            out
        }
    }

    fn element(r: impl ElementRewriter + 'static) -> RewriteAction {
        RewriteAction::Element(Arc::new(r))
    }

    #[test]
    fn test_parse_selector_forms() {
        assert_eq!(parse_selector("a"), Some(("a".into(), Selector::Element)));
        assert_eq!(
            parse_selector("a[href]"),
            Some(("a".into(), Selector::WithAttribute("href".into())))
        );
        let exact = Some(("a".into(), Selector::WithAttributeValue("linktype".into(), "page".into())));
        assert_eq!(parse_selector("a[linktype='page']"), exact);
        assert_eq!(parse_selector("a[linktype=\"page\"]"), exact);
        assert_eq!(parse_selector("a[linktype=page]"), exact);
        assert_eq!(parse_selector("a > b"), None);
    }

    #[test]
    fn test_unsupported_selector_is_ignored() {
        let mut rw = HtmlRewriter::new();
        assert!(!rw.add_rule("div.class", element(Upper)));
        assert!(rw.is_empty());
        assert_eq!(rw.rewrite("<div.class>x</div.class>").as_str(), "<div.class>x</div.class>");
    }

    #[test]
    fn test_no_rules_passthrough() {
        let rw = HtmlRewriter::new();
        assert_eq!(rw.rewrite("<p>hello</p>").as_str(), "<p>hello</p>");
    }

    #[test]
    fn test_element_rewrite() {
        let rw = HtmlRewriter::with_rules([("b", element(Upper))]);
        assert_eq!(rw.rewrite("x <b>bold</b> y").as_str(), "x <b>BOLD</b> y");
    }

    #[test]
    fn test_unmatched_tags_pass_through() {
        let rw = HtmlRewriter::with_rules([("b", element(Upper))]);
        assert_eq!(rw.rewrite("<i>a</i><br/>").as_str(), "<i>a</i><br/>");
        // closing tags without an open counterpart are kept verbatim
        assert_eq!(rw.rewrite("a</b>c").as_str(), "a</b>c");
    }

    #[test]
    fn test_nested_same_name_elements() {
        let rw = HtmlRewriter::with_rules([("span[class='x']", element(Tagged("x")))]);
        let out = rw.rewrite("<span class=\"x\">a <span>inner</span> b</span> after");
        assert_eq!(out.as_str(), "[x:a <span>inner</span> b] after");
    }

    #[test]
    fn test_nested_rewritten_elements() {
        let rw = HtmlRewriter::with_rules([("b", element(Tagged("b"))), ("i", element(Tagged("i")))]);
        assert_eq!(rw.rewrite("<b>1<i>2</i>3</b>").as_str(), "[b:1[i:2]3]");
    }

    #[test]
    fn test_attribute_rewrite_keeps_content() {
        let rw = HtmlRewriter::with_rules([(
            "a[linktype='page']",
            RewriteAction::Attributes(Arc::new(Href("/xmas/"))),
        )]);
        let out = rw.rewrite("<a linktype=\"page\" id=\"4\">Christmas</a>");
        assert_eq!(out.as_str(), "<a href=\"/xmas/\">Christmas</a>");
    }

    #[test]
    fn test_attribute_rewrite_inside_element_rewrite() {
        let rw = HtmlRewriter::with_rules([
            ("a[linktype]", RewriteAction::Attributes(Arc::new(Href("/t/")))),
            ("a", element(Tagged("a"))),
        ]);
        let out = rw.rewrite("<a>x <a linktype=\"page\">y</a> z</a>");
        assert_eq!(out.as_str(), "[a:x <a href=\"/t/\">y</a> z]");
    }

    #[test]
    fn test_rule_priority() {
        let rw = HtmlRewriter::with_rules([
            ("a", element(Tagged("bare"))),
            ("a[linktype]", element(Tagged("present"))),
            ("a[linktype='page']", element(Tagged("exact"))),
        ]);
        assert_eq!(rw.rewrite("<a linktype='page'>p</a>").as_str(), "[exact:p]");
        assert_eq!(rw.rewrite("<a linktype=doc>d</a>").as_str(), "[present:d]");
        assert_eq!(rw.rewrite("<a href=\"/\">h</a>").as_str(), "[bare:h]");
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let rw = HtmlRewriter::with_rules([
            ("a[href]", element(Tagged("first"))),
            ("a[title]", element(Tagged("second"))),
        ]);
        assert_eq!(rw.rewrite("<a title=\"t\" href=\"/\">x</a>").as_str(), "[first:x]");
    }

    #[test]
    fn test_self_closing_element() {
        let rw = HtmlRewriter::with_rules([("embed", element(Tagged("e")))]);
        assert_eq!(rw.rewrite("<p><embed embedtype=\"image\" id=\"1\"/></p>").as_str(), "<p>[e:]</p>");
    }

    #[test]
    fn test_text_output_is_escaped() {
        let rw = HtmlRewriter::with_rules([("b", element(PlainText))]);
        assert_eq!(rw.rewrite("<b>x</b>").as_str(), "&lt;unsafe&gt;");
    }

    #[test]
    fn test_missing_closing_tag_is_recoverable() {
        let rw = HtmlRewriter::with_rules([("b", element(Tagged("b")))]);
        assert_eq!(rw.rewrite("<b>never closed").as_str(), "[b:never closed]");
    }

    #[test]
    fn test_unpack_attr_string() {
        let attrs = unpack_attr_string(r#" id="4" linktype='page' data-x=bare title="Tom &amp; Jerry""#);
        assert_eq!(attrs.get("id").map(String::as_str), Some("4"));
        assert_eq!(attrs.get("linktype").map(String::as_str), Some("page"));
        assert_eq!(attrs.get("data-x").map(String::as_str), Some("bare"));
        assert_eq!(attrs.get("title").map(String::as_str), Some("Tom & Jerry"));
    }
}
