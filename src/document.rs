//! Minimal element tree used as the explicit render target for every section.
//!
//! Text nodes are escaped when serialized, so content coming from a report
//! descriptor can never inject markup. `Raw` is reserved for markup the
//! renderer produces itself (inline scripts, SVG charts).

const VOID_TAGS: [&str; 5] = ["meta", "link", "br", "img", "input"];

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub tag: &'static str,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl From<Element> for Node {
    fn from(e: Element) -> Self { Node::Element(e) }
}

impl Element {
    pub fn new(tag: &'static str) -> Self { Element { tag, attrs: Vec::new(), children: Vec::new() } }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn id(self, id: &str) -> Self { self.attr("id", id) }

    pub fn class(self, class: &str) -> Self { self.attr("class", class) }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) { self.children.push(node.into()); }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class").is_some_and(|c| c.split_whitespace().any(|x| x == class))
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) { return; }
        let joined = match self.get_attr("class") { Some(c) if !c.is_empty() => format!("{} {}", c, class), _ => class.to_string() };
        self.set_attr("class", joined);
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut s = String::new();
        for c in &self.children {
            match c {
                Node::Text(t) => s.push_str(t),
                Node::Element(e) => s.push_str(&e.text_content()),
                Node::Raw(_) => {}
            }
        }
        s
    }

    /// Descendant elements with the given tag, in document order.
    pub fn find_all(&self, tag: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        for c in &self.children {
            if let Node::Element(e) = c {
                if e.tag == tag { out.push(e); }
                out.extend(e.find_all(tag));
            }
        }
        out
    }

    pub fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.tag);
        for (k, v) in &self.attrs {
            out.push_str(&format!(" {}=\"{}\"", k, escape_attr(v)));
        }
        out.push('>');
        if VOID_TAGS.contains(&self.tag) { return; }
        for c in &self.children {
            match c {
                Node::Element(e) => e.write_html(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
                Node::Raw(r) => out.push_str(r),
            }
        }
        out.push_str(&format!("</{}>", self.tag));
    }

    pub fn to_html(&self) -> String {
        let mut s = String::new();
        self.write_html(&mut s);
        s
    }
}

/// A page container a section renderer draws into.
///
/// `chrome` holds the static content the page shell puts in the container
/// (a section title, for instance); `children` holds generated nodes. When
/// `body_class` is set the generated nodes are wrapped in an inner element
/// carrying the region id, so hiding the region hides the chrome too.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: &'static str,
    pub class: &'static str,
    pub chrome: Vec<Node>,
    pub body_class: Option<&'static str>,
    pub children: Vec<Node>,
    pub hidden: bool,
}

impl Region {
    pub fn new(id: &'static str, class: &'static str) -> Self {
        Region { id, class, chrome: Vec::new(), body_class: None, children: Vec::new(), hidden: false }
    }

    pub fn with_chrome(mut self, node: impl Into<Node>) -> Self {
        self.chrome.push(node.into());
        self
    }

    pub fn with_body(mut self, class: &'static str) -> Self {
        self.body_class = Some(class);
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) { self.children.push(node.into()); }

    pub fn hide(&mut self) { self.hidden = true; }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c { Node::Element(e) => Some(e), _ => None })
    }

    pub fn to_element(&self) -> Element {
        let mut root = Element::new("section").class(self.class);
        if self.hidden { root.add_class("hidden"); }
        root.children.extend(self.chrome.iter().cloned());
        match self.body_class {
            Some(body) => {
                root.set_attr("id", format!("{}-section", self.id));
                let mut inner = Element::new("div").id(self.id).class(body);
                inner.children.extend(self.children.iter().cloned());
                root.push(inner);
            }
            None => {
                root.set_attr("id", self.id);
                root.children.extend(self.children.iter().cloned());
            }
        }
        root
    }
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\'', "&#39;")
}

/// JSON safe to place inside a `<script>` element.
pub fn script_json(json: &str) -> String {
    json.replace('<', "\\u003c")
}
