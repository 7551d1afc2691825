use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};

/// Inserted before every structural element so the flattened text can be
/// split back into sections.
pub const SECTION_BREAK: &str = "===SECTION BREAK===";

/// What a marker look-alike in page text is rewritten to.
const ESCAPED_SECTION_BREAK: &str = "SECTION BREAK";

const STRIPPED_TAGS: &[&str] = &["script", "style"];

const SECTION_TAGS: &[&str] = &[
    "h1", "h2", "h3", "section", "article", "nav", "footer", "header",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduced {
    pub body_html: String,
    pub cleaned_text: String,
}

pub fn reduce(raw_html: &str) -> Reduced {
    let body_html = extract_body(raw_html);
    let cleaned_text = clean_body(&body_html);
    Reduced {
        body_html,
        cleaned_text,
    }
}

/// Inner HTML of `<body>`, or an empty string when there is none.
pub fn extract_body(raw_html: &str) -> String {
    let document = Html::parse_document(raw_html);
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };

    document
        .select(&selector)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Flattens body markup to one trimmed line per text run, with
/// [`SECTION_BREAK`] lines ahead of headings and sectioning elements.
pub fn clean_body(body_html: &str) -> String {
    let fragment = Html::parse_fragment(body_html);

    let mut pieces = Vec::new();
    collect_text(fragment.tree.root(), &mut pieces);

    normalize_lines(&pieces.join("\n"))
}

fn collect_text(node: NodeRef<'_, Node>, pieces: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => pieces.push(escape_marker(text)),
            Node::Element(element) => {
                let name = element.name();
                if STRIPPED_TAGS.contains(&name) {
                    continue;
                }
                if SECTION_TAGS.contains(&name) {
                    pieces.push(SECTION_BREAK.to_owned());
                }
                collect_text(child, pieces);
            }
            _ => {}
        }
    }
}

/// Page text never carries [`SECTION_BREAK`] through, so only structural
/// elements can start a new section. Repeats until dropping the fences stops
/// producing new occurrences (`======SECTION BREAK======`).
fn escape_marker(text: &str) -> String {
    let mut text = text.to_owned();
    while text.contains(SECTION_BREAK) {
        text = text.replace(SECTION_BREAK, ESCAPED_SECTION_BREAK);
    }
    text
}

fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
