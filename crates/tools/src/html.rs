//! Reduce an HTML page to readable, markdown-flavoured text.
//!
//! The page is parsed into a DOM with `scraper`, so entities are decoded and
//! malformed markup is repaired before the walk. Headings become `#` lines,
//! list items `- ` lines, `<pre>` blocks fenced code, links `[label](href)`.
//! Script, style and head sections are dropped.

use scraper::{ElementRef, Html, Node};

const SKIPPED: [&str; 5] = ["script", "style", "head", "noscript", "template"];

const FENCE: &str = "```";

pub(crate) fn simplify(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut writer = Writer::default();
    writer.children(document.root_element());
    tidy(&writer.out)
}

#[derive(Default)]
struct Writer {
    out: String,
    /// Depth of enclosing `<pre>` elements; text inside keeps its whitespace.
    pre: usize,
}

impl Writer {
    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            _ if SKIPPED.contains(&name) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.children(el);
                self.block();
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "ul" | "ol"
            | "table" | "blockquote" => {
                self.block();
                self.children(el);
                self.block();
            }
            "li" => {
                self.out.push_str("\n- ");
                self.children(el);
            }
            "br" => self.out.push('\n'),
            "tr" => {
                self.out.push('\n');
                self.children(el);
            }
            "td" | "th" => {
                self.out.push_str(" | ");
                self.children(el);
            }
            "pre" => self.fenced(el),
            "code" if self.pre == 0 => {
                self.out.push('`');
                self.children(el);
                self.out.push('`');
            }
            "a" => self.link(el),
            "img" => {
                let alt = el.value().attr("alt").unwrap_or_default().trim();
                if let Some(src) = el.value().attr("src")
                    && !alt.is_empty()
                {
                    self.out.push_str(&format!("![{alt}]({src})"));
                }
            }
            _ => self.children(el),
        }
    }

    fn fenced(&mut self, el: ElementRef<'_>) {
        self.block();
        self.out.push_str(FENCE);
        self.out.push('\n');
        self.pre += 1;
        self.children(el);
        self.pre -= 1;
        if !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(FENCE);
        self.block();
    }

    fn link(&mut self, el: ElementRef<'_>) {
        let href = el
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.starts_with('#') && !h.starts_with("javascript:"));
        let Some(href) = href else {
            self.children(el);
            return;
        };

        let start = self.out.len();
        self.out.push('[');
        self.children(el);
        if self.out[start + 1..].trim().is_empty() {
            self.out.truncate(start);
            return;
        }
        self.out.push_str("](");
        self.out.push_str(href);
        self.out.push(')');
    }

    fn block(&mut self) {
        self.out.push_str("\n\n");
    }

    fn text(&mut self, text: &str) {
        if self.pre > 0 {
            self.out.push_str(text);
            return;
        }
        let mut last_space = self.out.ends_with(char::is_whitespace);
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !last_space {
                    self.out.push(' ');
                    last_space = true;
                }
            } else {
                self.out.push(ch);
                last_space = false;
            }
        }
    }
}

/// Trim each line and collapse runs of blank lines, leaving fenced code as is.
fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut fenced = false;
    for raw in text.lines() {
        let line = raw.trim();
        if line == FENCE {
            fenced = !fenced;
            lines.push(line);
            continue;
        }
        if fenced {
            lines.push(raw);
            continue;
        }
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_lists_and_paragraphs() {
        let html = "<html><head><title>x</title></head><body>\
                    <h1>Refunds</h1><p>Within   30 days.</p>\
                    <ul><li>Unused</li><li>With receipt</li></ul></body></html>";
        assert_eq!(
            simplify(html),
            "# Refunds\n\nWithin 30 days.\n\n- Unused\n- With receipt"
        );
    }

    #[test]
    fn drops_scripts_and_styles() {
        let html = "<p>a</p><script>var x = '<p>no</p>';</script><style>p{}</style><p>b</p>";
        assert_eq!(simplify(html), "a\n\nb");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(simplify("<p>Fish &amp; Chips &lt;3</p>"), "Fish & Chips <3");
    }

    #[test]
    fn preformatted_code_numeric_entities_and_links() {
        let html = "<pre>fn main() {\n    x();\n}</pre>\
                    <p>It&#8217;s &mdash; <a href=\"https://ex.com/doc\">docs</a></p>";
        assert_eq!(
            simplify(html),
            "```\nfn main() {\n    x();\n}\n```\n\nIt\u{2019}s \u{2014} [docs](https://ex.com/doc)"
        );
    }

    #[test]
    fn inline_code_and_local_links() {
        let html = "<p>Run <code>make   test</code>, see <a href=\"#usage\">usage</a>.</p>";
        assert_eq!(simplify(html), "Run `make test`, see usage.");
    }

    #[test]
    fn table_rows_become_lines() {
        let html = "<table><tr><th>Plan</th><th>Days</th></tr>\
                    <tr><td>Basic</td><td>30</td></tr></table>";
        assert_eq!(simplify(html), "| Plan | Days\n| Basic | 30");
    }

    #[test]
    fn unclosed_tags_are_repaired() {
        assert_eq!(simplify("<p>one<p>two <b>bold"), "one\n\ntwo bold");
    }
}
