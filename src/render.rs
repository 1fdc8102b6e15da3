//! Markdown to sanitized HTML, and Markdown to styled terminal text.

use std::collections::HashSet;
use colored::Colorize;
use pulldown_cmark::{html, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use crate::message::{Message, Role};

const IFRAME_ATTRIBUTES: &[&str] = &["src", "allow", "allowfullscreen", "width", "height", "frameborder", "title"];
const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

pub struct MarkdownRenderer {
    options: Options,
    sanitizer: ammonia::Builder<'static>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut sanitizer = ammonia::Builder::default();
        sanitizer
            .add_tags(&["iframe"])
            .add_tag_attributes("iframe", IFRAME_ATTRIBUTES)
            .url_schemes(URL_SCHEMES.iter().copied().collect::<HashSet<_>>())
            .link_rel(Some("noopener noreferrer"));

        Self { options, sanitizer }
    }

    /// HTML fragment safe for direct injection into a page.
    pub fn render_html(&self, content: &str) -> String {
        let parser = Parser::new_ext(content, self.options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        });
        let mut raw = String::new();
        html::push_html(&mut raw, parser);
        self.sanitize(&raw)
    }

    pub fn sanitize(&self, html: &str) -> String {
        self.sanitizer.clean(html).to_string()
    }

    /// Escaped text with `<br>` line breaks, used when Markdown is turned off.
    pub fn render_plain(&self, content: &str) -> String {
        escape_html(content).replace('\n', "<br>")
    }

    pub fn render_message_html(&self, message: &Message, markdown: bool) -> String {
        if markdown {
            self.render_html(&message.content)
        } else {
            self.render_plain(&message.content)
        }
    }

    /// Standalone page for the conversation, one sanitized fragment per message.
    pub fn render_transcript(&self, messages: &[Message], markdown: bool) -> String {
        let mut page = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Conversation</title>\n</head>\n<body>\n<div class=\"chat-box\">\n",
        );
        for message in messages {
            let class = match message.role {
                Role::User => "user",
                Role::Bot => "bot",
            };
            page.push_str(&format!(
                "<div class=\"message {}\">{}</div>\n",
                class,
                self.render_message_html(message, markdown)
            ));
        }
        page.push_str("</div>\n</body>\n</html>\n");
        page
    }

    /// Styled text for the terminal. Raw HTML is dropped and control characters
    /// are stripped so replies cannot smuggle escape sequences.
    pub fn render_terminal(&self, content: &str) -> String {
        let mut out = String::new();
        let mut styles = Vec::<Style>::new();
        let mut lists = Vec::<Option<u64>>::new();
        let mut link = None::<String>;
        let mut in_raw_script = false;

        for event in Parser::new_ext(content, self.options) {
            match event {
                Event::Start(tag) => match tag {
                    Tag::Heading { level, .. } => {
                        push_blank_line(&mut out);
                        out.push_str(&format!("{} ", "#".repeat(heading_depth(level))).bold().to_string());
                        styles.push(Style::Heading);
                    }
                    Tag::Paragraph => push_blank_line(&mut out),
                    Tag::CodeBlock(kind) => {
                        push_blank_line(&mut out);
                        if let CodeBlockKind::Fenced(lang) = kind {
                            if !lang.is_empty() {
                                out.push_str(&format!("[{}]\n", strip_controls(&lang)).dimmed().to_string());
                            }
                        }
                        styles.push(Style::Code);
                    }
                    Tag::List(start) => {
                        if lists.is_empty() {
                            push_blank_line(&mut out);
                        }
                        lists.push(start);
                    }
                    Tag::Item => {
                        if !out.is_empty() && !out.ends_with('\n') {
                            out.push('\n');
                        }
                        out.push_str(&"  ".repeat(lists.len().saturating_sub(1)));
                        match lists.last_mut() {
                            Some(Some(n)) => {
                                out.push_str(&format!("{}. ", n));
                                *n += 1;
                            }
                            _ => out.push_str("• "),
                        }
                    }
                    Tag::Emphasis => styles.push(Style::Emphasis),
                    Tag::Strong => styles.push(Style::Strong),
                    Tag::Strikethrough => styles.push(Style::Strikethrough),
                    Tag::Link { dest_url, .. } => {
                        link = Some(strip_controls(&dest_url));
                        styles.push(Style::Link);
                    }
                    Tag::TableRow | Tag::TableHead => {
                        if !out.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    Tag::TableCell => out.push_str("| "),
                    _ => {}
                },
                Event::End(tag) => match tag {
                    TagEnd::Heading(_) | TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                        styles.pop();
                    }
                    TagEnd::CodeBlock => {
                        styles.pop();
                    }
                    TagEnd::Link => {
                        styles.pop();
                        if let Some(url) = link.take() {
                            out.push_str(&format!(" ({})", url).dimmed().to_string());
                        }
                    }
                    TagEnd::List(_) => {
                        lists.pop();
                    }
                    TagEnd::TableCell => out.push(' '),
                    TagEnd::TableHead | TagEnd::TableRow => out.push('|'),
                    _ => {}
                },
                Event::InlineHtml(tag) => {
                    let tag = tag.trim().to_ascii_lowercase();
                    if tag.starts_with("<script") || tag.starts_with("<style") {
                        in_raw_script = true;
                    } else if tag.starts_with("</script") || tag.starts_with("</style") {
                        in_raw_script = false;
                    }
                }
                Event::Text(_) | Event::Code(_) if in_raw_script => {}
                Event::Text(text) => {
                    let text = strip_controls(&text);
                    out.push_str(&apply_styles(&text, &styles));
                }
                Event::Code(code) => out.push_str(&strip_controls(&code).cyan().to_string()),
                Event::SoftBreak | Event::HardBreak => {
                    out.push('\n');
                    out.push_str(&"  ".repeat(lists.len()));
                }
                Event::Rule => {
                    push_blank_line(&mut out);
                    out.push_str(&"─".repeat(40).dimmed().to_string());
                }
                Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
                _ => {}
            }
        }

        out.trim_matches('\n').to_string()
    }
}

#[derive(Clone, Copy)]
enum Style {
    Heading,
    Code,
    Emphasis,
    Strong,
    Strikethrough,
    Link,
}

fn apply_styles(text: &str, styles: &[Style]) -> String {
    let mut styled = text.normal();
    for style in styles {
        styled = match style {
            Style::Heading | Style::Strong => styled.bold(),
            Style::Code => styled.green(),
            Style::Emphasis => styled.italic(),
            Style::Strikethrough => styled.strikethrough(),
            Style::Link => styled.underline().blue(),
        };
    }
    styled.to_string()
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn push_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn strip_controls(text: &str) -> String {
    text.chars().filter(|c| !c.is_control() || *c == '\n' || *c == '\t').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bold_and_drops_script() {
        let html = MarkdownRenderer::new().render_html("**bold** <script>alert(1)</script>");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("script"));
        assert!(!html.contains("alert"));
    }

    #[test]
    fn single_newline_becomes_line_break() {
        let html = MarkdownRenderer::new().render_html("line one\nline two");
        assert!(html.contains("<br>"));
    }

    #[test]
    fn renders_tables_and_fenced_code() {
        let renderer = MarkdownRenderer::new();
        let table = renderer.render_html("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(table.contains("<table>"));
        assert!(table.contains("<td>1</td>"));
        let code = renderer.render_html("```rust\nfn main() {}\n```");
        assert!(code.contains("<pre>"));
        assert!(code.contains("fn main() {}"));
    }

    #[test]
    fn strips_event_handlers_and_javascript_urls() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render_html("<img src=\"https://example.com/x.png\" onerror=\"alert(1)\">\n\n[click](javascript:alert(1))");
        assert!(!html.contains("onerror"));
        assert!(!html.contains("javascript:"));
        assert!(html.contains("click"));
    }

    #[test]
    fn iframe_keeps_embed_attributes() {
        let html = MarkdownRenderer::new().render_html(
            "<iframe src=\"https://www.youtube.com/embed/abc\" allow=\"autoplay; encrypted-media\" allowfullscreen onload=\"alert(1)\"></iframe>",
        );
        assert!(html.contains("<iframe"));
        assert!(html.contains("allow=\"autoplay; encrypted-media\""));
        assert!(html.contains("allowfullscreen"));
        assert!(!html.contains("onload"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let renderer = MarkdownRenderer::new();
        for input in [
            "**bold** <script>alert(1)</script>",
            "<a href=\"javascript:alert(1)\" onclick=\"x()\">x</a>",
            "<iframe src=\"https://example.com\" allow=\"fullscreen\" allowfullscreen></iframe>",
            "plain *text* with `code`",
        ] {
            let once = renderer.render_html(input);
            assert_eq!(renderer.sanitize(&once), once);
        }
    }

    #[test]
    fn plain_rendering_escapes_markup() {
        let plain = MarkdownRenderer::new().render_plain("<b>hi</b>\nthere");
        assert!(!plain.contains("<b>"));
        assert!(plain.contains("&lt;b&gt;"));
        assert!(plain.contains("<br>"));
    }

    #[test]
    fn transcript_wraps_messages_by_role() {
        let page = MarkdownRenderer::new().render_transcript(
            &[Message::user("hello"), Message::bot("<script>x</script>**hi**")],
            true,
        );
        assert!(page.contains("<div class=\"message user\"><p>hello</p>"));
        assert!(page.contains("<div class=\"message bot\">"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn terminal_output_drops_html_and_escape_sequences() {
        let text = MarkdownRenderer::new().render_terminal("**bold** <script>alert(1)</script>\x1b[31mred");
        assert!(text.contains("bold"));
        assert!(!text.contains("<script>"));
        assert!(!text.contains("\x1b[31m"));
    }

    #[test]
    fn terminal_output_hides_inline_script_body() {
        let text = MarkdownRenderer::new().render_terminal("**bold** <script>alert(1)</script> after <style>p{}</style>end");
        assert!(text.contains("bold"));
        assert!(text.contains("after"));
        assert!(text.contains("end"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn terminal_output_numbers_ordered_lists() {
        let text = MarkdownRenderer::new().render_terminal("1. one\n2. two");
        assert!(text.contains("1. "));
        assert!(text.contains("2. "));
        assert!(text.contains("one"));
    }
}
