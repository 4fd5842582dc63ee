//! Bracket and HTML rendering of annotated text ranges.
//!
//! A [`Markup`] collects highlights, token titles and markers at character
//! offsets and renders a range of the primary text twice:
//!
//! | element        | brackets | HTML                                          |
//! |----------------|----------|-----------------------------------------------|
//! | class highlight| `{1:..}` | `<mark class="class-1 level-0">..</mark>`     |
//! | token title    |          | `<span title="tt/p:NN">..</span>`             |
//! | page break     | `{#12}`  | `<span class="pb" data-after="12"></span>`    |
//! | cut marker     | `<!>`    | `<span class="cutted"></span>`                |
//!
//! Overlapping highlights are split: closing a highlight that is not the
//! innermost one closes and reopens everything opened after it. The level
//! of a highlight is the number of highlights it is nested in.

use crate::spans::ClassId;

/// Output of [`Markup::render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub brackets: String,
    pub html: String,
}

impl Rendered {
    pub fn push(&mut self, brackets: &str, html: &str) {
        self.brackets.push_str(brackets);
        self.html.push_str(html);
    }

    pub fn append(&mut self, other: Rendered) {
        self.brackets.push_str(&other.brackets);
        self.html.push_str(&other.html);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Open(Tag),
    Close(Tag),
    PageBreak(u32),
    Cut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Mark(ClassId),
    Title(String),
}

#[derive(Debug, Clone)]
struct Event {
    offset: u32,
    /// Start and end of the element the event belongs to.
    range: (u32, u32),
    kind: Kind,
}

impl Event {
    fn rank(&self) -> u8 {
        match &self.kind {
            Kind::Close(Tag::Title(_)) => 0,
            Kind::Close(Tag::Mark(_)) => 1,
            Kind::PageBreak(_) => 2,
            Kind::Cut => 3,
            Kind::Open(Tag::Mark(_)) => 4,
            Kind::Open(Tag::Title(_)) => 5,
        }
    }

    /// Order among events of the same offset and rank.
    fn nesting(&self) -> (i64, i64, i64) {
        let (start, end) = (self.range.0 as i64, self.range.1 as i64);
        match &self.kind {
            Kind::Open(tag) => (-end, start, tag.order()),
            Kind::Close(tag) => (-start, -tag.order(), 0),
            Kind::PageBreak(_) | Kind::Cut => (0, 0, 0),
        }
    }
}

impl Tag {
    fn order(&self) -> i64 {
        match self {
            Tag::Mark(class) => *class as i64,
            Tag::Title(_) => 256,
        }
    }
}

/// Highlights and markers over character offsets.
#[derive(Debug, Clone, Default)]
pub struct Markup {
    events: Vec<Event>,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highlight `[start, end)` with a class. Empty ranges are ignored.
    pub fn highlight(&mut self, class: ClassId, start: u32, end: u32) {
        self.element(Tag::Mark(class), start, end);
    }

    /// Wrap `[start, end)` in a titled span (HTML only).
    pub fn title<S: Into<String>>(&mut self, start: u32, end: u32, title: S) {
        self.element(Tag::Title(title.into()), start, end);
    }

    pub fn page_break(&mut self, offset: u32, page: u32) {
        self.events.push(Event {
            offset,
            range: (offset, offset),
            kind: Kind::PageBreak(page),
        });
    }

    pub fn cut(&mut self, offset: u32) {
        self.events.push(Event {
            offset,
            range: (offset, offset),
            kind: Kind::Cut,
        });
    }

    fn element(&mut self, tag: Tag, start: u32, end: u32) {
        if start >= end {
            return;
        }
        self.events.push(Event {
            offset: start,
            range: (start, end),
            kind: Kind::Open(tag.clone()),
        });
        self.events.push(Event {
            offset: end,
            range: (start, end),
            kind: Kind::Close(tag),
        });
    }

    /// Render `chars[from..to]`.
    ///
    /// Markers at `from` and `to` are included; elements are clipped to the
    /// range.
    pub fn render(&self, chars: &[char], from: u32, to: u32) -> Rendered {
        let to = to.min(chars.len() as u32);
        let from = from.min(to);

        let mut events: Vec<Event> = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let (start, end) = event.range;
            match &event.kind {
                Kind::Open(_) | Kind::Close(_) => {
                    let (start, end) = (start.max(from), end.min(to));
                    if start >= end {
                        continue;
                    }
                    let open = matches!(event.kind, Kind::Open(_));
                    events.push(Event {
                        offset: if open { start } else { end },
                        range: (start, end),
                        kind: event.kind.clone(),
                    });
                }
                Kind::PageBreak(_) | Kind::Cut => {
                    if event.offset >= from && event.offset <= to {
                        events.push(event.clone());
                    }
                }
            }
        }
        // Outer elements open first and close last.
        events.sort_by_key(|e| (e.offset, e.rank(), e.nesting()));

        let mut writer = Writer::default();
        let mut cursor = from;
        for event in events {
            if event.offset > cursor {
                writer.text(&chars[cursor as usize..event.offset as usize]);
                cursor = event.offset;
            }
            match event.kind {
                Kind::Open(tag) => writer.open(tag),
                Kind::Close(tag) => writer.close(&tag),
                Kind::PageBreak(page) => writer.out.push(
                    &format!("{{#{page}}}"),
                    &format!("<span class=\"pb\" data-after=\"{page}\"></span>"),
                ),
                Kind::Cut => writer.out.push("<!>", "<span class=\"cutted\"></span>"),
            }
        }
        if to > cursor {
            writer.text(&chars[cursor as usize..to as usize]);
        }
        writer.finish()
    }
}

#[derive(Default)]
struct Writer {
    out: Rendered,
    stack: Vec<Tag>,
}

impl Writer {
    fn text(&mut self, chars: &[char]) {
        for &c in chars {
            self.out.brackets.push(c);
            escape_into(&mut self.out.html, c);
        }
    }

    fn open(&mut self, tag: Tag) {
        match &tag {
            Tag::Mark(class) => {
                let level = self
                    .stack
                    .iter()
                    .filter(|t| matches!(t, Tag::Mark(_)))
                    .count();
                self.out.push(
                    &format!("{{{class}:"),
                    &format!("<mark class=\"class-{class} level-{level}\">"),
                );
            }
            Tag::Title(title) => {
                let mut html = String::from("<span title=\"");
                title.chars().for_each(|c| escape_into(&mut html, c));
                html.push_str("\">");
                self.out.push("", &html);
            }
        }
        self.stack.push(tag);
    }

    fn emit_close(&mut self, tag: &Tag) {
        match tag {
            Tag::Mark(_) => self.out.push("}", "</mark>"),
            Tag::Title(_) => self.out.push("", "</span>"),
        }
    }

    fn close(&mut self, tag: &Tag) {
        let Some(index) = self.stack.iter().rposition(|t| t == tag) else {
            return;
        };
        let reopen = self.stack.split_off(index + 1);
        for inner in reopen.iter().rev() {
            self.emit_close(inner);
        }
        if let Some(closed) = self.stack.pop() {
            self.emit_close(&closed);
        }
        for inner in reopen {
            self.open(inner);
        }
    }

    fn finish(mut self) -> Rendered {
        while let Some(tag) = self.stack.pop() {
            self.emit_close(&tag);
        }
        self.out
    }
}

/// Append `c` HTML-escaped.
pub fn escape_into(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    text.chars().for_each(|c| escape_into(&mut out, c));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    #[test]
    fn test_plain_text_is_escaped_in_html_only() {
        let text = chars("a < b & c");
        let rendered = Markup::new().render(&text, 0, text.len() as u32);
        assert_eq!(rendered.brackets, "a < b & c");
        assert_eq!(rendered.html, "a &lt; b &amp; c");
    }

    #[test]
    fn test_nested_highlights() {
        let text = chars("der alte Baum");
        let mut markup = Markup::new();
        markup.highlight(1, 0, 13);
        markup.highlight(2, 4, 8);
        let rendered = markup.render(&text, 0, 13);
        assert_eq!(rendered.brackets, "{1:der {2:alte} Baum}");
        assert_eq!(
            rendered.html,
            "<mark class=\"class-1 level-0\">der <mark class=\"class-2 level-1\">alte</mark> Baum</mark>"
        );
    }

    #[test]
    fn test_overlapping_highlights_are_split() {
        let text = chars("abcdef");
        let mut markup = Markup::new();
        markup.highlight(1, 0, 4);
        markup.highlight(2, 2, 6);
        let rendered = markup.render(&text, 0, 6);
        assert_eq!(rendered.brackets, "{1:ab{2:cd}}{2:ef}");
    }

    #[test]
    fn test_markers_and_titles() {
        let text = chars("der Baum");
        let mut markup = Markup::new();
        markup.title(4, 8, "tt/p:NN");
        markup.page_break(4, 2);
        markup.cut(8);
        let rendered = markup.render(&text, 0, 8);
        assert_eq!(rendered.brackets, "der {#2}Baum<!>");
        assert_eq!(
            rendered.html,
            "der <span class=\"pb\" data-after=\"2\"></span><span title=\"tt/p:NN\">Baum</span><span class=\"cutted\"></span>"
        );
    }

    #[test]
    fn test_clips_to_range() {
        let text = chars("abcdef");
        let mut markup = Markup::new();
        markup.highlight(1, 1, 5);
        markup.page_break(0, 9);
        let rendered = markup.render(&text, 2, 4);
        assert_eq!(rendered.brackets, "{1:cd}");
    }

    #[test]
    fn test_deterministic() {
        let text = chars("x y z");
        let mut markup = Markup::new();
        markup.highlight(3, 0, 5);
        markup.highlight(1, 0, 5);
        let first = markup.render(&text, 0, 5);
        let second = markup.render(&text, 0, 5);
        assert_eq!(first, second);
        assert_eq!(first.brackets, "{1:{3:x y z}}");
    }
}
