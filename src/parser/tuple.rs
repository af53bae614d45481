// VALUES block tokenizer: yields one piece per top-level parenthesized group.
// The scan is byte-at-a-time with three pieces of state (paren depth, open
// quote, pending escape); structural bytes are ASCII so slicing at them is
// always on a char boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    // Content between the outermost parens, parens stripped.
    Tuple(&'a str),
    // Text at depth 0 that closes a paren it never opened, closing paren included.
    Fragment(&'a str),
    // A tuple or fragment still open when the block ended.
    Unterminated(&'a str),
}

impl<'a> Piece<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Piece::Tuple(s) | Piece::Fragment(s) | Piece::Unterminated(s) => s,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Open {
    Tuple,
    Fragment,
}

pub struct TupleTokenizer<'a> {
    text: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> TupleTokenizer<'a> {
    // `text` starts right after the VALUES keyword.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            done: false,
        }
    }

    // Bytes consumed so far; after exhaustion this points just past the
    // statement terminator (or at the end of the text).
    pub fn offset(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for TupleTokenizer<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Piece<'a>> {
        if self.done {
            return None;
        }
        let text = self.text;
        let bytes = text.as_bytes();
        let mut depth: u32 = 0;
        let mut quote: Option<u8> = None;
        let mut escape = false;
        let mut open: Option<(usize, Open)> = None;

        while self.pos < bytes.len() {
            let i = self.pos;
            let b = bytes[i];
            self.pos += 1;

            if let Some(q) = quote {
                if escape {
                    escape = false;
                } else if b == b'\\' {
                    escape = true;
                } else if b == q {
                    quote = None;
                }
                continue;
            }

            match b {
                b'\'' | b'"' => {
                    if open.is_none() {
                        open = Some((i, Open::Fragment));
                    }
                    quote = Some(b);
                }
                b'(' => {
                    if open.is_none() {
                        open = Some((i, Open::Tuple));
                    }
                    depth += 1;
                }
                b')' => match open {
                    Some((start, Open::Tuple)) => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(Piece::Tuple(&text[start + 1..i]));
                        }
                    }
                    Some((start, Open::Fragment)) => {
                        if depth == 0 {
                            return Some(Piece::Fragment(&text[start..=i]));
                        }
                        depth -= 1;
                    }
                    None => return Some(Piece::Fragment(&text[i..=i])),
                },
                b';' if depth == 0 => {
                    self.done = true;
                    return open.map(|(start, _)| Piece::Unterminated(text[start..i].trim_end()));
                }
                b',' | b' ' | b'\t' | b'\r' | b'\n' if open.is_none() => {}
                _ => {
                    if open.is_none() {
                        open = Some((i, Open::Fragment));
                    }
                }
            }
        }

        self.done = true;
        open.and_then(|(start, _)| {
            let rest = text[start..].trim_end();
            if rest.is_empty() {
                None
            } else {
                Some(Piece::Unterminated(rest))
            }
        })
    }
}

// Split a tuple body into raw field tokens on top-level commas.
pub fn split_fields(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let bytes = inner.as_bytes();
    let mut fields = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<u8> = None;
    let mut escape = false;
    let mut start = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            // An unmatched `)` in broken text must not hide later commas.
            b')' => depth = (depth - 1).max(0),
            b',' if depth == 0 => {
                fields.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(inner[start..].trim());
    fields
}

// Count fields the way recovery does for fragments: commas outside quotes.
pub fn count_fields(text: &str) -> usize {
    let mut count = 1;
    let mut quote: Option<u8> = None;
    let mut escape = false;
    for &b in text.as_bytes() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b',' => count += 1,
            _ => {}
        }
    }
    count
}
