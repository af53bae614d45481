// INSERT scanner: walks a decoded chunk statement by statement and hands
// each VALUES block to the tuple tokenizer. Comments are only recognized
// between statements, so comment markers inside string literals stay data.
// No SQL grammar beyond the header.

use crate::parser::tuple::TupleTokenizer;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertHeader<'t> {
    pub table: &'t str,
    // Explicit column list, empty when the statement relies on table order.
    pub columns: Vec<String>,
}

pub struct StatementScanner {
    insert_re: Regex,
}

impl StatementScanner {
    // Build the header regex once; the scanner is shared by all workers.
    pub fn new() -> Self {
        let insert_re = Regex::new(
            r"(?i)\AINSERT\s+(?:IGNORE\s+)?INTO\s+(?:`?[^`\s(]+`?\.)?`?([^`\s(]+)`?\s*(?:\(([^)]*)\))?\s*VALUES",
        )
        .expect("valid insert regex");
        Self { insert_re }
    }

    // Call `on_insert` once per INSERT statement with a tokenizer positioned
    // on its VALUES block. Pieces the callback leaves unread are skipped, as
    // are comments and statements of any other kind.
    // Returns the number of INSERT statements seen.
    pub fn for_each_insert<'t, F>(&self, text: &'t str, mut on_insert: F) -> usize
    where
        F: FnMut(&InsertHeader<'t>, &mut TupleTokenizer<'t>),
    {
        let mut pos = 0usize;
        let mut statements = 0usize;
        loop {
            pos = skip_gap(text, pos);
            if pos >= text.len() {
                break;
            }
            let Some(caps) = self.insert_re.captures(&text[pos..]) else {
                pos = statement_end(text, pos);
                continue;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };
            let header = InsertHeader {
                table: caps.get(1).map_or("", |m| m.as_str()),
                columns: caps
                    .get(2)
                    .map(|m| parse_column_list(m.as_str()))
                    .unwrap_or_default(),
            };
            let values_start = pos + whole.end();
            let mut tokenizer = TupleTokenizer::new(&text[values_start..]);
            on_insert(&header, &mut tokenizer);
            tokenizer.by_ref().for_each(drop);
            pos = values_start + tokenizer.offset();
            statements += 1;
        }
        statements
    }
}

impl Default for StatementScanner {
    fn default() -> Self {
        Self::new()
    }
}

// Skip whitespace, stray `;` and comments (`-- `, `#`, `/* */`, including
// mysqldump's `/*!40101 ... */` directives) up to the next statement.
fn skip_gap(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest[0].is_ascii_whitespace() || rest[0] == b';' {
            pos += 1;
        } else if rest.starts_with(b"--") || rest[0] == b'#' {
            pos = rest
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |n| pos + n + 1);
        } else if rest.starts_with(b"/*") {
            pos = text[pos + 2..]
                .find("*/")
                .map_or(bytes.len(), |n| pos + 2 + n + 2);
        } else {
            break;
        }
    }
    pos
}

// End of a non-INSERT statement: just past the first `;` outside quotes.
fn statement_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
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
            b'\'' | b'"' | b'`' => quote = Some(b),
            b';' => return i + 1,
            _ => {}
        }
    }
    bytes.len()
}

fn parse_column_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches(['`', '\'', '"'].as_ref()))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tuple::Piece;

    fn collect(text: &str) -> Vec<(String, Vec<String>, Vec<String>)> {
        let scanner = StatementScanner::new();
        let mut out = Vec::new();
        scanner.for_each_insert(text, |header, tokens| {
            let pieces = tokens.map(|p| p.text().to_string()).collect();
            out.push((header.table.to_string(), header.columns.clone(), pieces));
        });
        out
    }

    #[test]
    fn finds_each_statement_and_its_tuples() {
        let text = "INSERT INTO `geo` VALUES (1,2,3,4),(5,6,7,8);\n\
                    insert ignore into base (`id`, `WiFiKey`) values (1,'k');\n";
        let got = collect(text);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, "geo");
        assert_eq!(got[0].2, vec!["1,2,3,4", "5,6,7,8"]);
        assert_eq!(got[1].0, "base");
        assert_eq!(got[1].1, vec!["id", "WiFiKey"]);
        assert_eq!(got[1].2, vec!["1,'k'"]);
    }

    #[test]
    fn schema_qualified_table_name() {
        let got = collect("INSERT INTO `wifi`.`nets` VALUES (1);");
        assert_eq!(got[0].0, "nets");
    }

    #[test]
    fn header_text_inside_values_is_not_a_statement() {
        let text = "INSERT INTO t VALUES ('INSERT INTO u VALUES (9)'),(2);\nINSERT INTO v VALUES (3);";
        let tables: Vec<String> = collect(text).into_iter().map(|s| s.0).collect();
        assert_eq!(tables, vec!["t", "v"]);
    }

    #[test]
    fn unread_pieces_are_skipped() {
        let scanner = StatementScanner::new();
        let mut firsts = Vec::new();
        let n = scanner.for_each_insert("INSERT INTO a VALUES (1),(2);INSERT INTO b VALUES (3);", |h, t| {
            if let Some(Piece::Tuple(s)) = t.next() {
                firsts.push(format!("{}:{}", h.table, s));
            }
        });
        assert_eq!(n, 2);
        assert_eq!(firsts, vec!["a:1", "b:3"]);
    }

    #[test]
    fn comments_and_other_statements_are_skipped() {
        let text = "/*!40000 ALTER TABLE `geo` DISABLE KEYS */;\n\
                    -- INSERT INTO x VALUES (1);\n\
                    # INSERT INTO y VALUES (1);\n\
                    LOCK TABLES `geo` WRITE;\n\
                    /* multi\nline */ INSERT INTO geo VALUES (2);\n\
                    UNLOCK TABLES;";
        let got = collect(text);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "geo");
        assert_eq!(got[0].2, vec!["2"]);
    }

    #[test]
    fn comment_markers_inside_strings_are_data() {
        let text = "INSERT INTO base VALUES (1,'pa/*!ss'),(2,'-- k2\n# x'),(3,'x*/y');\n\
                    CREATE TABLE t (c TEXT COMMENT 'a;INSERT INTO z VALUES (0)');\n\
                    INSERT INTO geo VALUES (4);";
        let got = collect(text);
        assert_eq!(got.len(), 2);
        assert_eq!(
            got[0].2,
            vec!["1,'pa/*!ss'", "2,'-- k2\n# x'", "3,'x*/y'"]
        );
        assert_eq!(got[1].0, "geo");
    }
}
