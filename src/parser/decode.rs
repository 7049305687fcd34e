// Source text validation
//
// Files are rejected before any rule runs when they are empty, binary, not
// UTF-8, too large, or structurally broken (unbalanced delimiters, an
// unterminated block comment or multi-line string).

use crate::analysis::{FileError, FileErrorKind};
use std::path::Path;

/// Comment syntax of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `//` and `/* */` (Java, Kotlin, JavaScript, TypeScript)
    CStyle,
    /// `#` (Python, Ruby)
    Hash,
}

impl CommentStyle {
    /// Pick the comment style from a file extension
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("rb") | Some("rake") => CommentStyle::Hash,
            _ => CommentStyle::CStyle,
        }
    }

    fn backtick_strings(&self) -> bool {
        matches!(self, CommentStyle::CStyle)
    }
}

/// Validate raw bytes and turn them into text
pub fn decode(path: &Path, bytes: &[u8], max_bytes: u64) -> Result<String, FileError> {
    if bytes.len() as u64 > max_bytes {
        return Err(FileError::new(
            path,
            FileErrorKind::TooLarge,
            format!("{} bytes exceeds the {} byte limit", bytes.len(), max_bytes),
        ));
    }

    if bytes.is_empty() {
        return Err(FileError::new(path, FileErrorKind::Empty, "file is empty"));
    }

    if let Some(offset) = bytes.iter().position(|b| *b == 0) {
        return Err(FileError::new(
            path,
            FileErrorKind::Binary,
            format!("NUL byte at offset {}", offset),
        ));
    }

    let text = std::str::from_utf8(bytes).map_err(|e| {
        FileError::new(
            path,
            FileErrorKind::Encoding,
            format!("invalid UTF-8 at byte {}", e.valid_up_to()),
        )
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    check_structure(text, CommentStyle::for_path(path))
        .map_err(|message| FileError::new(path, FileErrorKind::Malformed, message))?;

    Ok(text.to_string())
}

/// Punctuation after which a `/` starts a regex literal rather than a division
const REGEX_PRECEDERS: &[char] = &['(', ',', '=', ':', '[', '!', '&', '|', '?', '{', '}', ';'];

/// Keywords after which a `/` starts a regex literal
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "delete", "void", "throw",
];

/// Check that brackets balance outside of comments, string and regex literals
pub fn check_structure(text: &str, style: CommentStyle) -> Result<(), String> {
    let chars: Vec<char> = text.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;
    // Whether a `/` here would open a regex literal
    let mut regex_ok = true;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\n' => {
                line += 1;
                i += 1;
                regex_ok = true;
            }
            '/' if style == CommentStyle::CStyle && next == Some('/') => {
                i = skip_to_newline(&chars, i);
            }
            '/' if style == CommentStyle::CStyle && next == Some('*') => {
                let opened = line;
                i += 2;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(format!(
                                "unterminated block comment opened at line {}",
                                opened
                            ))
                        }
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            '/' if style == CommentStyle::CStyle && regex_ok => {
                // Not a regex after all if it runs into the end of the line
                i = skip_regex(&chars, i).unwrap_or(i + 1);
                regex_ok = false;
            }
            '#' if style == CommentStyle::Hash => {
                i = skip_to_newline(&chars, i);
            }
            '"' | '\'' | '`' => {
                regex_ok = false;
                let opened = line;
                let triple = c != '`' && next == Some(c) && chars.get(i + 2) == Some(&c);
                if triple {
                    i += 3;
                    loop {
                        match chars.get(i) {
                            None => {
                                return Err(format!(
                                    "unterminated string literal opened at line {}",
                                    opened
                                ))
                            }
                            Some('\\') => i += 2,
                            Some(ch) if *ch == c
                                && chars.get(i + 1) == Some(&c)
                                && chars.get(i + 2) == Some(&c) =>
                            {
                                i += 3;
                                break;
                            }
                            Some('\n') => {
                                line += 1;
                                i += 1;
                            }
                            Some(_) => i += 1,
                        }
                    }
                } else if c == '`' && style.backtick_strings() {
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None => {
                                return Err(format!(
                                    "unterminated template literal opened at line {}",
                                    opened
                                ))
                            }
                            Some('\\') => i += 2,
                            Some('`') => {
                                i += 1;
                                break;
                            }
                            Some('\n') => {
                                line += 1;
                                i += 1;
                            }
                            Some(_) => i += 1,
                        }
                    }
                } else {
                    // Single-line literal; an unterminated one ends at the newline
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None | Some('\n') => break,
                            Some('\\') => i += 2,
                            Some(ch) if *ch == c => {
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                }
            }
            '(' | '[' | '{' => {
                stack.push((c, line));
                i += 1;
                regex_ok = true;
            }
            ')' | ']' | '}' => {
                regex_ok = c == '}';
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, at)) => {
                        return Err(format!(
                            "mismatched '{}' at line {} closes '{}' from line {}",
                            c, line, open, at
                        ))
                    }
                    None => return Err(format!("unexpected '{}' at line {}", c, line)),
                }
                i += 1;
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                regex_ok = REGEX_KEYWORDS.contains(&word.as_str());
            }
            c if c.is_whitespace() => i += 1,
            _ => {
                regex_ok = REGEX_PRECEDERS.contains(&c);
                i += 1;
            }
        }
    }

    match stack.last() {
        Some((open, at)) => Err(format!("unclosed '{}' opened at line {}", open, at)),
        None => Ok(()),
    }
}

/// Index just past a regex literal starting at `start`, flags included
fn skip_regex(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut in_class = false;
    loop {
        match chars.get(i)? {
            '\n' => return None,
            '\\' => i += 2,
            '[' => {
                in_class = true;
                i += 1;
            }
            ']' => {
                in_class = false;
                i += 1;
            }
            '/' if !in_class => {
                i += 1;
                while chars.get(i).map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn skip_to_newline(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1024 * 1024;

    fn kind_of(path: &str, bytes: &[u8]) -> Option<FileErrorKind> {
        decode(Path::new(path), bytes, LIMIT).err().map(|e| e.kind)
    }

    #[test]
    fn test_valid_source() {
        let text = decode(Path::new("app.py"), b"def f(x):\n    return [x]\n", LIMIT).unwrap();
        assert!(text.starts_with("def f"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let text = decode(Path::new("a.js"), "\u{feff}let a = 1;".as_bytes(), LIMIT).unwrap();
        assert_eq!(text, "let a = 1;");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(kind_of("a.py", b""), Some(FileErrorKind::Empty));
        assert_eq!(kind_of("a.py", b"x = 1\0\0"), Some(FileErrorKind::Binary));
        assert_eq!(kind_of("a.py", &[0x66, 0xff, 0xfe, 0x41]), Some(FileErrorKind::Encoding));
        assert_eq!(kind_of("A.java", b"class A {"), Some(FileErrorKind::Malformed));
    }

    #[test]
    fn test_too_large() {
        let err = decode(Path::new("a.rb"), b"puts 1", 3).unwrap_err();
        assert_eq!(err.kind, FileErrorKind::TooLarge);
    }

    #[test]
    fn test_brackets_in_comments_and_strings_are_ignored() {
        let java = "class A { // }\n String s = \"{(\"; /* ] */ }\n";
        assert!(check_structure(java, CommentStyle::CStyle).is_ok());

        let python = "x = ['(']  # )\ndoc = '''\n{\n'''\n";
        assert!(check_structure(python, CommentStyle::Hash).is_ok());
    }

    #[test]
    fn test_mismatched_and_unclosed() {
        let err = check_structure("f(a];", CommentStyle::CStyle).unwrap_err();
        assert!(err.contains("mismatched"));

        let err = check_structure("def f(\n  x\n", CommentStyle::Hash).unwrap_err();
        assert!(err.contains("unclosed '(' opened at line 1"));

        let err = check_structure("}", CommentStyle::CStyle).unwrap_err();
        assert!(err.contains("unexpected"));
    }

    #[test]
    fn test_unterminated_comment_and_strings() {
        assert!(check_structure("/* open", CommentStyle::CStyle).is_err());
        assert!(check_structure("s = \"\"\"never", CommentStyle::Hash).is_err());
        assert!(check_structure("const s = `a\nb", CommentStyle::CStyle).is_err());
        // Hash-comment languages have no block comments
        assert!(check_structure("x = 1 /* not a comment", CommentStyle::Hash).is_ok());
    }

    #[test]
    fn test_regex_literals_are_skipped() {
        let redirect = r#"const router = require('express').Router();

router.get('/go', (req, res) => {
  if (/^https?:\/\//.test(req.query.u)) {
    return res.redirect(req.query.u);
  }
  res.sendStatus(400);
});
"#;
        assert!(decode(Path::new("routes/go.js"), redirect.as_bytes(), LIMIT).is_ok());

        let escape = r#"function esc(s) {
  return s.replace(/"/g, '\\"');
}

function hasBrace(s) {
  return /[{(]/.test(s) && /\}/.test(s);
}
"#;
        assert!(decode(Path::new("lib/esc.js"), escape.as_bytes(), LIMIT).is_ok());
    }

    #[test]
    fn test_division_is_not_a_regex() {
        assert!(check_structure("let r = a / b, s = \"/(\";\n", CommentStyle::CStyle).is_ok());
        assert!(check_structure("const half = (total) / 2 / 1;\n", CommentStyle::CStyle).is_ok());
        let err =
            check_structure("const x = items[0] / 2;\nf(x];\n", CommentStyle::CStyle).unwrap_err();
        assert!(err.contains("mismatched"));
    }

    #[test]
    fn test_comment_style_for_path() {
        assert_eq!(CommentStyle::for_path(Path::new("a/b.py")), CommentStyle::Hash);
        assert_eq!(CommentStyle::for_path(Path::new("Gemfile.rb")), CommentStyle::Hash);
        assert_eq!(CommentStyle::for_path(Path::new("App.kt")), CommentStyle::CStyle);
    }
}
