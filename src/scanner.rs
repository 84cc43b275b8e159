// Scanner/tokenizer for assembly source, driven by ISA syntax conventions.

use crate::isa::Isa;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Register,
    Constant,
    Str,
    Directive,
    Comma,
    Colon,
    OpenParen,
    CloseParen,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: i64,
    pub bytes: Vec<u8>,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            value: 0,
            bytes: Vec::new(),
            column,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanError {
    pub message: String,
    pub column: usize,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScanError {}

/// Tokenizes one source line at a time using the ISA's comment character,
/// register/immediate prefixes and label suffix.
pub struct Scanner<'a> {
    isa: &'a Isa,
}

impl<'a> Scanner<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        Self { isa }
    }

    /// Tokenize a single line. The trailing comment (if any) is stripped.
    /// An empty vector means the line holds nothing but whitespace/comment.
    pub fn tokenize_line(&self, line: &str) -> Result<Vec<Token>, ScanError> {
        let mut cursor = Cursor::new(line);
        let mut tokens = Vec::new();
        let comment = self.isa.syntax.comment_char;
        let label_suffix = self.isa.syntax.label_suffix;

        loop {
            cursor.skip_white();
            let column = cursor.column();
            let Some(ch) = cursor.peek() else {
                break;
            };
            if ch == comment {
                break;
            }

            if ch == label_suffix {
                cursor.advance();
                tokens.push(Token::new(TokenKind::Colon, ch.to_string(), column));
                continue;
            }

            match ch {
                ',' => {
                    cursor.advance();
                    tokens.push(Token::new(TokenKind::Comma, ",", column));
                }
                '(' => {
                    cursor.advance();
                    tokens.push(Token::new(TokenKind::OpenParen, "(", column));
                }
                ')' => {
                    cursor.advance();
                    tokens.push(Token::new(TokenKind::CloseParen, ")", column));
                }
                '"' => tokens.push(self.scan_string(&mut cursor)?),
                '\'' => tokens.push(self.scan_char(&mut cursor)?),
                '.' => tokens.push(self.scan_directive(&mut cursor)?),
                _ => {
                    if self.try_strip_prefix(&mut cursor, &self.isa.syntax.immediate_prefix) {
                        tokens.push(self.scan_immediate(&mut cursor, column)?);
                    } else if self.try_strip_prefix(&mut cursor, &self.isa.syntax.register_prefix) {
                        tokens.push(self.scan_word(&mut cursor, column)?);
                    } else if ch == '-' || ch.is_ascii_digit() {
                        tokens.push(self.scan_constant(&mut cursor, column)?);
                    } else if is_ident_start(ch) {
                        tokens.push(self.scan_word(&mut cursor, column)?);
                    } else {
                        return Err(ScanError {
                            message: format!("Illegal character: {}", cursor.rest()),
                            column,
                        });
                    }
                }
            }
        }
        Ok(tokens)
    }

    /// Strip a non-empty syntax prefix when the following character can start
    /// an operand. Returns whether the prefix was consumed.
    fn try_strip_prefix(&self, cursor: &mut Cursor<'_>, prefix: &str) -> bool {
        if prefix.is_empty() || !cursor.rest().starts_with(prefix) {
            return false;
        }
        let after = cursor.rest()[prefix.len()..].chars().next();
        match after {
            Some(ch) if is_ident_start(ch) || ch.is_ascii_digit() || ch == '-' => {
                for _ in 0..prefix.chars().count() {
                    cursor.advance();
                }
                true
            }
            _ => false,
        }
    }

    fn scan_word(&self, cursor: &mut Cursor<'_>, column: usize) -> Result<Token, ScanError> {
        let text = cursor.take_while(is_ident_char);
        if text.is_empty() {
            return Err(ScanError {
                message: format!("Illegal character: {}", cursor.rest()),
                column,
            });
        }
        let mut token = Token::new(TokenKind::Identifier, text, column);
        if let Some(index) = self.isa.registers.lookup(&token.text) {
            token.kind = TokenKind::Register;
            token.value = index as i64;
        }
        Ok(token)
    }

    /// After an immediate prefix: a constant or a symbolic reference.
    fn scan_immediate(&self, cursor: &mut Cursor<'_>, column: usize) -> Result<Token, ScanError> {
        let ch = cursor.peek().unwrap_or('\0');
        if ch == '-' || ch.is_ascii_digit() {
            self.scan_constant(cursor, column)
        } else {
            let text = cursor.take_while(is_ident_char);
            if text.is_empty() {
                return Err(ScanError {
                    message: "Immediate prefix must be followed by a value or symbol".to_string(),
                    column,
                });
            }
            Ok(Token::new(TokenKind::Identifier, text, column))
        }
    }

    fn scan_directive(&self, cursor: &mut Cursor<'_>) -> Result<Token, ScanError> {
        let column = cursor.column();
        cursor.advance();
        let name = cursor.take_while(is_ident_char);
        if name.is_empty() {
            return Err(ScanError {
                message: "Directive name expected after '.'".to_string(),
                column,
            });
        }
        Ok(Token::new(TokenKind::Directive, format!(".{name}"), column))
    }

    fn scan_constant(&self, cursor: &mut Cursor<'_>, column: usize) -> Result<Token, ScanError> {
        let negative = cursor.peek() == Some('-');
        if negative {
            cursor.advance();
        }
        let digits = cursor.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if digits.is_empty() {
            return Err(ScanError {
                message: "Numeric constant expected".to_string(),
                column,
            });
        }

        let cleaned = digits.replace('_', "");
        let lower = cleaned.to_ascii_lowercase();
        let (base, body) = if let Some(hex) = lower.strip_prefix("0x") {
            (16, hex.to_string())
        } else if let Some(bin) = lower.strip_prefix("0b") {
            (2, bin.to_string())
        } else {
            (10, lower)
        };

        let parsed = i64::from_str_radix(&body, base).map_err(|_| ScanError {
            message: match base {
                16 => format!("Illegal character in hex constant: {digits}"),
                2 => format!("Illegal character in binary constant: {digits}"),
                _ => format!("Illegal character in decimal constant: {digits}"),
            },
            column,
        })?;

        let mut token = Token::new(TokenKind::Constant, digits, column);
        token.value = if negative { -parsed } else { parsed };
        Ok(token)
    }

    fn scan_char(&self, cursor: &mut Cursor<'_>) -> Result<Token, ScanError> {
        let column = cursor.column();
        cursor.advance();
        let value = match cursor.peek() {
            Some('\\') => {
                cursor.advance();
                let escaped = cursor.peek().ok_or_else(|| ScanError {
                    message: "Unterminated character literal".to_string(),
                    column,
                })?;
                cursor.advance();
                escape_byte(escaped).ok_or_else(|| ScanError {
                    message: format!("Bad escape in character literal: \\{escaped}"),
                    column,
                })?
            }
            Some(ch) => {
                cursor.advance();
                if !ch.is_ascii() {
                    return Err(ScanError {
                        message: "Character literal must be ASCII".to_string(),
                        column,
                    });
                }
                ch as u8
            }
            None => {
                return Err(ScanError {
                    message: "Unterminated character literal".to_string(),
                    column,
                })
            }
        };
        if cursor.peek() != Some('\'') {
            return Err(ScanError {
                message: "Character literal must end with '".to_string(),
                column,
            });
        }
        cursor.advance();
        let mut token = Token::new(TokenKind::Constant, String::new(), column);
        token.value = value as i64;
        Ok(token)
    }

    fn scan_string(&self, cursor: &mut Cursor<'_>) -> Result<Token, ScanError> {
        let column = cursor.column();
        cursor.advance();
        let mut bytes = Vec::new();
        loop {
            let Some(ch) = cursor.peek() else {
                return Err(ScanError {
                    message: "Unterminated string".to_string(),
                    column,
                });
            };
            cursor.advance();
            match ch {
                '"' => break,
                '\\' => {
                    let escaped = cursor.peek().ok_or_else(|| ScanError {
                        message: "Unterminated string".to_string(),
                        column,
                    })?;
                    cursor.advance();
                    if escaped == 'x' {
                        let hi = cursor.peek().and_then(hex_digit);
                        cursor.advance();
                        let lo = cursor.peek().and_then(hex_digit);
                        cursor.advance();
                        match (hi, lo) {
                            (Some(hi), Some(lo)) => bytes.push((hi << 4) | lo),
                            _ => {
                                return Err(ScanError {
                                    message: "Bad hex escape in string".to_string(),
                                    column,
                                })
                            }
                        }
                    } else {
                        let byte = escape_byte(escaped).ok_or_else(|| ScanError {
                            message: format!("Bad escape in string: \\{escaped}"),
                            column,
                        })?;
                        bytes.push(byte);
                    }
                }
                _ => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        let mut token = Token::new(TokenKind::Str, String::from_utf8_lossy(&bytes), column);
        token.bytes = bytes;
        Ok(token)
    }
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
            source: line,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos = self.pos.saturating_add(1);
    }

    fn column(&self) -> usize {
        self.pos + 1
    }

    fn skip_white(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if pred(ch)) {
            self.advance();
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn rest(&self) -> &str {
        let consumed: usize = self.chars[..self.pos].iter().map(|ch| ch.len_utf8()).sum();
        &self.source[consumed..]
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn hex_digit(ch: char) -> Option<u8> {
    ch.to_digit(16).map(|digit| digit as u8)
}

fn escape_byte(ch: char) -> Option<u8> {
    match ch {
        'n' => Some(b'\n'),
        'r' => Some(b'\r'),
        't' => Some(b'\t'),
        '0' => Some(b'\0'),
        '\\' => Some(b'\\'),
        '"' => Some(b'"'),
        '\'' => Some(b'\''),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Scanner, TokenKind};
    use crate::isa::{builtins, Isa};
    use serde_json::json;

    fn zx16() -> Isa {
        builtins::load("zx16").unwrap()
    }

    #[test]
    fn label_and_instruction_tokens() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line("LOOP: ADD x1, x2, x3").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Register,
                TokenKind::Comma,
                TokenKind::Register,
                TokenKind::Comma,
                TokenKind::Register,
            ]
        );
        assert_eq!(tokens[0].text, "LOOP");
        assert_eq!(tokens[3].value, 1);
        assert_eq!(tokens[7].value, 3);
    }

    #[test]
    fn comment_only_line_yields_no_tokens() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        assert!(scanner.tokenize_line("; just a comment").unwrap().is_empty());
        assert!(scanner.tokenize_line("   ").unwrap().is_empty());
    }

    #[test]
    fn trailing_comment_is_stripped() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line("HALT ; done").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "HALT");
    }

    #[test]
    fn hex_binary_and_negative_constants() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line(".word 0x1234, 0b101, -7").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].text, ".word");
        assert_eq!(tokens[1].value, 0x1234);
        assert_eq!(tokens[3].value, 0b101);
        assert_eq!(tokens[5].value, -7);
    }

    #[test]
    fn register_aliases_resolve_to_same_index() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line("zero").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Register);
        assert_eq!(tokens[0].value, 0);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line(".ascii \"A\\n\\x2a\"").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(tokens[1].bytes, vec![b'A', b'\n', b'*']);
    }

    #[test]
    fn bad_hex_constant_is_an_error() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let err = scanner.tokenize_line("LI x1, 0xZZ").unwrap_err();
        assert!(err.message.contains("hex constant"), "{}", err.message);
    }

    #[test]
    fn custom_comment_char_and_prefixes_are_honored() {
        let doc = json!({
            "name": "Prefixed",
            "word_size": 16,
            "syntax": { "comment_char": "#", "register_prefix": "$", "immediate_prefix": "%" },
            "registers": { "general_purpose": ["r0", "r1"] },
            "instructions": [{
                "mnemonic": "LI",
                "syntax": "LI rd, imm",
                "encoding": { "fields": [
                    { "name": "opcode", "bits": "15:12", "value": "0001" },
                    { "name": "rd",  "bits": "11:8", "type": "register" },
                    { "name": "imm", "bits": "7:0",  "type": "immediate" }
                ]}
            }]
        });
        let isa = Isa::from_document(&doc).unwrap();
        let scanner = Scanner::new(&isa);
        let tokens = scanner.tokenize_line("LI $r1, %42 # load").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].kind, TokenKind::Register);
        assert_eq!(tokens[1].value, 1);
        assert_eq!(tokens[3].kind, TokenKind::Constant);
        assert_eq!(tokens[3].value, 42);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let isa = zx16();
        let scanner = Scanner::new(&isa);
        let err = scanner.tokenize_line(".ascii \"oops").unwrap_err();
        assert!(err.message.contains("Unterminated"), "{}", err.message);
    }
}
