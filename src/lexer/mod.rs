use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Token {
    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("delete")]
    Delete,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("=>")]
    FatArrow,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token(";")]
    Semi,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Newlines separate statements
    #[token("\n")]
    Newline,
}

/// Strip the surrounding quotes and resolve backslash escapes.
fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Lex source code into a stream of tokens with byte ranges.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                return Err(LexError {
                    position: span.start,
                    snippet: source[span.clone()].to_string(),
                    suggestion: suggest_fix(&source[span.clone()]),
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    match bad_token.chars().next() {
        Some('"') | Some('\'') => "Close the string literal on the same line, and check its escapes".to_string(),
        Some('&') => "Use '&&' for logical and".to_string(),
        Some('|') => "Use '||' for logical or".to_string(),
        Some(c) if c.is_ascii_digit() => "Integer literal does not fit in 64 bits; write it as a float".to_string(),
        _ => format!("Unexpected character(s): '{}'", bad_token),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_expression() {
        assert_eq!(
            kinds("(price * qty) >= 100"),
            vec![
                Token::LParen,
                Token::Ident("price".into()),
                Token::Star,
                Token::Ident("qty".into()),
                Token::RParen,
                Token::GreaterEq,
                Token::Int(100),
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(kinds("1 2.5 3e2"), vec![Token::Int(1), Token::Float(2.5), Token::Float(300.0)]);
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![Token::Str("a\"b\n".into())]);
        assert_eq!(kinds(r"'it\'s'"), vec![Token::Str("it's".into())]);
        assert_eq!(kinds(r#""\u{1b}""#), vec![Token::Str("\u{1b}".into())]);
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(kinds("if iffy"), vec![Token::If, Token::Ident("iffy".into())]);
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("a += b ++ c => d :: e"),
            vec![
                Token::Ident("a".into()),
                Token::PlusAssign,
                Token::Ident("b".into()),
                Token::PlusPlus,
                Token::Ident("c".into()),
                Token::FatArrow,
                Token::Ident("d".into()),
                Token::ColonColon,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn comment_ignored() {
        let toks = kinds("x // trailing\ny");
        assert_eq!(toks, vec![Token::Ident("x".into()), Token::Newline, Token::Ident("y".into())]);
    }

    #[test]
    fn lone_ampersand_suggests_double() {
        let err = lex("a & b").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.suggestion.contains("&&"));
    }
}
