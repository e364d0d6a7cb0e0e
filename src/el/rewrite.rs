//! Expression rewriting
//!
//! Each `${...}` body is either a boolean combination of chains
//! (`a:gt(1) and not b:isEmpty()`) or a single chain
//! (`subject:fn(args):fn(args)`). Boolean combinations are parsed with
//! precedence `not > and > or` and re-rendered in suffix form:
//!
//! ```text
//! a and b      ->  a:and(${b})
//! a or b       ->  a:or(${b})
//! not a        ->  a:not()
//! ```

use super::scan::{matching_close, quoted_end, segments, Segment};

// ============================================================================
// CORRECTION TABLES
// ============================================================================

/// Common wrong function names → platform names (no right-hand side is a key)
const FUNCTION_FIXES: &[(&str, &str)] = &[
    ("ifNull", "replaceNull"),
    ("ifEmpty", "replaceEmpty"),
    ("isBlank", "isEmpty"),
    ("isNullOrEmpty", "isEmpty"),
    ("isNotNull", "notNull"),
    ("exists", "notNull"),
    ("contain", "contains"),
    ("startWith", "startsWith"),
    ("endWith", "endsWith"),
    ("equal", "equals"),
    ("toLowerCase", "toLower"),
    ("lowercase", "toLower"),
    ("toUpperCase", "toUpper"),
    ("uppercase", "toUpper"),
    ("gte", "ge"),
    ("lte", "le"),
    ("greaterThan", "gt"),
    ("lessThan", "lt"),
    ("greaterThanOrEqual", "ge"),
    ("lessThanOrEqual", "le"),
    ("size", "length"),
    ("len", "length"),
    ("strip", "trim"),
    ("concat", "append"),
    ("substr", "substring"),
    ("toInt", "toNumber"),
    ("toInteger", "toNumber"),
    ("parseNumber", "toNumber"),
    ("matchesRegex", "matches"),
    ("uuid", "UUID"),
    ("currentTime", "now"),
];

/// Common wrong attribute names → core attribute names
const ATTRIBUTE_FIXES: &[(&str, &str)] = &[
    ("file.name", "filename"),
    ("fileName", "filename"),
    ("file_name", "filename"),
    ("file.size", "fileSize"),
    ("filesize", "fileSize"),
    ("file_size", "fileSize"),
    ("mimeType", "mime.type"),
    ("mime_type", "mime.type"),
    ("mimetype", "mime.type"),
    ("absolutePath", "absolute.path"),
    ("absolute_path", "absolute.path"),
    ("file.path", "path"),
    ("filePath", "path"),
];

/// Functions that operate on a subject and must be chained with `:`
const CHAINABLE: &[&str] = &[
    "toUpper", "toLower", "trim", "length", "isEmpty", "isNull", "notNull", "not", "and", "or",
    "equals", "equalsIgnoreCase", "contains", "startsWith", "endsWith", "matches", "find",
    "substring", "substringBefore", "substringAfter", "replace", "replaceAll", "replaceFirst",
    "replaceNull", "replaceEmpty", "append", "prepend", "gt", "ge", "lt", "le", "plus", "minus",
    "multiply", "divide", "mod", "toNumber", "toDecimal", "toString", "toDate", "format",
    "urlEncode", "urlDecode", "escapeJson", "unescapeJson", "jsonPath", "ifElse", "count",
];

/// Calls allowed inside a nested subject that can be flattened
const EXISTENCE_CALLS: &[&str] = &["isEmpty", "isNull", "notNull", "not", "trim", "length"];

fn fix_function(name: &str) -> Option<&'static str> {
    FUNCTION_FIXES
        .iter()
        .find(|(wrong, _)| *wrong == name)
        .map(|(_, right)| *right)
}

fn fix_attribute(name: &str) -> Option<&'static str> {
    ATTRIBUTE_FIXES
        .iter()
        .find(|(wrong, _)| *wrong == name)
        .map(|(_, right)| *right)
}

// ============================================================================
// NOTES
// ============================================================================

/// Warnings collected while rewriting one value
#[derive(Debug, Default)]
pub(crate) struct Notes {
    pub warnings: Vec<String>,
}

impl Notes {
    fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}

// ============================================================================
// VALUE LEVEL
// ============================================================================

/// Correct every expression in a (balanced) value
///
/// With `combine`, plain-text operators between expressions
/// (`${a} and ${b}`) are folded into one boolean expression.
pub(crate) fn correct_text(text: &str, combine: bool, notes: &mut Notes) -> Result<String, String> {
    let segs = segments(text)?;
    if !segs.iter().any(|s| matches!(s, Segment::Expr(_))) {
        return Ok(text.to_string());
    }

    let mut parts: Vec<Part> = Vec::with_capacity(segs.len());
    for seg in segs {
        parts.push(match seg {
            Segment::Literal(l) => Part::Literal(l.to_string()),
            Segment::Expr(inner) => Part::Expr(correct_expr(inner, notes)?),
        });
    }

    if let Some(combined) = combine.then(|| combine_top_level(&parts)).flatten() {
        notes.warn(format!(
            "Auto-corrected EL logical operators between expressions: '{}' -> '${{{}}}'",
            text.trim(),
            combined
        ));
        return Ok(format!("${{{}}}", combined));
    }

    Ok(parts
        .iter()
        .map(|p| match p {
            Part::Literal(l) => l.clone(),
            Part::Expr(inner) => format!("${{{}}}", inner),
        })
        .collect())
}

enum Part {
    Literal(String),
    Expr(String),
}

/// `${a} and ${b}` written as plain text between expressions
///
/// `None` leaves the literal text as it is, including when the operators
/// do not form a valid boolean expression.
fn combine_top_level(parts: &[Part]) -> Option<String> {
    let mut tokens = Vec::new();
    for part in parts {
        match part {
            Part::Expr(inner) => tokens.push(Token::Operand(inner.clone())),
            Part::Literal(l) => {
                for token in tokenize(l) {
                    if matches!(token, Token::Operand(_)) {
                        return None;
                    }
                    tokens.push(token);
                }
            }
        }
    }

    if !tokens.iter().any(Token::is_operator) {
        return None;
    }

    parse_bool(&tokens).ok().map(|expr| render(&expr))
}

/// Correct the body of one `${...}`
fn correct_expr(inner: &str, notes: &mut Notes) -> Result<String, String> {
    let tokens = tokenize(inner);
    if !tokens.iter().any(Token::is_operator) {
        return correct_chain(inner, notes);
    }

    let mut corrected = Vec::with_capacity(tokens.len());
    for token in tokens {
        corrected.push(match token {
            Token::Operand(text) => Token::Operand(correct_chain(&text, notes)?),
            other => other,
        });
    }

    let expr = parse_bool(&corrected)
        .map_err(|e| format!("cannot rewrite logical operators in '${{{}}}': {}", inner, e))?;
    let rendered = render(&expr);
    notes.warn(format!(
        "Auto-corrected EL logical operators: '${{{}}}' -> '${{{}}}'",
        inner.trim(),
        rendered
    ));
    Ok(rendered)
}

// ============================================================================
// BOOLEAN LAYER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl Token {
    fn is_operator(&self) -> bool {
        matches!(self, Token::And | Token::Or | Token::Not)
    }

    fn describe(&self) -> String {
        match self {
            Token::Operand(t) => format!("'{}'", t),
            Token::And => "'and'".into(),
            Token::Or => "'or'".into(),
            Token::Not => "'not'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// Depth-0 tokenization; function-call parens, quotes and nested `${}` stay
/// inside operands
fn tokenize(text: &str) -> Vec<Token> {
    let b = text.as_bytes();
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut i = 0;

    let flush = |cur: &mut String, tokens: &mut Vec<Token>| {
        let t = cur.trim();
        if !t.is_empty() {
            tokens.push(Token::Operand(t.to_string()));
        }
        cur.clear();
    };

    while i < b.len() {
        let c = b[i];
        let at_boundary = cur.is_empty() || cur.ends_with(char::is_whitespace);

        match c {
            b'\'' | b'"' => {
                let end = quoted_end(text, i);
                cur.push_str(&text[i..end]);
                i = end;
                continue;
            }
            b'$' if b.get(i + 1) == Some(&b'{') => {
                let end = matching_close(text, i).unwrap_or(b.len() - 1);
                cur.push_str(&text[i..=end]);
                i = end + 1;
                continue;
            }
            b'(' if at_boundary => {
                flush(&mut cur, &mut tokens);
                tokens.push(Token::LParen);
                i += 1;
                continue;
            }
            b'(' => {
                let end = matching_close(text, i).unwrap_or(b.len() - 1);
                cur.push_str(&text[i..=end]);
                i = end + 1;
                continue;
            }
            b')' => {
                flush(&mut cur, &mut tokens);
                tokens.push(Token::RParen);
                i += 1;
                continue;
            }
            b'&' if b.get(i + 1) == Some(&b'&') => {
                flush(&mut cur, &mut tokens);
                tokens.push(Token::And);
                i += 2;
                continue;
            }
            b'|' if b.get(i + 1) == Some(&b'|') => {
                flush(&mut cur, &mut tokens);
                tokens.push(Token::Or);
                i += 2;
                continue;
            }
            _ if c.is_ascii_alphabetic() && at_boundary => {
                let len = b[i..].iter().take_while(|c| c.is_ascii_alphabetic()).count();
                let after = b.get(i + len).copied();
                let ends_word = matches!(after, None | Some(b'(') | Some(b')') | Some(b'$'))
                    || after.is_some_and(|a| a.is_ascii_whitespace());
                let keyword = match &text[i..i + len] {
                    w if w.eq_ignore_ascii_case("and") => Some(Token::And),
                    w if w.eq_ignore_ascii_case("or") => Some(Token::Or),
                    w if w.eq_ignore_ascii_case("not") => Some(Token::Not),
                    _ => None,
                };
                if let (true, Some(token)) = (ends_word, keyword) {
                    flush(&mut cur, &mut tokens);
                    tokens.push(token);
                    i += len;
                    continue;
                }
                cur.push_str(&text[i..i + len]);
                i += len;
                continue;
            }
            _ => {}
        }

        let ch = text[i..].chars().next().unwrap_or(' ');
        cur.push(ch);
        i += ch.len_utf8();
    }
    flush(&mut cur, &mut tokens);
    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum BoolExpr {
    Operand(String),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

struct BoolParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

fn parse_bool(tokens: &[Token]) -> Result<BoolExpr, String> {
    let mut parser = BoolParser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(format!("unexpected {}", t.describe())),
    }
}

impl BoolParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<BoolExpr, String> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = BoolExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<BoolExpr, String> {
        let mut left = self.not_expr()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.not_expr()?;
            left = BoolExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<BoolExpr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(BoolExpr::Not(Box::new(self.not_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<BoolExpr, String> {
        match self.next().cloned() {
            Some(Token::Operand(text)) => Ok(BoolExpr::Operand(text)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(other) => Err(format!("expected an operand, found {}", other.describe())),
            None => Err("expression ends where an operand is expected".to_string()),
        }
    }
}

fn render(expr: &BoolExpr) -> String {
    match expr {
        BoolExpr::Operand(text) => text.clone(),
        BoolExpr::Not(inner) => format!("{}:not()", render(inner)),
        BoolExpr::And(l, r) => format!("{}:and(${{{}}})", render(l), render(r)),
        BoolExpr::Or(l, r) => format!("{}:or(${{{}}})", render(l), render(r)),
    }
}

// ============================================================================
// CHAIN LAYER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Call {
    name: String,
    args: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Subject {
    Attribute(String),
    Function(Call),
    Nested(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Chain {
    subject: Subject,
    calls: Vec<Call>,
}

impl Chain {
    fn render(&self) -> String {
        let mut out = match &self.subject {
            Subject::Attribute(a) => a.clone(),
            Subject::Function(call) => format!("{}({})", call.name, call.args),
            Subject::Nested(inner) => format!("${{{}}}", inner),
        };
        for call in &self.calls {
            out.push_str(&format!(":{}({})", call.name, call.args));
        }
        out
    }
}

/// Parse `subject(:name(args))*`; `None` when the text is not a plain chain
fn parse_chain(text: &str) -> Option<Chain> {
    let text = text.trim();
    let b = text.as_bytes();
    if b.is_empty() {
        return None;
    }

    let (subject, mut i) = if text.starts_with("${") {
        let end = matching_close(text, 0)?;
        (Subject::Nested(text[2..end].to_string()), end + 1)
    } else if b[0] == b'\'' || b[0] == b'"' {
        let end = quoted_end(text, 0);
        (Subject::Attribute(text[..end].to_string()), end)
    } else {
        let stop = b
            .iter()
            .position(|&c| c == b':' || c == b'(')
            .unwrap_or(b.len());
        let name = text[..stop].trim();
        if name.is_empty() {
            return None;
        }
        if b.get(stop) == Some(&b'(') {
            let end = matching_close(text, stop)?;
            let call = Call {
                name: name.to_string(),
                args: text[stop + 1..end].to_string(),
            };
            (Subject::Function(call), end + 1)
        } else {
            (Subject::Attribute(name.to_string()), stop)
        }
    };

    let mut calls = Vec::new();
    while i < b.len() {
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == b.len() {
            break;
        }
        if b[i] != b':' {
            return None;
        }
        i += 1;
        let name_len = b[i..]
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
            .count();
        if name_len == 0 {
            return None;
        }
        let name = &text[i..i + name_len];
        i += name_len;
        if b.get(i) != Some(&b'(') {
            return None;
        }
        let end = matching_close(text, i)?;
        calls.push(Call {
            name: name.to_string(),
            args: text[i + 1..end].to_string(),
        });
        i = end + 1;
    }

    Some(Chain { subject, calls })
}

/// Correct function names, attribute names, nested subjects and
/// expression arguments of one chain
///
/// Returns the input verbatim when nothing needed fixing.
fn correct_chain(text: &str, notes: &mut Notes) -> Result<String, String> {
    let Some(mut chain) = parse_chain(text) else {
        return Ok(text.to_string());
    };

    // A bare `${...}` operand is just its body
    if let (Subject::Nested(inner), true) = (&chain.subject, chain.calls.is_empty()) {
        let unwrapped = correct_expr(inner, notes)?;
        notes.warn(format!("Unwrapped nested EL expression '${{{}}}'", inner));
        return Ok(unwrapped);
    }

    let mut changed = false;

    match &mut chain.subject {
        Subject::Attribute(name) => {
            if let Some(fixed) = fix_attribute(name) {
                notes.warn(format!("Corrected EL attribute '{}' to '{}'", name, fixed));
                *name = fixed.to_string();
                changed = true;
            }
        }
        Subject::Function(call) => {
            changed |= correct_call(call, notes)?;
            if CHAINABLE.contains(&call.name.as_str()) {
                return Err(format!(
                    "function '{}' needs a subject: write ${{{}:{}()}} instead of ${{{}({})}}",
                    call.name, call.args, call.name, call.name, call.args
                ));
            }
        }
        Subject::Nested(inner) => {
            let flattened = flatten_nested(inner)?;
            notes.warn(format!(
                "Flattened nested EL expression '${{{}}}' into the outer chain",
                inner
            ));
            let mut calls = flattened.calls;
            calls.append(&mut chain.calls);
            chain = Chain {
                subject: flattened.subject,
                calls,
            };
            changed = true;
        }
    }

    for call in &mut chain.calls {
        changed |= correct_call(call, notes)?;
    }

    Ok(if changed { chain.render() } else { text.to_string() })
}

fn correct_call(call: &mut Call, notes: &mut Notes) -> Result<bool, String> {
    let mut changed = false;
    if let Some(fixed) = fix_function(&call.name) {
        notes.warn(format!("Corrected EL function '{}' to '{}'", call.name, fixed));
        call.name = fixed.to_string();
        changed = true;
    }
    if call.args.contains("${") {
        let args = correct_text(&call.args, false, notes)?;
        if args != call.args {
            call.args = args;
            changed = true;
        }
    }
    Ok(changed)
}

/// `${${attr:isEmpty()}:not()}` → `attr:isEmpty():not()`
fn flatten_nested(inner: &str) -> Result<Chain, String> {
    let uncorrectable = || {
        format!(
            "nested expression '${{{}}}' used as a subject is not supported and cannot be flattened",
            inner
        )
    };

    let mut chain = parse_chain(inner).ok_or_else(uncorrectable)?;
    let Subject::Attribute(name) = &chain.subject else {
        return Err(uncorrectable());
    };
    let simple = chain.calls.iter().all(|c| {
        let name = fix_function(&c.name).unwrap_or(c.name.as_str());
        EXISTENCE_CALLS.contains(&name) && c.args.trim().is_empty()
    });
    if !simple {
        return Err(uncorrectable());
    }

    if let Some(fixed) = fix_attribute(name) {
        chain.subject = Subject::Attribute(fixed.to_string());
    }
    for call in &mut chain.calls {
        if let Some(fixed) = fix_function(&call.name) {
            call.name = fixed.to_string();
        }
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(text: &str) -> String {
        correct_text(text, false, &mut Notes::default()).unwrap()
    }

    fn fix_condition(text: &str) -> String {
        correct_text(text, true, &mut Notes::default()).unwrap()
    }

    #[test]
    fn no_right_hand_side_is_a_key() {
        for (_, right) in FUNCTION_FIXES {
            assert!(fix_function(right).is_none(), "{} is also a key", right);
        }
        for (_, right) in ATTRIBUTE_FIXES {
            assert!(fix_attribute(right).is_none(), "{} is also a key", right);
        }
    }

    #[test]
    fn tokenizer_keeps_calls_intact() {
        let tokens = tokenize("a:equals('x and y') and b:gt(1)");
        assert_eq!(
            tokens,
            vec![
                Token::Operand("a:equals('x and y')".into()),
                Token::And,
                Token::Operand("b:gt(1)".into()),
            ]
        );
    }

    #[test]
    fn suffix_calls_are_not_keywords() {
        assert!(!tokenize("a:and(${b}):not()").iter().any(Token::is_operator));
        assert!(!tokenize("orders.count:gt(1)").iter().any(Token::is_operator));
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(fix("${a or b and c}"), "${a:or(${b:and(${c})})}");
        assert_eq!(fix("${(a or b) and c}"), "${a:or(${b}):and(${c})}");
        assert_eq!(fix("${not a and b}"), "${a:not():and(${b})}");
        assert_eq!(fix("${a && b || c}"), "${a:and(${b}):or(${c})}");
    }

    #[test]
    fn chain_parsing() {
        let chain = parse_chain("filename:substring(0, 3):toUpper()").unwrap();
        assert_eq!(chain.subject, Subject::Attribute("filename".into()));
        assert_eq!(chain.calls.len(), 2);
        assert_eq!(chain.render(), "filename:substring(0, 3):toUpper()");
        assert!(parse_chain("a b:").is_none());
    }

    #[test]
    fn nested_subject_flattening() {
        assert_eq!(fix("${${filename:isEmpty()}:not()}"), "${filename:isEmpty():not()}");
        assert!(correct_text("${${filename:substring(1)}:equals('x')}", false, &mut Notes::default())
            .is_err());
    }

    #[test]
    fn text_between_expressions_is_only_combined_for_conditions() {
        assert_eq!(fix("${first} and ${last}"), "${first} and ${last}");
        assert_eq!(fix_condition("${first} and ${last}"), "${first:and(${last})}");
    }

    #[test]
    fn malformed_operators_between_expressions_stay_literal() {
        assert_eq!(fix_condition("${a} not ${b}"), "${a} not ${b}");
        assert_eq!(fix_condition("${a} and or ${b}"), "${a} and or ${b}");
    }
}
