//! Bracket scanning for expression values
//!
//! Only ASCII delimiters are inspected, so byte indexing never splits a
//! UTF-8 sequence.

/// Piece of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    /// Text outside any `${...}`
    Literal(&'a str),
    /// Inner text of a top-level `${...}`, delimiters stripped
    Expr(&'a str),
}

/// Split a value into literal and expression segments
///
/// Quotes count only inside expressions; `$$` escapes a dollar sign.
pub(crate) fn segments(input: &str) -> Result<Vec<Segment<'_>>, String> {
    let b = input.as_bytes();
    let mut out = Vec::new();
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut quote: Option<u8> = None;
    let mut literal_start = 0;
    let mut expr_start = 0;
    let mut i = 0;

    while i < b.len() {
        let c = b[i];
        let next = b.get(i + 1).copied();

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if stack.is_empty() {
            match (c, next) {
                (b'$', Some(b'$')) => {
                    i += 2;
                    continue;
                }
                (b'$', Some(b'{')) => {
                    if literal_start < i {
                        out.push(Segment::Literal(&input[literal_start..i]));
                    }
                    stack.push((b'{', i));
                    expr_start = i + 2;
                    i += 2;
                    continue;
                }
                _ => {
                    i += 1;
                    continue;
                }
            }
        }

        match c {
            b'\'' | b'"' => quote = Some(c),
            b'$' if next == Some(b'{') => {
                stack.push((b'{', i));
                i += 2;
                continue;
            }
            b'(' => stack.push((b'(', i)),
            b')' => match stack.last() {
                Some((b'(', _)) => {
                    stack.pop();
                }
                _ => return Err(format!("unmatched ')' at position {}", i)),
            },
            b'}' => match stack.last() {
                Some((b'{', _)) => {
                    stack.pop();
                    if stack.is_empty() {
                        out.push(Segment::Expr(&input[expr_start..i]));
                        literal_start = i + 1;
                    }
                }
                _ => {
                    return Err(format!(
                        "'}}' at position {} closes an open '(' (missing ')')",
                        i
                    ))
                }
            },
            _ => {}
        }
        i += 1;
    }

    if quote.is_some() {
        return Err("unterminated quoted string".to_string());
    }
    if let Some((kind, pos)) = stack.last() {
        let open = if *kind == b'{' { "${" } else { "(" };
        return Err(format!("unclosed '{}' opened at position {}", open, pos));
    }
    if literal_start < input.len() {
        out.push(Segment::Literal(&input[literal_start..]));
    }

    Ok(out)
}

/// Balance check over `${`/`}` and parentheses
pub(crate) fn check_balance(input: &str) -> Result<(), String> {
    segments(input).map(|_| ())
}

/// Index of the delimiter closing the `(` or `${` that starts at `open`
pub(crate) fn matching_close(s: &str, open: usize) -> Option<usize> {
    let b = s.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < b.len() {
        let c = b[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' if !stack.is_empty() => quote = Some(c),
            b'$' if b.get(i + 1) == Some(&b'{') => {
                stack.push(b'}');
                i += 2;
                continue;
            }
            b'(' => stack.push(b')'),
            b')' | b'}' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index just past a quoted string starting at `start`
pub(crate) fn quoted_end(s: &str, start: usize) -> usize {
    let b = s.as_bytes();
    let q = b[start];
    b[start + 1..]
        .iter()
        .position(|&c| c == q)
        .map(|p| start + 1 + p + 1)
        .unwrap_or(b.len())
}
