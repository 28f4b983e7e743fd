//! Reduce snippet text to the plain text it would insert.

/// Strip tab stops and placeholders from snippet `text`.
///
/// `$0`, `$1` and `${1}` vanish, `${1:default}` becomes `default`, and `\$`,
/// `\}` and `\\` become the escaped character. Anything else is kept as is,
/// including a lone `$` that doesn't start a tab stop.
pub fn snippet_to_plain(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    strip_into(&mut text.chars().peekable(), &mut out, false);
    out
}

/// Copy characters into `out` until the input ends or, inside a placeholder,
/// its closing `}` is consumed.
fn strip_into<I>(chars: &mut std::iter::Peekable<I>, out: &mut String, in_placeholder: bool)
where
    I: Iterator<Item = char>,
{
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next @ ('$' | '}' | '\\')) => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '}' if in_placeholder => return,
            '$' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    while chars.peek().is_some_and(char::is_ascii_digit) {
                        chars.next();
                    }
                }
                Some('{') => {
                    chars.next();
                    while chars.peek().is_some_and(char::is_ascii_digit) {
                        chars.next();
                    }
                    match chars.next() {
                        Some(':') => strip_into(chars, out, true),
                        Some('}') | None => {}
                        // Choices and transforms are not produced for HTML;
                        // drop through to the closing brace.
                        Some(_) => {
                            for c in chars.by_ref() {
                                if c == '}' {
                                    break;
                                }
                            }
                        }
                    }
                }
                _ => out.push('$'),
            },
            _ => out.push(c),
        }
    }
}
