//! A small location-path dialect for the fallback backend
//!
//! Supports:
//!   - absolute (`/a/b`), relative (`a/b`) and descendant (`//a`, `a//b`) steps
//!   - name tests with optional prefixes (`svg:text`, `xlink:*`) and `*`
//!   - predicates `[n]` (1-based), `[@attr]` and `[@attr='value']`
//!   - a trailing `/@attr` or `/text()` terminal
//!
//! Does NOT support: named axes, functions, unions, nested predicates or
//! arbitrary expressions. Anything outside the dialect is rejected before
//! the document is touched.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrName {
    pub prefix: Option<String>,
    pub local: String,
}

/// An element name test; `local == "*"` matches any local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTest {
    pub prefix: Option<String>,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
    Index(usize),
    HasAttr(AttrName),
    AttrEq(AttrName, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// `true` when the step was preceded by `//`.
    pub descendant: bool,
    pub test: NameTest,
    pub preds: Vec<Pred>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Attribute(AttrName),
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub steps: Vec<Step>,
    pub terminal: Option<Terminal>,
}

impl PathExpr {
    pub fn parse(selector: &str) -> Result<Self> {
        let trimmed = selector.trim();
        if trimmed.is_empty() {
            return Err(unsupported(""));
        }

        let segments = split_steps(trimmed);
        let mut steps = Vec::new();
        let mut terminal = None;
        let mut descendant = false;
        let last = segments.len() - 1;

        for (n, seg) in segments.iter().enumerate() {
            if seg.is_empty() {
                if n == 0 {
                    // leading '/': anchors at the root, which is the
                    // evaluation context anyway
                    continue;
                }
                if n == last {
                    return Err(unsupported(seg));
                }
                descendant = true;
                continue;
            }
            let is_terminal = seg.starts_with('@') || *seg == "text()";
            if is_terminal {
                if n != last || descendant {
                    return Err(unsupported(seg));
                }
                terminal = Some(if *seg == "text()" {
                    Terminal::Text
                } else {
                    Terminal::Attribute(parse_attr_name(&seg[1..], seg)?)
                });
                continue;
            }
            let (test, preds) = parse_step(seg)?;
            steps.push(Step {
                descendant,
                test,
                preds,
            });
            descendant = false;
        }
        Ok(Self { steps, terminal })
    }
}

fn unsupported(step: &str) -> Error {
    Error::UnsupportedOperation(format!("unsupported location step '{step}'"))
}

/// Split on `/` outside quotes and predicates. Empty segments mark the
/// position of `//` separators.
fn split_steps(path: &str) -> Vec<&str> {
    let b = path.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;

    for (i, &c) in b.iter().enumerate() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            b'\'' | b'"' => quote = Some(c),
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'/' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments
}

fn parse_step(seg: &str) -> Result<(NameTest, Vec<Pred>)> {
    let (name_part, mut rest) = match seg.find('[') {
        Some(k) => (&seg[..k], &seg[k..]),
        None => (seg, ""),
    };
    let test = parse_name_test(name_part, seg)?;

    let mut preds = Vec::new();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(unsupported(seg));
        }
        let close = find_close(rest).ok_or_else(|| unsupported(seg))?;
        preds.push(parse_pred(&rest[1..close], seg)?);
        rest = &rest[close + 1..];
    }
    Ok((test, preds))
}

/// Index of the `]` closing the `[` at byte 0, honoring quotes.
fn find_close(s: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &c) in s.as_bytes().iter().enumerate().skip(1) {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            b'\'' | b'"' => quote = Some(c),
            b']' => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_pred(inner: &str, seg: &str) -> Result<Pred> {
    let inner = inner.trim();
    if !inner.is_empty() && inner.bytes().all(|c| c.is_ascii_digit()) {
        let n = inner.parse().map_err(|_| unsupported(seg))?;
        return Ok(Pred::Index(n));
    }
    let Some(rest) = inner.strip_prefix('@') else {
        return Err(unsupported(seg));
    };
    match rest.find('=') {
        None => Ok(Pred::HasAttr(parse_attr_name(rest, seg)?)),
        Some(k) => {
            let name = parse_attr_name(rest[..k].trim_end(), seg)?;
            let value = rest[k + 1..].trim_start();
            let quoted = value.len() >= 2
                && (value.starts_with('\'') || value.starts_with('"'))
                && value.ends_with(value.as_bytes()[0] as char);
            if !quoted {
                return Err(unsupported(seg));
            }
            Ok(Pred::AttrEq(name, value[1..value.len() - 1].to_string()))
        }
    }
}

fn parse_name_test(name_part: &str, seg: &str) -> Result<NameTest> {
    if name_part == "*" {
        return Ok(NameTest {
            prefix: None,
            local: "*".to_string(),
        });
    }
    match name_part.split_once(':') {
        None if is_name(name_part) => Ok(NameTest {
            prefix: None,
            local: name_part.to_string(),
        }),
        Some((p, l)) if is_name(p) && (l == "*" || is_name(l)) => Ok(NameTest {
            prefix: Some(p.to_string()),
            local: l.to_string(),
        }),
        _ => Err(unsupported(seg)),
    }
}

fn parse_attr_name(name: &str, seg: &str) -> Result<AttrName> {
    match name.split_once(':') {
        None if is_name(name) => Ok(AttrName {
            prefix: None,
            local: name.to_string(),
        }),
        Some((p, l)) if is_name(p) && is_name(l) => Ok(AttrName {
            prefix: Some(p.to_string()),
            local: l.to_string(),
        }),
        _ => Err(unsupported(seg)),
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descendant_step_with_predicate() {
        let expr = PathExpr::parse("//svg:text[@id='t1']").unwrap();
        assert_eq!(expr.steps.len(), 1);
        let step = &expr.steps[0];
        assert!(step.descendant);
        assert_eq!(step.test.prefix.as_deref(), Some("svg"));
        assert_eq!(step.test.local, "text");
        assert_eq!(
            step.preds,
            vec![Pred::AttrEq(
                AttrName {
                    prefix: None,
                    local: "id".to_string()
                },
                "t1".to_string()
            )]
        );
        assert_eq!(expr.terminal, None);
    }

    #[test]
    fn parses_absolute_path_with_index() {
        let expr = PathExpr::parse("/svg/g[2]/rect").unwrap();
        assert_eq!(expr.steps.len(), 3);
        assert!(!expr.steps[0].descendant);
        assert_eq!(expr.steps[1].preds, vec![Pred::Index(2)]);
    }

    #[test]
    fn parses_attribute_and_text_terminals() {
        let expr = PathExpr::parse("//image/@xlink:href").unwrap();
        match expr.terminal {
            Some(Terminal::Attribute(ref a)) => {
                assert_eq!(a.prefix.as_deref(), Some("xlink"));
                assert_eq!(a.local, "href");
            }
            ref other => panic!("expected attribute terminal, got {other:?}"),
        }

        let expr = PathExpr::parse("//title/text()").unwrap();
        assert_eq!(expr.terminal, Some(Terminal::Text));
    }

    #[test]
    fn wildcard_and_has_attr() {
        let expr = PathExpr::parse("//*[@id]").unwrap();
        assert_eq!(expr.steps[0].test.local, "*");
        assert!(matches!(expr.steps[0].preds[0], Pred::HasAttr(_)));
    }

    #[test]
    fn slash_inside_quoted_value_is_not_a_separator() {
        let expr = PathExpr::parse("//a[@href='x/y']").unwrap();
        assert_eq!(expr.steps.len(), 1);
    }

    #[test]
    fn rejects_whats_outside_the_dialect() {
        for bad in [
            "a/following-sibling::b",
            "//a[contains(.,'x')]",
            "..",
            "a | b",
            "//a[last()]",
            "//@href",
            "a/",
            "",
        ] {
            let err = PathExpr::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedOperation(_)),
                "'{bad}' should be out of dialect"
            );
        }
    }
}
